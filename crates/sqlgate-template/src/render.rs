//! Closed-set template rendering.
//!
//! Only the placeholders in [`IDENTIFIER_PLACEHOLDERS`] may be inlined, and
//! only after the identifier sanitizer accepts the value. Data values never
//! touch the text: they ride along in [`RenderedStatement::params`] and are
//! bound as `$1..$n` by the executor.

use crate::error::TemplateError;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlgate_core::{IdentifierError, sanitize_identifier};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

/// Placeholder names a template may declare.
pub const IDENTIFIER_PLACEHOLDERS: [&str; 2] = [SCHEMA_PLACEHOLDER, VIEW_PLACEHOLDER];

/// Placeholder standing for a schema name.
pub const SCHEMA_PLACEHOLDER: &str = "schema";

/// Placeholder standing for a (possibly schema-qualified) view name.
pub const VIEW_PLACEHOLDER: &str = "view";

/// Identifier substitutions keyed by placeholder name.
pub type Substitutions = BTreeMap<String, String>;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// A named SQL template as loaded from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    text: String,
    placeholders: BTreeSet<String>,
}

/// SQL text with identifiers inlined and data values still unbound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedStatement {
    pub template: String,
    pub sql: String,
    pub params: Vec<Value>,
}

impl Template {
    /// Build a template, recording the `{name}` placeholders its text declares.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let placeholders = PLACEHOLDER
            .captures_iter(&text)
            .map(|caps| caps[1].to_string())
            .collect();
        Self {
            name: name.into(),
            text,
            placeholders,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Placeholders declared by the template text, sorted.
    pub fn placeholders(&self) -> &BTreeSet<String> {
        &self.placeholders
    }

    /// File stem, used as the public tool name (`get_version.sql` -> `get_version`).
    pub fn stem(&self) -> &str {
        self.name.strip_suffix(".sql").unwrap_or(&self.name)
    }

    /// Inline sanitized identifiers and thread `params` through untouched.
    ///
    /// Fails closed on any substitution key or declared placeholder outside
    /// the allow-list, on a declared placeholder without a value, and on a
    /// value the identifier sanitizer rejects.
    pub fn render(
        &self,
        substitutions: &Substitutions,
        params: Vec<Value>,
    ) -> Result<RenderedStatement, TemplateError> {
        if let Some(key) = substitutions.keys().find(|k| !is_identifier_placeholder(k)) {
            tracing::debug!(template = %self.name, key = %key, "Rejected substitution key");
            return Err(TemplateError::UnsupportedSubstitution {
                placeholder: key.clone(),
            });
        }

        for placeholder in &self.placeholders {
            if !is_identifier_placeholder(placeholder) {
                return Err(TemplateError::UnsupportedSubstitution {
                    placeholder: placeholder.clone(),
                });
            }
            let value = substitutions.get(placeholder).ok_or_else(|| {
                TemplateError::MissingSubstitution {
                    placeholder: placeholder.clone(),
                }
            })?;
            check_identifier(placeholder, value)?;
        }

        let sql = PLACEHOLDER.replace_all(&self.text, |caps: &Captures| {
            substitutions
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        });

        Ok(RenderedStatement {
            template: self.name.clone(),
            sql: sql.into_owned(),
            params,
        })
    }
}

/// Validate one identifier substitution value.
///
/// Schema names must be unqualified; view names may carry one qualifier.
pub fn check_identifier(placeholder: &str, value: &str) -> Result<(), TemplateError> {
    let result = sanitize_identifier(value).and_then(|ident| {
        if placeholder == SCHEMA_PLACEHOLDER && ident.contains('.') {
            Err(IdentifierError::TooManyParts)
        } else {
            Ok(ident)
        }
    });

    result.map(|_| ()).map_err(|reason| {
        tracing::debug!(placeholder, value, "Rejected identifier substitution");
        TemplateError::InvalidIdentifier {
            placeholder: placeholder.to_string(),
            reason,
        }
    })
}

pub fn is_identifier_placeholder(name: &str) -> bool {
    IDENTIFIER_PLACEHOLDERS.contains(&name)
}
