//! Permission configuration.
//!
//! Global per-kind defaults plus optional per-schema overrides. Each override
//! entry is tri-state: an absent field means "fall back to the global
//! default", which is why [`SchemaPermissions`] holds `Option<bool>`.

use crate::OperationKind;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Permission settings as they appear in `sqlgate.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// Global default for SELECT statements.
    #[serde(default = "default_true")]
    pub allow_select: bool,

    /// Global default for INSERT statements.
    #[serde(default)]
    pub allow_insert: bool,

    /// Global default for UPDATE statements.
    #[serde(default)]
    pub allow_update: bool,

    /// Global default for DELETE statements.
    #[serde(default)]
    pub allow_delete: bool,

    /// Global default for DDL statements (CREATE, ALTER, DROP, TRUNCATE, ...).
    #[serde(default)]
    pub allow_ddl: bool,

    /// Deny every write kind regardless of any other setting.
    #[serde(default)]
    pub read_only: bool,

    /// Schema used when a request names none.
    #[serde(default = "default_schema")]
    pub default_schema: String,

    /// Per-schema overrides keyed by lower-cased schema name.
    #[serde(default, deserialize_with = "deserialize_schema_overrides")]
    pub schemas: BTreeMap<String, SchemaPermissions>,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            allow_select: true,
            allow_insert: false,
            allow_update: false,
            allow_delete: false,
            allow_ddl: false,
            read_only: false,
            default_schema: default_schema(),
            schemas: BTreeMap::new(),
        }
    }
}

impl PermissionsConfig {
    /// Global default for a kind. `Unknown` is never granted.
    pub fn global_default(&self, kind: OperationKind) -> bool {
        match kind {
            OperationKind::Select => self.allow_select,
            OperationKind::Insert => self.allow_insert,
            OperationKind::Update => self.allow_update,
            OperationKind::Delete => self.allow_delete,
            OperationKind::Ddl => self.allow_ddl,
            OperationKind::Unknown => false,
        }
    }

    pub(crate) fn set_global_default(&mut self, kind: OperationKind, allowed: bool) {
        match kind {
            OperationKind::Select => self.allow_select = allowed,
            OperationKind::Insert => self.allow_insert = allowed,
            OperationKind::Update => self.allow_update = allowed,
            OperationKind::Delete => self.allow_delete = allowed,
            OperationKind::Ddl => self.allow_ddl = allowed,
            OperationKind::Unknown => {}
        }
    }

    /// Record one per-schema override, normalizing the schema key.
    pub fn set_schema_override(&mut self, schema: &str, kind: OperationKind, allowed: bool) {
        self.schemas
            .entry(normalize_schema_key(schema))
            .or_default()
            .set(kind, allowed);
    }
}

/// Canonical map key for a schema name.
pub fn normalize_schema_key(schema: &str) -> String {
    schema.trim().to_lowercase()
}

/// Lower-case override keys as they are read, so lookups with a normalized
/// request schema find them. Two spellings of one schema are an error.
fn deserialize_schema_overrides<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, SchemaPermissions>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, SchemaPermissions>::deserialize(deserializer)?;
    let mut schemas = BTreeMap::new();
    for (name, permissions) in raw {
        match schemas.entry(normalize_schema_key(&name)) {
            Entry::Vacant(slot) => {
                slot.insert(permissions);
            }
            Entry::Occupied(slot) => {
                return Err(serde::de::Error::custom(format!(
                    "schema '{name}' is configured twice (as '{}')",
                    slot.key()
                )));
            }
        }
    }
    Ok(schemas)
}

/// Explicit per-schema grants. `None` defers to the global default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaPermissions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ddl: Option<bool>,
}

impl SchemaPermissions {
    /// The explicit entry for `kind`, if one was configured.
    pub fn get(&self, kind: OperationKind) -> Option<bool> {
        match kind {
            OperationKind::Select => self.select,
            OperationKind::Insert => self.insert,
            OperationKind::Update => self.update,
            OperationKind::Delete => self.delete,
            OperationKind::Ddl => self.ddl,
            OperationKind::Unknown => None,
        }
    }

    pub fn set(&mut self, kind: OperationKind, allowed: bool) {
        let slot = match kind {
            OperationKind::Select => &mut self.select,
            OperationKind::Insert => &mut self.insert,
            OperationKind::Update => &mut self.update,
            OperationKind::Delete => &mut self.delete,
            OperationKind::Ddl => &mut self.ddl,
            OperationKind::Unknown => return,
        };
        *slot = Some(allowed);
    }
}

/// Truthy spelling used by every boolean environment variable.
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Parse a `schema:bool,schema:bool` list.
///
/// Malformed pairs are skipped and reported back so the caller can log them.
pub fn parse_schema_pairs(raw: &str) -> (Vec<(String, bool)>, Vec<String>) {
    let mut pairs = Vec::new();
    let mut rejected = Vec::new();

    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match entry.split_once(':') {
            Some((schema, value)) if !schema.trim().is_empty() => {
                pairs.push((schema.trim().to_lowercase(), parse_flag(value)));
            }
            _ => rejected.push(entry.to_string()),
        }
    }

    (pairs, rejected)
}

fn default_true() -> bool {
    true
}

fn default_schema() -> String {
    "public".to_string()
}
