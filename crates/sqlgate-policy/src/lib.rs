//! # sqlgate-policy
//!
//! Allow/deny decisions for a `(schema, operation kind)` pair.
//!
//! Resolution order:
//!
//! 1. `Unknown` statements are always denied.
//! 2. Read-only mode denies every write kind, whatever else is configured.
//! 3. An explicit per-schema entry for the kind wins.
//! 4. Otherwise the global default for the kind applies.
//!
//! The policy is built once from [`PermissionsConfig`] and never mutated, so
//! the same inputs always produce the same decision.

use serde::Serialize;
use sqlgate_core::{OperationKind, PermissionsConfig, SchemaPermissions, normalize_schema_key};
use std::collections::BTreeMap;
use std::sync::Once;

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    UnknownKind,
    ReadOnly,
    SchemaOverride,
    GlobalDefault,
}

/// Outcome of a policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub source: DecisionSource,
}

/// Immutable permission policy.
#[derive(Debug)]
pub struct PermissionPolicy {
    config: PermissionsConfig,
    global_notice: Once,
}

/// Serializable view of the policy for `api_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicySnapshot {
    pub read_only: bool,
    pub default_schema: String,
    pub global: BTreeMap<&'static str, bool>,
    /// Configured overrides as written.
    pub overrides: BTreeMap<String, SchemaPermissions>,
    /// Effective decision per kind for each overridden schema.
    pub effective: BTreeMap<String, BTreeMap<&'static str, bool>>,
}

impl PermissionPolicy {
    pub fn new(config: PermissionsConfig) -> Self {
        Self {
            config,
            global_notice: Once::new(),
        }
    }

    /// Whether `kind` may run against `schema`.
    pub fn is_allowed(&self, schema: &str, kind: OperationKind) -> bool {
        self.decide(schema, kind).allowed
    }

    /// Full decision with its source.
    pub fn decide(&self, schema: &str, kind: OperationKind) -> PolicyDecision {
        if self.config.schemas.is_empty() {
            self.global_notice.call_once(|| {
                tracing::info!(
                    target: "sqlgate::policy",
                    "No per-schema permissions configured; global defaults govern all schemas"
                );
            });
        }

        if kind == OperationKind::Unknown {
            return PolicyDecision {
                allowed: false,
                source: DecisionSource::UnknownKind,
            };
        }

        if self.config.read_only && kind.is_write() {
            return PolicyDecision {
                allowed: false,
                source: DecisionSource::ReadOnly,
            };
        }

        if let Some(allowed) = self
            .schema_override(schema)
            .and_then(|perms| perms.get(kind))
        {
            return PolicyDecision {
                allowed,
                source: DecisionSource::SchemaOverride,
            };
        }

        PolicyDecision {
            allowed: self.config.global_default(kind),
            source: DecisionSource::GlobalDefault,
        }
    }

    pub fn read_only(&self) -> bool {
        self.config.read_only
    }

    /// Schema used when a request names none.
    pub fn default_schema(&self) -> &str {
        &self.config.default_schema
    }

    pub fn snapshot(&self) -> PolicySnapshot {
        let global = OperationKind::GRANTABLE
            .iter()
            .map(|kind| (kind.as_str(), self.config.global_default(*kind)))
            .collect();

        let effective = self
            .config
            .schemas
            .keys()
            .map(|schema| {
                let decisions = OperationKind::GRANTABLE
                    .iter()
                    .map(|kind| (kind.as_str(), self.is_allowed(schema, *kind)))
                    .collect();
                (schema.clone(), decisions)
            })
            .collect();

        PolicySnapshot {
            read_only: self.config.read_only,
            default_schema: self.config.default_schema.clone(),
            global,
            overrides: self.config.schemas.clone(),
            effective,
        }
    }

    fn schema_override(&self, schema: &str) -> Option<&SchemaPermissions> {
        self.config
            .schemas
            .get(schema)
            .or_else(|| self.config.schemas.get(&normalize_schema_key(schema)))
    }
}
