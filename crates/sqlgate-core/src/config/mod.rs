//! Gateway configuration.
//!
//! A single `sqlgate.yaml` is deserialized into [`GatewayConfig`], then the
//! environment overlay is applied once with [`GatewayConfig::apply_env`]. The
//! result is validated and handed to each component by value; nothing reads
//! settings from globals after startup.
//!
//! ```yaml
//! upstream:
//!   database_url_env: DATABASE_URL
//! templates:
//!   root: sql
//!   max_row_limit: 10000
//! permissions:
//!   read_only: true
//!   schemas:
//!     itsm: { select: true }
//! ```

pub mod mcp;
pub mod permissions;
pub mod upstream;

use crate::OperationKind;
use crate::ident::sanitize_identifier;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub use mcp::{McpConfig, Transport};
pub use permissions::{
    PermissionsConfig, SchemaPermissions, normalize_schema_key, parse_flag, parse_schema_pairs,
};
pub use upstream::{PoolConfig, SslMode, UpstreamConfig};

/// Hard ceiling for `templates.max_row_limit`.
pub const ROW_LIMIT_CEILING: u32 = 1_000_000;

/// Environment variables mapping schema overrides to a kind.
const SCHEMA_PERMISSION_ENVS: [(&str, OperationKind); 5] = [
    ("SCHEMA_SELECT_PERMISSIONS", OperationKind::Select),
    ("SCHEMA_INSERT_PERMISSIONS", OperationKind::Insert),
    ("SCHEMA_UPDATE_PERMISSIONS", OperationKind::Update),
    ("SCHEMA_DELETE_PERMISSIONS", OperationKind::Delete),
    ("SCHEMA_DDL_PERMISSIONS", OperationKind::Ddl),
];

/// Environment variables mapping global defaults to a kind.
const GLOBAL_PERMISSION_ENVS: [(&str, OperationKind); 5] = [
    ("ALLOW_SELECT_OPERATION", OperationKind::Select),
    ("ALLOW_INSERT_OPERATION", OperationKind::Insert),
    ("ALLOW_UPDATE_OPERATION", OperationKind::Update),
    ("ALLOW_DELETE_OPERATION", OperationKind::Delete),
    ("ALLOW_DDL_OPERATION", OperationKind::Ddl),
];

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub templates: TemplatesConfig,

    #[serde(default)]
    pub permissions: PermissionsConfig,

    #[serde(default)]
    pub provenance: ProvenanceConfig,

    #[serde(default)]
    pub guardrails: GuardrailsConfig,

    #[serde(default)]
    pub mcp: McpConfig,
}

/// Template directory and row limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Trusted directory holding the `*.sql` templates.
    #[serde(default = "default_template_root")]
    pub root: PathBuf,

    /// Row cap applied when a request does not name one.
    #[serde(default = "default_row_limit")]
    pub default_row_limit: u32,

    /// Largest row cap a request may ask for.
    #[serde(default = "default_max_row_limit")]
    pub max_row_limit: u32,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            root: default_template_root(),
            default_row_limit: default_row_limit(),
            max_row_limit: default_max_row_limit(),
        }
    }
}

/// Staleness heuristic settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceConfig {
    /// Facts older than this many seconds are flagged stale.
    #[serde(default = "default_freshness_seconds")]
    pub freshness_seconds: u64,
}

impl Default for ProvenanceConfig {
    fn default() -> Self {
        Self {
            freshness_seconds: default_freshness_seconds(),
        }
    }
}

impl ProvenanceConfig {
    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_seconds)
    }
}

/// Request-level guardrails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailsConfig {
    /// Queries allowed to run against the database at once.
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,

    /// How long a request may wait for a query slot.
    #[serde(default = "default_max_query_wait_seconds")]
    pub max_query_wait_seconds: u64,

    /// Upper bound on a single database call; also sent as `statement_timeout`.
    #[serde(default = "default_query_timeout_seconds")]
    pub query_timeout_seconds: u64,

    /// Enable the policy-gated free execute path.
    #[serde(default)]
    pub free_execute: bool,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: default_max_concurrent_queries(),
            max_query_wait_seconds: default_max_query_wait_seconds(),
            query_timeout_seconds: default_query_timeout_seconds(),
            free_execute: false,
        }
    }
}

impl GuardrailsConfig {
    pub fn max_query_wait(&self) -> Duration {
        Duration::from_secs(self.max_query_wait_seconds)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }
}

impl GatewayConfig {
    /// Parse configuration from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load configuration from a file without resolving relative paths.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Load configuration and resolve a relative template root against the
    /// directory holding the config file.
    pub fn load_with_context(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = Self::from_file(path)?;
        if config.templates.root.is_relative()
            && let Some(base) = path.parent()
        {
            config.templates.root = base.join(&config.templates.root);
        }
        Ok(config)
    }

    /// Apply the process environment overlay.
    pub fn apply_env(&mut self) {
        self.apply_env_from(std::env::vars());
    }

    /// Apply an environment overlay from explicit key/value pairs.
    pub fn apply_env_from<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());

            if let Some((_, kind)) = GLOBAL_PERMISSION_ENVS.iter().find(|(name, _)| *name == key) {
                self.permissions.set_global_default(*kind, parse_flag(value));
                continue;
            }

            if let Some((_, kind)) = SCHEMA_PERMISSION_ENVS.iter().find(|(name, _)| *name == key) {
                let (pairs, rejected) = parse_schema_pairs(value);
                for entry in rejected {
                    tracing::warn!(variable = key, entry = %entry, "Skipping malformed schema permission entry");
                }
                for (schema, allowed) in pairs {
                    self.permissions.set_schema_override(&schema, *kind, allowed);
                }
                continue;
            }

            match key {
                "SQLGATE_READ_ONLY" => self.permissions.read_only = parse_flag(value),
                "SQLGATE_DEFAULT_SCHEMA" => {
                    self.permissions.default_schema = value.trim().to_string()
                }
                "SQLGATE_TEMPLATE_ROOT" => self.templates.root = PathBuf::from(value),
                "SQLGATE_MAX_ROW_LIMIT" => match value.trim().parse::<u32>() {
                    Ok(limit) => self.templates.max_row_limit = limit,
                    Err(_) => {
                        tracing::warn!(variable = key, "Ignoring non-numeric row limit")
                    }
                },
                _ => {}
            }
        }
    }

    /// Reject settings the gateway cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let templates = &self.templates;
        if templates.max_row_limit == 0 || templates.max_row_limit > ROW_LIMIT_CEILING {
            return Err(ConfigError::Invalid(format!(
                "templates.max_row_limit must be between 1 and {ROW_LIMIT_CEILING}"
            )));
        }
        if templates.default_row_limit == 0 || templates.default_row_limit > templates.max_row_limit
        {
            return Err(ConfigError::Invalid(
                "templates.default_row_limit must be between 1 and templates.max_row_limit"
                    .to_string(),
            ));
        }

        if sanitize_identifier(&self.permissions.default_schema).is_err()
            || self.permissions.default_schema.contains('.')
        {
            return Err(ConfigError::Invalid(
                "permissions.default_schema is not a valid schema name".to_string(),
            ));
        }
        for schema in self.permissions.schemas.keys() {
            if sanitize_identifier(schema).is_err()
                || schema.contains('.')
                || *schema != normalize_schema_key(schema)
            {
                return Err(ConfigError::Invalid(format!(
                    "permissions.schemas has an invalid schema name '{schema}'"
                )));
            }
        }

        if self.guardrails.max_concurrent_queries == 0 {
            return Err(ConfigError::Invalid(
                "guardrails.max_concurrent_queries must be at least 1".to_string(),
            ));
        }
        if self.guardrails.query_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "guardrails.query_timeout_seconds must be at least 1".to_string(),
            ));
        }
        if self.upstream.pool.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "upstream.pool.max_connections must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_template_root() -> PathBuf {
    PathBuf::from("sql")
}

fn default_row_limit() -> u32 {
    1000
}

fn default_max_row_limit() -> u32 {
    10_000
}

fn default_freshness_seconds() -> u64 {
    24 * 60 * 60
}

fn default_max_concurrent_queries() -> usize {
    4
}

fn default_max_query_wait_seconds() -> u64 {
    5
}

fn default_query_timeout_seconds() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = GatewayConfig::from_yaml("{}").unwrap();
        assert_eq!(config.templates.root, PathBuf::from("sql"));
        assert_eq!(config.templates.default_row_limit, 1000);
        assert_eq!(config.templates.max_row_limit, 10_000);
        assert_eq!(config.provenance.freshness_seconds, 86_400);
        assert_eq!(config.guardrails.max_concurrent_queries, 4);
        assert!(!config.guardrails.free_execute);
        assert_eq!(config.mcp.transport, Transport::Stdio);
        config.validate().unwrap();
    }

    #[test]
    fn env_overlay() {
        let mut config = GatewayConfig::default();
        config.apply_env_from([
            ("ALLOW_DELETE_OPERATION", "true"),
            ("ALLOW_SELECT_OPERATION", "0"),
            ("SCHEMA_SELECT_PERMISSIONS", "Sales:true,bogus"),
            ("SCHEMA_DDL_PERMISSIONS", "sales:yes"),
            ("SQLGATE_READ_ONLY", "on"),
            ("SQLGATE_DEFAULT_SCHEMA", "itsm"),
            ("SQLGATE_MAX_ROW_LIMIT", "500"),
            ("SQLGATE_TEMPLATE_ROOT", "/srv/sql"),
            ("UNRELATED", "x"),
        ]);

        let perms = &config.permissions;
        assert!(perms.allow_delete);
        assert!(!perms.allow_select);
        assert!(perms.read_only);
        assert_eq!(perms.default_schema, "itsm");
        let sales = perms.schemas.get("sales").unwrap();
        assert_eq!(sales.select, Some(true));
        assert_eq!(sales.ddl, Some(true));
        assert_eq!(sales.insert, None);
        assert_eq!(config.templates.max_row_limit, 500);
        assert_eq!(config.templates.root, PathBuf::from("/srv/sql"));
    }

    #[test]
    fn bad_row_limit_env_is_ignored() {
        let mut config = GatewayConfig::default();
        config.apply_env_from([("SQLGATE_MAX_ROW_LIMIT", "lots")]);
        assert_eq!(config.templates.max_row_limit, 10_000);
    }

    #[test]
    fn validate_rejects_bad_limits() {
        let mut config = GatewayConfig::default();
        config.templates.max_row_limit = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.templates.default_row_limit = 20_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_schema_names() {
        let mut config = GatewayConfig::default();
        config.permissions.default_schema = "public; drop".to_string();
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config
            .permissions
            .set_schema_override("a.b", OperationKind::Select, true);
        assert!(config.validate().is_err());
    }

    #[test]
    fn mixed_case_override_keys_load_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqlgate.yaml");
        fs::write(
            &path,
            "permissions:\n  schemas:\n    ITSM:\n      select: false\n",
        )
        .unwrap();

        let config = GatewayConfig::load_with_context(&path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.permissions.schemas["itsm"].select, Some(false));

        let mut config = GatewayConfig::default();
        config
            .permissions
            .schemas
            .insert("Sales".to_string(), SchemaPermissions::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = GatewayConfig::default();
        config.guardrails.max_concurrent_queries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn relative_root_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqlgate.yaml");
        fs::write(&path, "templates:\n  root: queries\n").unwrap();

        let config = GatewayConfig::load_with_context(&path).unwrap();
        assert_eq!(config.templates.root, dir.path().join("queries"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = GatewayConfig::from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
