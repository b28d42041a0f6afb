//! # sqlgate-core
//!
//! Types shared by every sqlgate crate:
//!
//! - [`config`]: the immutable gateway configuration loaded once at startup
//! - [`ident`]: the identifier sanitizer guarding textual substitution
//! - [`backend`]: the interface the executor needs from a database connection layer
//! - [`OperationKind`]: the coarse statement category used for policy decisions

pub mod backend;
pub mod config;
pub mod ident;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use backend::{BackendError, BoundStatement, ColumnMeta, QueryBackend, RowSet};
pub use config::{
    ConfigError, GatewayConfig, GuardrailsConfig, McpConfig, PermissionsConfig,
    ProvenanceConfig, SchemaPermissions, TemplatesConfig, Transport, UpstreamConfig,
    normalize_schema_key,
};
pub use ident::{sanitize_identifier, IdentifierError};

/// Coarse category of a SQL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    Unknown,
}

impl OperationKind {
    /// Every kind that can be granted by configuration.
    pub const GRANTABLE: [OperationKind; 5] = [
        OperationKind::Select,
        OperationKind::Insert,
        OperationKind::Update,
        OperationKind::Delete,
        OperationKind::Ddl,
    ];

    /// Whether the kind changes data or schema (blocked in read-only mode).
    pub fn is_write(self) -> bool {
        matches!(
            self,
            OperationKind::Insert | OperationKind::Update | OperationKind::Delete | OperationKind::Ddl
        )
    }

    /// Lowercase name used in configuration keys.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Select => "select",
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Ddl => "ddl",
            OperationKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Select => write!(f, "SELECT"),
            OperationKind::Insert => write!(f, "INSERT"),
            OperationKind::Update => write!(f, "UPDATE"),
            OperationKind::Delete => write!(f, "DELETE"),
            OperationKind::Ddl => write!(f, "DDL"),
            OperationKind::Unknown => write!(f, "UNKNOWN"),
        }
    }
}
