//! Database connection layer interface.
//!
//! The executor only ever sees a [`QueryBackend`]: it hands over a fully
//! rendered statement plus positional parameters and gets back ordered
//! columns and rows. Retry and pooling belong to the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// SQL text plus the values bound to `$1..$n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl BoundStatement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Name and database type of a result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    /// Upper-case type name as reported by the driver (`INT4`, `TIMESTAMPTZ`, ...).
    pub type_name: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    /// Whether values of this column are points in time.
    pub fn is_temporal(&self) -> bool {
        matches!(
            self.type_name.as_str(),
            "TIMESTAMPTZ" | "TIMESTAMP" | "DATE"
        )
    }
}

/// Rows returned by one statement, each row ordered like `columns`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<Value>>,
    /// Rows changed by a write statement; zero for plain reads.
    pub rows_affected: u64,
}

/// Failures reported by the connection layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The connection failed and internal retries were used up.
    #[error("database connection unavailable: {0}")]
    Transient(String),

    /// No pooled connection became free in time.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// The server aborted the statement (timeout or explicit cancel).
    #[error("statement cancelled")]
    Cancelled,

    /// A value parameter could not be encoded as the type the statement expects.
    #[error("parameter ${position} is not a valid {expected}")]
    InvalidParameter { position: usize, expected: String },

    /// The statement ran and failed; retrying would not help.
    #[error("database error: {0}")]
    Fatal(String),
}

/// Executes single statements against the database.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Run one statement, binding `params` positionally.
    async fn execute(&self, statement: &BoundStatement) -> Result<RowSet, BackendError>;

    /// Ceiling on concurrent connections, for diagnostics.
    fn max_connections(&self) -> u32;
}
