//! Error types for the SQL helpers.

use thiserror::Error;

/// Errors raised while inspecting SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlError {
    /// The statement could not be parsed, so its schemas are unknown.
    #[error("statement could not be parsed")]
    Unparseable,

    /// A quoted schema qualifier that only matches case-sensitively; policy
    /// keys are lower-case and cannot name it.
    #[error("quoted schema name \"{0}\" is case-sensitive and cannot be authorized")]
    CaseSensitiveSchema(String),
}
