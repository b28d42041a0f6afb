//! Error types for the gateway.

use axum::http::StatusCode;
use sqlgate_core::{BackendError, OperationKind};
use sqlgate_sql::SqlError;
use sqlgate_template::TemplateError;
use thiserror::Error;

/// Everything a request can fail with, as reported to callers.
///
/// Sanitization failures carry generic messages; the rejected text is only
/// ever logged at debug level by the component that rejected it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("unsafe template name")]
    UnsafeTemplateName,

    #[error("template not found: {name}")]
    TemplateNotFound { name: String },

    #[error("missing substitution for placeholder '{placeholder}'")]
    MissingSubstitution { placeholder: String },

    #[error("unsupported substitution placeholder")]
    UnsupportedSubstitution,

    #[error("substitution for '{placeholder}' is not a valid identifier")]
    InvalidIdentifier { placeholder: String },

    #[error("row limit must be between 1 and {max}")]
    InvalidRowLimit { max: u32 },

    #[error("{kind} is not permitted on schema '{schema}'")]
    PermissionDenied { schema: String, kind: OperationKind },

    #[error("database connection unavailable")]
    TransientConnectionError,

    #[error("connection pool exhausted")]
    PoolExhausted,

    #[error("invalid timestamp")]
    InvalidTimestamp,

    /// The query hit its deadline or the caller went away.
    #[error("query cancelled")]
    QueryCancelled,

    #[error("too many concurrent queries")]
    TooManyRequests,

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("free execute is disabled")]
    FreeExecuteDisabled,
}

impl GatewayError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::UnsafeTemplateName => "unsafe_template_name",
            GatewayError::TemplateNotFound { .. } => "template_not_found",
            GatewayError::MissingSubstitution { .. } => "missing_substitution",
            GatewayError::UnsupportedSubstitution => "unsupported_substitution",
            GatewayError::InvalidIdentifier { .. } => "invalid_identifier",
            GatewayError::InvalidRowLimit { .. } => "invalid_row_limit",
            GatewayError::PermissionDenied { .. } => "permission_denied",
            GatewayError::TransientConnectionError => "transient_connection_error",
            GatewayError::PoolExhausted => "pool_exhausted",
            GatewayError::InvalidTimestamp => "invalid_timestamp",
            GatewayError::QueryCancelled => "query_cancelled",
            GatewayError::TooManyRequests => "too_many_requests",
            GatewayError::DatabaseError(_) => "database_error",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::FreeExecuteDisabled => "free_execute_disabled",
        }
    }

    /// Whether the caller may usefully try the same request again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::TransientConnectionError
                | GatewayError::PoolExhausted
                | GatewayError::TooManyRequests
        )
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            GatewayError::UnsafeTemplateName
            | GatewayError::MissingSubstitution { .. }
            | GatewayError::UnsupportedSubstitution
            | GatewayError::InvalidIdentifier { .. }
            | GatewayError::InvalidRowLimit { .. }
            | GatewayError::InvalidTimestamp
            | GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::PermissionDenied { .. } | GatewayError::FreeExecuteDisabled => {
                StatusCode::FORBIDDEN
            }
            GatewayError::TemplateNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::TransientConnectionError | GatewayError::PoolExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::QueryCancelled => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TemplateError> for GatewayError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::UnsafeTemplateName => GatewayError::UnsafeTemplateName,
            TemplateError::TemplateNotFound { name } | TemplateError::Unreadable { name } => {
                GatewayError::TemplateNotFound { name }
            }
            TemplateError::MissingSubstitution { placeholder } => {
                GatewayError::MissingSubstitution { placeholder }
            }
            TemplateError::UnsupportedSubstitution { .. } => GatewayError::UnsupportedSubstitution,
            TemplateError::InvalidIdentifier { placeholder, .. } => {
                GatewayError::InvalidIdentifier { placeholder }
            }
        }
    }
}

impl From<BackendError> for GatewayError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Transient(_) => GatewayError::TransientConnectionError,
            BackendError::PoolExhausted => GatewayError::PoolExhausted,
            BackendError::Cancelled => GatewayError::QueryCancelled,
            invalid @ BackendError::InvalidParameter { .. } => {
                GatewayError::InvalidRequest(invalid.to_string())
            }
            BackendError::Fatal(message) => GatewayError::DatabaseError(message),
        }
    }
}

impl From<SqlError> for GatewayError {
    fn from(err: SqlError) -> Self {
        GatewayError::InvalidRequest(err.to_string())
    }
}

/// Errors that stop the MCP server itself.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to start MCP server: {0}")]
    StartupFailed(String),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
