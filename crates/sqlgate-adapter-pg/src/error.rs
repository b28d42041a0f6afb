//! Mapping of driver errors onto the backend taxonomy.

use sqlgate_core::BackendError;

/// SQLSTATE raised when a statement is cancelled or hits `statement_timeout`.
const QUERY_CANCELED: &str = "57014";

/// Classify a driver error as transient, pool exhaustion, cancellation or fatal.
pub fn map_sqlx_error(err: sqlx::Error) -> BackendError {
    match &err {
        sqlx::Error::PoolTimedOut => BackendError::PoolExhausted,
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => BackendError::Transient(err.to_string()),
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(QUERY_CANCELED) => BackendError::Cancelled,
            Some(code) if is_transient_sqlstate(code) => {
                BackendError::Transient(db.message().to_string())
            }
            _ => BackendError::Fatal(db.message().to_string()),
        },
        _ => BackendError::Fatal(err.to_string()),
    }
}

/// Classify a failed pool checkout.
///
/// sqlx keeps retrying a refused connect until the acquire timeout and then
/// reports `PoolTimedOut`, the same error it gives when every connection is
/// checked out. A pool with free slots (`open < max`) timed out because it
/// could not reach the server, which is a connection failure.
pub fn map_acquire_error(err: sqlx::Error, open: u32, max: u32) -> BackendError {
    match err {
        sqlx::Error::PoolTimedOut if open < max => BackendError::Transient(
            "timed out opening a database connection".to_string(),
        ),
        other => map_sqlx_error(other),
    }
}

/// Connection exceptions, resource exhaustion and server shutdown.
fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "53300" | "57P01" | "57P02" | "57P03")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_exhaustion() {
        assert_eq!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            BackendError::PoolExhausted
        );
    }

    #[test]
    fn acquire_timeout_depends_on_free_slots() {
        assert!(matches!(
            map_acquire_error(sqlx::Error::PoolTimedOut, 0, 5),
            BackendError::Transient(_)
        ));
        assert!(matches!(
            map_acquire_error(sqlx::Error::PoolTimedOut, 4, 5),
            BackendError::Transient(_)
        ));
        assert_eq!(
            map_acquire_error(sqlx::Error::PoolTimedOut, 5, 5),
            BackendError::PoolExhausted
        );
        assert!(matches!(
            map_acquire_error(sqlx::Error::RowNotFound, 0, 5),
            BackendError::Fatal(_)
        ));
    }

    #[test]
    fn io_failures_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        assert!(matches!(
            map_sqlx_error(sqlx::Error::Io(io)),
            BackendError::Transient(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolClosed),
            BackendError::Transient(_)
        ));
    }

    #[test]
    fn other_errors_are_fatal() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            BackendError::Fatal(_)
        ));
    }

    #[test]
    fn sqlstate_classes() {
        assert!(is_transient_sqlstate("08006"));
        assert!(is_transient_sqlstate("53300"));
        assert!(!is_transient_sqlstate("42P01"));
    }
}
