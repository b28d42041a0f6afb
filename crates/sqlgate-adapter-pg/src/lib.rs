//! # sqlgate-adapter-pg
//!
//! PostgreSQL implementation of [`QueryBackend`] on top of a lazy sqlx pool.
//!
//! Each statement is prepared first so value parameters can be encoded as the
//! types the server inferred. Failed connection attempts are retried with
//! exponential backoff; a statement that reached the server is never re-sent.
//! A server-side `statement_timeout` backs up the executor's own deadline so
//! an abandoned query does not keep running.

pub mod bind;
pub mod decode;
pub mod error;

use async_trait::async_trait;
use sqlgate_core::config::SslMode;
use sqlgate_core::{BackendError, BoundStatement, ColumnMeta, QueryBackend, RowSet, UpstreamConfig};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::{Column, Either, Executor, Postgres, Statement, TypeInfo};
use std::str::FromStr;
use std::time::Duration;

pub use error::{map_acquire_error, map_sqlx_error};

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    retries: u32,
    backoff: Duration,
}

/// Pooled PostgreSQL backend.
pub struct PgBackend {
    pool: PgPool,
    max_connections: u32,
    retry: RetryPolicy,
}

impl PgBackend {
    /// Build the pool without opening a connection; the first query connects.
    pub fn connect_lazy(
        upstream: &UpstreamConfig,
        statement_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let url = upstream.connection_string();
        let mut options = PgConnectOptions::from_str(&url)
            .map_err(|e| BackendError::Fatal(format!("invalid connection settings: {e}")))?;

        if !url.contains("sslmode=") {
            options = options.ssl_mode(pg_ssl_mode(upstream.ssl_mode));
        }
        options = options.options([(
            "statement_timeout",
            statement_timeout.as_millis().to_string(),
        )]);

        let pool_config = &upstream.pool;
        let pool = PgPoolOptions::new()
            .max_connections(pool_config.max_connections)
            .min_connections(pool_config.min_connections)
            .acquire_timeout(Duration::from_secs(pool_config.acquire_timeout_seconds))
            .idle_timeout(Some(Duration::from_secs(pool_config.idle_timeout_seconds)))
            .connect_lazy_with(options);

        tracing::info!(
            target = %upstream.redacted_target(),
            max_connections = pool_config.max_connections,
            "Configured PostgreSQL pool"
        );

        Ok(Self {
            pool,
            max_connections: pool_config.max_connections,
            retry: RetryPolicy {
                retries: pool_config.connect_retries,
                backoff: Duration::from_millis(pool_config.retry_backoff_ms),
            },
        })
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn acquire(&self) -> Result<PoolConnection<Postgres>, BackendError> {
        let mut delay = self.retry.backoff;
        let mut attempt = 0;
        loop {
            let acquired = self
                .pool
                .acquire()
                .await
                .map_err(|e| map_acquire_error(e, self.pool.size(), self.max_connections));
            match acquired {
                Ok(conn) => return Ok(conn),
                Err(BackendError::Transient(reason)) if attempt < self.retry.retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "Database connection failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl QueryBackend for PgBackend {
    async fn execute(&self, statement: &BoundStatement) -> Result<RowSet, BackendError> {
        let mut conn = self.acquire().await?;

        let prepared = (&mut *conn)
            .prepare(statement.sql.as_str())
            .await
            .map_err(map_sqlx_error)?;

        let columns: Vec<ColumnMeta> = prepared
            .columns()
            .iter()
            .map(|c| ColumnMeta::new(c.name(), c.type_info().name()))
            .collect();

        let param_types: Vec<String> = match prepared.parameters() {
            Some(Either::Left(types)) => types.iter().map(|t| t.name().to_string()).collect(),
            _ => Vec::new(),
        };

        let args = bind::bind_params(&statement.params, &param_types)?;
        let query = sqlx::query_with(statement.sql.as_str(), args);

        if columns.is_empty() {
            let done = query.execute(&mut *conn).await.map_err(map_sqlx_error)?;
            return Ok(RowSet {
                columns,
                rows: Vec::new(),
                rows_affected: done.rows_affected(),
            });
        }

        let rows = query.fetch_all(&mut *conn).await.map_err(map_sqlx_error)?;
        let rows = rows
            .iter()
            .map(|row| decode::decode_row(row, &columns))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RowSet {
            columns,
            rows,
            rows_affected: 0,
        })
    }

    fn max_connections(&self) -> u32 {
        self.max_connections
    }
}

fn pg_ssl_mode(mode: SslMode) -> PgSslMode {
    match mode {
        SslMode::Disable => PgSslMode::Disable,
        SslMode::Allow => PgSslMode::Allow,
        SslMode::Prefer => PgSslMode::Prefer,
        SslMode::Require => PgSslMode::Require,
        SslMode::VerifyCa => PgSslMode::VerifyCa,
        SslMode::VerifyFull => PgSslMode::VerifyFull,
    }
}
