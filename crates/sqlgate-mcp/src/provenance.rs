//! Response envelopes.
//!
//! Success and failure share one shape: a failed request has `row_count = 0`,
//! no rows, no SQL text and an `error` object, but keeps the template, schema
//! and parameters that were resolved before it failed.

use crate::error::GatewayError;
use crate::executor::{ExecutionContext, QueryAttempt};
use crate::staleness::rows_stale;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlgate_core::OperationKind;
use std::time::Duration;

/// Error object carried by a failed envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&GatewayError> for ErrorDetail {
    fn from(err: &GatewayError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// The unit returned to callers for every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEnvelope {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_or_view: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<OperationKind>,
    pub params: Vec<Value>,
    /// Statement sent to the database, before parameter binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub row_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl ProvenanceEnvelope {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Builds envelopes; holds the freshness threshold for the `stale` flag.
#[derive(Debug, Clone)]
pub struct ProvenanceBuilder {
    freshness: Duration,
}

impl ProvenanceBuilder {
    pub fn new(freshness: Duration) -> Self {
        Self { freshness }
    }

    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    /// Envelope for a finished attempt, stamped with `now`.
    pub fn build(
        &self,
        attempt: &QueryAttempt,
        request_id: &str,
        now: DateTime<Utc>,
    ) -> ProvenanceEnvelope {
        let result = match &attempt.result {
            Ok(result) => result,
            Err(err) => return self.failure(&attempt.context, err, request_id, now),
        };
        let context = &attempt.context;
        let is_write = context.kind.is_some_and(OperationKind::is_write);

        ProvenanceEnvelope {
            stale: rows_stale(&result.columns, &result.rows, now, self.freshness),
            rows_affected: is_write.then_some(result.rows_affected),
            elapsed_ms: Some(result.elapsed.as_millis() as u64),
            sql: Some(result.sql.clone()),
            columns: result.column_names(),
            rows: result.rows.clone(),
            row_count: result.row_count,
            error: None,
            ..self.base(context, request_id, now)
        }
    }

    /// Envelope for a request that failed with `error`.
    pub fn failure(
        &self,
        context: &ExecutionContext,
        error: &GatewayError,
        request_id: &str,
        now: DateTime<Utc>,
    ) -> ProvenanceEnvelope {
        ProvenanceEnvelope {
            error: Some(ErrorDetail::from(error)),
            ..self.base(context, request_id, now)
        }
    }

    fn base(
        &self,
        context: &ExecutionContext,
        request_id: &str,
        now: DateTime<Utc>,
    ) -> ProvenanceEnvelope {
        ProvenanceEnvelope {
            request_id: request_id.to_string(),
            sql_or_view: context.sql_or_view.clone(),
            template: context.template.clone(),
            schema: context.schema.clone(),
            kind: context.kind,
            params: context.params.clone(),
            sql: None,
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            rows_affected: None,
            row_limit: context.row_limit,
            elapsed_ms: None,
            timestamp: now,
            stale: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::QueryResult;
    use chrono::TimeZone;
    use serde_json::json;
    use sqlgate_core::ColumnMeta;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    fn context() -> ExecutionContext {
        ExecutionContext {
            template: Some("incidents.sql".into()),
            sql_or_view: Some("incidents.sql".into()),
            schema: Some("itsm".into()),
            kind: Some(OperationKind::Select),
            params: vec![json!(42)],
            row_limit: Some(10),
        }
    }

    fn row(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn success_envelope() {
        let attempt = QueryAttempt {
            context: context(),
            result: Ok(QueryResult {
                columns: vec![
                    ColumnMeta::new("id", "INT4"),
                    ColumnMeta::new("opened_at", "TIMESTAMPTZ"),
                ],
                rows: vec![row(&[("id", json!(42)), ("opened_at", json!("2020-01-01T00:00:00Z"))])],
                row_count: 1,
                rows_affected: 0,
                elapsed: Duration::from_millis(12),
                sql: "SELECT * FROM (\nSELECT 1\n) AS bounded LIMIT 10".into(),
            }),
        };
        let envelope = ProvenanceBuilder::new(Duration::from_secs(86_400)).build(&attempt, "req-1", now());

        assert_eq!(envelope.request_id, "req-1");
        assert_eq!(envelope.row_count, 1);
        assert_eq!(envelope.columns, vec!["id", "opened_at"]);
        assert_eq!(envelope.stale, Some(true));
        assert_eq!(envelope.rows_affected, None);
        assert_eq!(envelope.elapsed_ms, Some(12));
        assert!(!envelope.is_error());

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["sql_or_view"], "incidents.sql");
        assert_eq!(json["kind"], "SELECT");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failure_envelope_keeps_context_but_no_sql() {
        let attempt = QueryAttempt {
            context: context(),
            result: Err(GatewayError::PermissionDenied {
                schema: "itsm".into(),
                kind: OperationKind::Select,
            }),
        };
        let envelope = ProvenanceBuilder::new(Duration::from_secs(60)).build(&attempt, "req-2", now());

        assert_eq!(envelope.row_count, 0);
        assert!(envelope.rows.is_empty());
        assert_eq!(envelope.sql, None);
        assert_eq!(envelope.template.as_deref(), Some("incidents.sql"));
        assert_eq!(envelope.schema.as_deref(), Some("itsm"));
        assert_eq!(envelope.params, vec![json!(42)]);

        let error = envelope.error.unwrap();
        assert_eq!(error.code, "permission_denied");
        assert!(!error.retryable);
    }

    #[test]
    fn write_reports_rows_affected() {
        let mut ctx = context();
        ctx.kind = Some(OperationKind::Delete);
        let attempt = QueryAttempt {
            context: ctx,
            result: Ok(QueryResult {
                columns: vec![],
                rows: vec![],
                row_count: 0,
                rows_affected: 3,
                elapsed: Duration::ZERO,
                sql: "DELETE FROM itsm.incident".into(),
            }),
        };
        let envelope = ProvenanceBuilder::new(Duration::from_secs(60)).build(&attempt, "r", now());
        assert_eq!(envelope.rows_affected, Some(3));
        assert_eq!(envelope.stale, None);
    }
}
