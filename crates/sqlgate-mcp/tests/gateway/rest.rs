//! REST endpoint tests.
//!
//! Every failure must come back as an envelope with a stable error code and
//! the status from the error taxonomy; nothing may reach the backend before
//! authorization.

use super::common::*;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use sqlgate_core::{BackendError, OperationKind};

// =============================================================================
// HEALTH AND INFO
// =============================================================================

#[tokio::test]
async fn health_reports_template_root_without_database() {
    let ctx = context(FakeBackend::failing(BackendError::Transient("down".into()))).await;

    let response = get(ctx.router(), "/healthz").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert!(response.body["template_root"].as_str().is_some());
    assert!(ctx.backend.seen().is_empty());

    let alive = get(ctx.router(), "/_alive").await;
    assert_eq!(alive.status, StatusCode::OK);
}

#[tokio::test]
async fn info_exposes_limits_and_permissions() {
    let ctx = context_with(FakeBackend::with_rows(0), |config| {
        config
            .permissions
            .set_schema_override("itsm", OperationKind::Delete, true);
    })
    .await;

    let response = get(ctx.router(), "/api/info").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["name"], "sqlgate");
    assert_eq!(response.body["max_row_limit"], 10_000);
    assert_eq!(response.body["max_connections"], 5);
    assert_eq!(response.body["free_execute"], false);
    assert_eq!(
        response.body["permissions"]["effective"]["itsm"]["delete"],
        true
    );
}

#[tokio::test]
async fn templates_are_listed_with_placeholders() {
    let ctx = context(FakeBackend::with_rows(0)).await;

    let response = get(ctx.router(), "/api/templates").await;
    assert_eq!(response.status, StatusCode::OK);
    let templates = response.body["templates"].as_array().unwrap();
    assert_eq!(templates.len(), TEMPLATES.len());
    let incidents = templates
        .iter()
        .find(|t| t["name"] == "incidents.sql")
        .unwrap();
    assert_eq!(incidents["tool"], "incidents");
    assert_eq!(incidents["placeholders"], json!(["schema"]));
}

// =============================================================================
// RENDER
// =============================================================================

#[tokio::test]
async fn render_returns_sql_without_executing() {
    let ctx = context(FakeBackend::with_rows(3)).await;

    let response = post_json(
        ctx.router(),
        "/api/render",
        json!({"template": "incidents.sql", "schema": "itsm", "params": ["P1"]}),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.body["sql"],
        "SELECT id, opened_at FROM itsm.incident WHERE priority = $1"
    );
    assert_eq!(response.body["params"], json!(["P1"]));
    assert_eq!(response.body["kind"], "SELECT");
    assert!(ctx.backend.seen().is_empty());
}

#[tokio::test]
async fn render_rejects_injected_identifier() {
    let ctx = context(FakeBackend::with_rows(3)).await;

    let response = post_json(
        ctx.router(),
        "/api/render",
        json!({"template": "incidents.sql", "schema": "itsm; DROP TABLE users"}),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"]["code"], "invalid_identifier");
    assert!(
        !response.body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("DROP")
    );
}

// =============================================================================
// QUERY
// =============================================================================

#[tokio::test]
async fn query_returns_envelope() {
    let ctx = context(FakeBackend::with_rows(3)).await;

    let response = post_json(
        ctx.router(),
        "/api/query",
        json!({"template": "incidents.sql", "schema": "ITSM", "params": ["P1"], "limit": 2}),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    let body = &response.body;
    assert_eq!(body["template"], "incidents.sql");
    assert_eq!(body["sql_or_view"], "incidents.sql");
    assert_eq!(body["schema"], "itsm");
    assert_eq!(body["kind"], "SELECT");
    assert_eq!(body["row_count"], 2);
    assert_eq!(body["columns"], json!(["id", "opened_at"]));
    assert_eq!(body["rows"][0], json!({"id": 1, "opened_at": "2020-01-01T00:00:00Z"}));
    assert_eq!(body["params"], json!(["P1"]));
    assert_eq!(body["stale"], true);
    assert!(body["sql"].as_str().unwrap().ends_with("LIMIT 2"));
    assert!(body.get("error").is_none());

    let seen = ctx.backend.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].params, vec![json!("P1")]);
}

#[tokio::test]
async fn view_template_reports_view_name() {
    let ctx = context(FakeBackend::with_rows(1)).await;

    let response = post_json(
        ctx.router(),
        "/api/query",
        json!({"template": "open_items.sql", "view": "itsm.open_incidents"}),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["sql_or_view"], "itsm.open_incidents");
    assert_eq!(response.body["schema"], "itsm");
}

#[tokio::test]
async fn denied_write_never_reaches_database() {
    let ctx = context(FakeBackend::with_rows(3)).await;

    let response = post_json(
        ctx.router(),
        "/api/query",
        json!({"template": "purge.sql", "schema": "itsm", "params": ["2020-01-01"]}),
    )
    .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["error"]["code"], "permission_denied");
    assert_eq!(response.body["error"]["retryable"], false);
    assert_eq!(response.body["kind"], "DELETE");
    assert_eq!(response.body["row_count"], 0);
    assert!(response.body.get("sql").is_none());
    assert!(ctx.backend.seen().is_empty());
}

#[tokio::test]
async fn granted_write_reports_rows_affected() {
    let ctx = context_with(FakeBackend::with_rows(4), |config| {
        config
            .permissions
            .set_schema_override("itsm", OperationKind::Delete, true);
    })
    .await;

    let response = post_json(
        ctx.router(),
        "/api/query",
        json!({"template": "purge.sql", "schema": "itsm", "params": ["2020-01-01"]}),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["rows_affected"], 4);
    assert_eq!(
        ctx.backend.seen()[0].sql,
        "DELETE FROM itsm.incident WHERE closed_at < $1"
    );
}

#[tokio::test]
async fn unsafe_template_name_is_not_echoed() {
    let ctx = context(FakeBackend::with_rows(1)).await;

    let response = post_json(
        ctx.router(),
        "/api/query",
        json!({"template": "../../etc/passwd"}),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"]["code"], "unsafe_template_name");
    assert!(response.body.get("template").is_none());
}

#[tokio::test]
async fn missing_template_is_not_found() {
    let ctx = context(FakeBackend::with_rows(1)).await;

    let response = post_json(ctx.router(), "/api/query", json!({"template": "nope.sql"})).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"]["code"], "template_not_found");
}

#[tokio::test]
async fn row_limit_above_maximum_is_rejected() {
    let ctx = context(FakeBackend::with_rows(1)).await;

    let response = post_json(
        ctx.router(),
        "/api/query",
        json!({"template": "get_version.sql", "limit": 10_001}),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"]["code"], "invalid_row_limit");
    assert!(ctx.backend.seen().is_empty());
}

#[tokio::test]
async fn transient_backend_failure_is_retryable() {
    let ctx = context(FakeBackend::failing(BackendError::Transient(
        "connection refused".into(),
    )))
    .await;

    let response = post_json(
        ctx.router(),
        "/api/query",
        json!({"template": "get_version.sql"}),
    )
    .await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body["error"]["code"], "transient_connection_error");
    assert_eq!(response.body["error"]["retryable"], true);
}

#[tokio::test]
async fn malformed_body_is_an_invalid_request_envelope() {
    let ctx = context(FakeBackend::with_rows(1)).await;

    let response = send(
        ctx.router(),
        Request::builder()
            .method("POST")
            .uri("/api/query")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"]["code"], "invalid_request");
    assert!(response.body["request_id"].as_str().is_some());
}

// =============================================================================
// FREE EXECUTE
// =============================================================================

#[tokio::test]
async fn execute_is_forbidden_unless_enabled() {
    let ctx = context(FakeBackend::with_rows(1)).await;

    let response = post_json(ctx.router(), "/api/execute", json!({"sql": "SELECT 1"})).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["error"]["code"], "free_execute_disabled");
    assert!(ctx.backend.seen().is_empty());
}

#[tokio::test]
async fn execute_checks_every_referenced_schema() {
    let ctx = context_with(FakeBackend::with_rows(2), |config| {
        config.guardrails.free_execute = true;
        config
            .permissions
            .set_schema_override("hr", OperationKind::Select, false);
    })
    .await;

    let allowed = post_json(
        ctx.router(),
        "/api/execute",
        json!({"sql": "SELECT * FROM itsm.incident", "limit": 1}),
    )
    .await;
    assert_eq!(allowed.status, StatusCode::OK);
    assert_eq!(allowed.body["sql_or_view"], "execute_query");
    assert_eq!(allowed.body["row_count"], 1);

    let denied = post_json(
        ctx.router(),
        "/api/execute",
        json!({"sql": "SELECT * FROM itsm.incident i JOIN hr.employee e ON e.id = i.owner"}),
    )
    .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(denied.body["error"]["code"], "permission_denied");
    assert_eq!(ctx.backend.seen().len(), 1);
}

// =============================================================================
// REQUEST IDS
// =============================================================================

#[tokio::test]
async fn request_id_is_propagated_into_envelope() {
    let ctx = context(FakeBackend::with_rows(1)).await;

    let response = send(
        ctx.router(),
        Request::builder()
            .method("POST")
            .uri("/api/query")
            .header("content-type", "application/json")
            .header("x-request-id", "req-42")
            .body(Body::from(json!({"template": "get_version.sql"}).to_string()))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.request_id.as_deref(), Some("req-42"));
    assert_eq!(response.body["request_id"], "req-42");
}

#[tokio::test]
async fn request_id_is_minted_when_absent() {
    let ctx = context(FakeBackend::with_rows(1)).await;

    let response = post_json(
        ctx.router(),
        "/api/query",
        json!({"template": "get_version.sql"}),
    )
    .await;

    let minted = response.request_id.unwrap();
    assert!(uuid::Uuid::parse_str(&minted).is_ok());
    assert_eq!(response.body["request_id"], minted.as_str());
}
