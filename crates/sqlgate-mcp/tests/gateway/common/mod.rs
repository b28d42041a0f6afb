//! Shared test infrastructure for the gateway integration tests.
//!
//! This module provides:
//! - A recording `QueryBackend` that never touches a database
//! - A template directory fixture
//! - Helpers to drive the axum router with `oneshot`

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use sqlgate_core::{
    BackendError, BoundStatement, ColumnMeta, GatewayConfig, PermissionsConfig, QueryBackend,
    RowSet,
};
use sqlgate_mcp::http_transport::create_router;
use sqlgate_mcp::{GatewayService, McpServer};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

// =============================================================================
// FAKE BACKEND
// =============================================================================

/// Serves `rows` incident rows for reads and reports `rows` affected for writes.
pub struct FakeBackend {
    pub rows: usize,
    pub fail: Option<BackendError>,
    seen: Mutex<Vec<BoundStatement>>,
}

impl FakeBackend {
    pub fn with_rows(rows: usize) -> Self {
        Self {
            rows,
            fail: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: BackendError) -> Self {
        Self {
            fail: Some(err),
            ..Self::with_rows(0)
        }
    }

    pub fn seen(&self) -> Vec<BoundStatement> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryBackend for FakeBackend {
    async fn execute(&self, statement: &BoundStatement) -> Result<RowSet, BackendError> {
        self.seen.lock().unwrap().push(statement.clone());
        if let Some(err) = &self.fail {
            return Err(err.clone());
        }

        if !statement.sql.trim_start().to_uppercase().starts_with("SELECT") {
            return Ok(RowSet {
                columns: Vec::new(),
                rows: Vec::new(),
                rows_affected: self.rows as u64,
            });
        }

        let limit = statement
            .sql
            .rsplit_once(" LIMIT ")
            .and_then(|(_, n)| n.trim().parse::<usize>().ok())
            .unwrap_or(usize::MAX);
        let rows = (0..self.rows.min(limit))
            .map(|i| vec![json!(i + 1), json!("2020-01-01T00:00:00Z")])
            .collect();
        Ok(RowSet {
            columns: vec![
                ColumnMeta::new("id", "INT4"),
                ColumnMeta::new("opened_at", "TIMESTAMPTZ"),
            ],
            rows,
            rows_affected: 0,
        })
    }

    fn max_connections(&self) -> u32 {
        5
    }
}

// =============================================================================
// FIXTURES
// =============================================================================

pub const TEMPLATES: &[(&str, &str)] = &[
    ("get_version.sql", "SELECT version();"),
    (
        "incidents.sql",
        "SELECT id, opened_at FROM {schema}.incident WHERE priority = $1",
    ),
    ("purge.sql", "DELETE FROM {schema}.incident WHERE closed_at < $1"),
    ("open_items.sql", "SELECT * FROM {view}"),
];

pub struct TestContext {
    _dir: tempfile::TempDir,
    pub backend: Arc<FakeBackend>,
    pub server: Arc<McpServer>,
}

impl TestContext {
    pub fn router(&self) -> Router {
        create_router(self.server.clone())
    }
}

pub async fn context(backend: FakeBackend) -> TestContext {
    context_with(backend, |_| {}).await
}

pub async fn context_with(
    backend: FakeBackend,
    configure: impl FnOnce(&mut GatewayConfig),
) -> TestContext {
    let dir = tempfile::tempdir().unwrap();
    for (name, body) in TEMPLATES {
        std::fs::write(dir.path().join(name), body).unwrap();
    }

    let mut config = GatewayConfig::default();
    config.templates.root = dir.path().to_path_buf();
    config.permissions = PermissionsConfig::default();
    configure(&mut config);

    let backend = Arc::new(backend);
    let service = Arc::new(GatewayService::from_config(&config, backend.clone()));
    let mut server = McpServer::new(config.mcp.clone(), service);
    server.generate_tools().await.unwrap();

    TestContext {
        _dir: dir,
        backend,
        server: Arc::new(server),
    }
}

// =============================================================================
// HTTP HELPERS
// =============================================================================

pub struct TestResponse {
    pub status: StatusCode,
    pub request_id: Option<String>,
    pub body: Value,
}

pub async fn send(router: Router, request: Request<Body>) -> TestResponse {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    TestResponse {
        status,
        request_id,
        body,
    }
}

pub async fn get(router: Router, uri: &str) -> TestResponse {
    send(
        router,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

pub async fn post_json(router: Router, uri: &str, body: Value) -> TestResponse {
    send(
        router,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

/// Unwrap the JSON payload of a `tools/call` result.
pub fn tool_payload(result: &Value) -> &Value {
    &result["content"][0]["json"]
}
