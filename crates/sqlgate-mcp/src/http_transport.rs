//! HTTP transport for the MCP server.
//!
//! Serves JSON-RPC on `POST /mcp` next to a small REST surface over the same
//! [`GatewayService`](crate::service::GatewayService). Error responses always
//! carry a provenance envelope; the status code follows
//! [`GatewayError::http_status`].

use crate::error::{GatewayError, McpError};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, codes};
use crate::server::McpServer;
use crate::service::{ExecuteRequest, Served, TemplateRequest};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the router. Request ids are set (UUID v4 when absent) before
/// tracing and echoed back on the response.
pub fn create_router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/healthz", get(handle_health))
        .route("/_alive", get(handle_alive))
        .route("/api/info", get(handle_info))
        .route("/api/templates", get(handle_templates))
        .route("/api/render", post(handle_render))
        .route("/api/query", post(handle_query))
        .route("/api/execute", post(handle_execute))
        .route("/mcp", post(handle_mcp))
        .with_state(server)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                tracing::info_span!(
                    "http",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id
                )
            }),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(server: Arc<McpServer>, addr: &str, shutdown: F) -> Result<(), McpError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| McpError::StartupFailed(format!("failed to bind {addr}: {e}")))?;
    tracing::info!(addr = %addr, "Starting MCP server with HTTP transport");

    axum::serve(listener, create_router(server))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| McpError::TransportError(e.to_string()))
}

fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok())
}

fn served_response(served: Served) -> Response {
    (served.status(), Json(served.envelope)).into_response()
}

fn rejection(rejection: JsonRejection) -> GatewayError {
    GatewayError::InvalidRequest(rejection.body_text())
}

async fn handle_health(State(server): State<Arc<McpServer>>) -> impl IntoResponse {
    Json(server.service().health())
}

async fn handle_alive() -> impl IntoResponse {
    Json(json!({ "status": "alive" }))
}

async fn handle_info(State(server): State<Arc<McpServer>>) -> impl IntoResponse {
    Json(server.service().info())
}

async fn handle_templates(
    State(server): State<Arc<McpServer>>,
    headers: HeaderMap,
) -> Response {
    match server.service().list_templates().await {
        Ok(templates) => Json(json!({ "templates": templates })).into_response(),
        Err(e) => served_response(server.service().reject(None, e, request_id(&headers))),
    }
}

async fn handle_render(
    State(server): State<Arc<McpServer>>,
    headers: HeaderMap,
    body: Result<Json<TemplateRequest>, JsonRejection>,
) -> Response {
    let service = server.service();
    let request = match body {
        Ok(Json(request)) => request,
        Err(e) => return served_response(service.reject(None, rejection(e), request_id(&headers))),
    };
    match service.render(&request).await {
        Ok(rendered) => Json(rendered).into_response(),
        Err(e) => served_response(service.reject(
            Some(&request.template),
            e,
            request_id(&headers),
        )),
    }
}

async fn handle_query(
    State(server): State<Arc<McpServer>>,
    headers: HeaderMap,
    body: Result<Json<TemplateRequest>, JsonRejection>,
) -> Response {
    let service = server.service();
    let served = match body {
        Ok(Json(request)) => service.query(request, request_id(&headers)).await,
        Err(e) => service.reject(None, rejection(e), request_id(&headers)),
    };
    served_response(served)
}

async fn handle_execute(
    State(server): State<Arc<McpServer>>,
    headers: HeaderMap,
    body: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Response {
    let service = server.service();
    let served = match body {
        Ok(Json(request)) => service.execute(request, request_id(&headers)).await,
        Err(e) => service.reject(None, rejection(e), request_id(&headers)),
    };
    served_response(served)
}

async fn handle_mcp(
    State(server): State<Arc<McpServer>>,
    headers: HeaderMap,
    body: Result<Json<JsonRpcRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(e) => {
            let response = JsonRpcResponse::error(
                None,
                codes::PARSE_ERROR,
                format!("Parse error: {}", e.body_text()),
            );
            return (StatusCode::OK, Json(response)).into_response();
        }
    };

    let notification = request.is_notification();
    let response = server.handle_request(request, request_id(&headers)).await;
    if notification {
        return StatusCode::ACCEPTED.into_response();
    }
    Json(response).into_response()
}
