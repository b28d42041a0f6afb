//! MCP JSON-RPC tests.

use super::common::*;
use axum::http::StatusCode;
use serde_json::{Value, json};
use sqlgate_mcp::JsonRpcRequest;

async fn call(ctx: &TestContext, tool: &str, arguments: Value) -> Value {
    let response = ctx
        .server
        .handle_request(
            JsonRpcRequest::new(1, "tools/call", Some(json!({"name": tool, "arguments": arguments}))),
            Some("rpc-1"),
        )
        .await;
    assert!(response.error.is_none(), "unexpected error: {:?}", response.error);
    response.result.unwrap()
}

#[tokio::test]
async fn initialize_announces_server() {
    let ctx = context(FakeBackend::with_rows(0)).await;

    let response = ctx
        .server
        .handle_request(JsonRpcRequest::new(1, "initialize", None), None)
        .await;
    let result = response.result.unwrap();
    assert_eq!(result["serverInfo"]["name"], "sqlgate");
    assert_eq!(result["protocolVersion"], "2024-11-05");
}

#[tokio::test]
async fn tools_list_includes_one_tool_per_template() {
    let ctx = context(FakeBackend::with_rows(0)).await;

    let response = ctx
        .server
        .handle_request(JsonRpcRequest::new(2, "tools/list", None), None)
        .await;
    let tools = response.result.unwrap()["tools"].clone();
    let names: Vec<&str> = tools
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();

    for expected in [
        "api_info",
        "get_version",
        "incidents",
        "list_templates",
        "open_items",
        "purge",
        "query_template",
        "render_template",
    ] {
        assert!(names.contains(&expected), "missing tool {expected}");
    }
    assert!(!names.contains(&"execute_query"));
}

#[tokio::test]
async fn template_tool_runs_query() {
    let ctx = context(FakeBackend::with_rows(5)).await;

    let result = call(
        &ctx,
        "incidents",
        json!({"schema": "itsm", "params": ["P1"], "limit": 3}),
    )
    .await;

    assert_eq!(result["isError"], false);
    let envelope = tool_payload(&result);
    assert_eq!(envelope["row_count"], 3);
    assert_eq!(envelope["request_id"], "rpc-1");
    assert_eq!(envelope["template"], "incidents.sql");
}

#[tokio::test]
async fn get_version_without_arguments() {
    let ctx = context(FakeBackend::with_rows(1)).await;

    let result = call(&ctx, "get_version", Value::Null).await;
    assert_eq!(result["isError"], false);
    assert_eq!(tool_payload(&result)["row_count"], 1);
}

#[tokio::test]
async fn denied_tool_call_is_an_error_result() {
    let ctx = context(FakeBackend::with_rows(1)).await;

    let result = call(&ctx, "purge", json!({"schema": "itsm", "params": ["2020-01-01"]})).await;
    assert_eq!(result["isError"], true);
    assert_eq!(tool_payload(&result)["error"]["code"], "permission_denied");
    assert!(ctx.backend.seen().is_empty());
}

#[tokio::test]
async fn bad_arguments_are_rejected_with_envelope() {
    let ctx = context(FakeBackend::with_rows(1)).await;

    let result = call(&ctx, "incidents", json!({"schema": "itsm", "limit": "many"})).await;
    assert_eq!(result["isError"], true);
    let envelope = tool_payload(&result);
    assert_eq!(envelope["error"]["code"], "invalid_request");
    assert_eq!(envelope["template"], "incidents.sql");
}

#[tokio::test]
async fn render_template_tool() {
    let ctx = context(FakeBackend::with_rows(1)).await;

    let result = call(
        &ctx,
        "render_template",
        json!({"template": "open_items.sql", "view": "open_incidents", "schema": "itsm"}),
    )
    .await;
    assert_eq!(tool_payload(&result)["sql"], "SELECT * FROM open_incidents");
    assert!(ctx.backend.seen().is_empty());
}

#[tokio::test]
async fn unknown_tool_and_method() {
    let ctx = context(FakeBackend::with_rows(1)).await;

    let response = ctx
        .server
        .handle_request(
            JsonRpcRequest::new(3, "tools/call", Some(json!({"name": "drop_everything"}))),
            None,
        )
        .await;
    assert_eq!(response.error.unwrap().code, -32602);

    let response = ctx
        .server
        .handle_request(JsonRpcRequest::new(4, "resources/list", None), None)
        .await;
    assert_eq!(response.error.unwrap().code, -32601);
}

#[tokio::test]
async fn execute_query_tool_when_enabled() {
    let ctx = context_with(FakeBackend::with_rows(2), |config| {
        config.guardrails.free_execute = true;
    })
    .await;
    assert!(ctx.server.tools().get("execute_query").is_some());

    let result = call(&ctx, "execute_query", json!({"sql": "SELECT * FROM itsm.incident"})).await;
    assert_eq!(result["isError"], false);
    assert_eq!(tool_payload(&result)["row_count"], 2);
}

#[tokio::test]
async fn mcp_over_http() {
    let ctx = context(FakeBackend::with_rows(1)).await;

    let response = post_json(
        ctx.router(),
        "/mcp",
        json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call",
               "params": {"name": "list_templates", "arguments": {}}}),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["id"], 7);
    let templates = &tool_payload(&response.body["result"])["templates"];
    assert_eq!(templates.as_array().unwrap().len(), TEMPLATES.len());
}

#[tokio::test]
async fn mcp_notification_over_http_is_accepted() {
    let ctx = context(FakeBackend::with_rows(1)).await;

    let response = post_json(
        ctx.router(),
        "/mcp",
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
}
