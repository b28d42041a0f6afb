//! MCP server implementation.
//!
//! Serves JSON-RPC over stdio (one message per line) or over HTTP via
//! [`crate::http_transport`]. Every tool call goes through the shared
//! [`GatewayService`], so both transports enforce the same policy.

use crate::error::{GatewayError, McpError};
use crate::http_transport;
use crate::protocol::*;
use crate::service::{ExecuteRequest, GatewayService, TemplateRequest};
use crate::tool_generator::{
    API_INFO, EXECUTE_QUERY, LIST_TEMPLATES, QUERY_TEMPLATE, RENDER_TEMPLATE, ToolGenerator,
};
use crate::tools::{ToolRegistry, ToolTarget};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use sqlgate_core::{McpConfig, Transport};
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Arguments of a per-template tool.
#[derive(Debug, Default, Deserialize)]
struct TemplateToolArgs {
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    view: Option<String>,
    #[serde(default)]
    params: Vec<Value>,
    #[serde(default)]
    limit: Option<u32>,
}

/// The MCP server.
pub struct McpServer {
    config: McpConfig,
    service: Arc<GatewayService>,
    tools: ToolRegistry,
}

impl McpServer {
    /// Create a server with no tools; call [`McpServer::generate_tools`] next.
    pub fn new(config: McpConfig, service: Arc<GatewayService>) -> Self {
        Self {
            config,
            service,
            tools: ToolRegistry::new(),
        }
    }

    pub fn service(&self) -> &Arc<GatewayService> {
        &self.service
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &McpConfig {
        &self.config
    }

    /// Build the tool registry from the template catalog.
    pub async fn generate_tools(&mut self) -> Result<usize, GatewayError> {
        let store = self.service.executor().store();
        let mut templates = Vec::new();
        for name in store.list().await? {
            match store.load(&name).await {
                Ok(template) => templates.push(template),
                Err(e) => tracing::warn!(template = %name, error = %e, "Skipping template"),
            }
        }

        let settings = self.service.executor().settings();
        self.tools =
            ToolGenerator::new(templates, settings.max_row_limit, settings.free_execute)
                .generate_all();

        tracing::info!(
            tool_count = self.tools.len(),
            "Generated tools from template catalog"
        );
        Ok(self.tools.len())
    }

    /// Serve on the configured transport until `shutdown` resolves.
    pub async fn run<F>(self: Arc<Self>, shutdown: F) -> Result<(), McpError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.config.transport {
            Transport::Stdio => self.run_stdio(shutdown).await,
            Transport::Http => {
                let addr = self.config.bind_addr();
                http_transport::serve(self, &addr, shutdown).await
            }
        }
    }

    async fn run_stdio<F>(&self, shutdown: F) -> Result<(), McpError>
    where
        F: Future<Output = ()> + Send,
    {
        tracing::info!("Starting MCP server with stdio transport");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        tokio::pin!(shutdown);

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = &mut shutdown => {
                    tracing::info!("Stdio transport shutting down");
                    break;
                }
            };
            let Some(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) if request.is_notification() => {
                    self.handle_request(request, None).await;
                    continue;
                }
                Ok(request) => self.handle_request(request, None).await,
                Err(e) => JsonRpcResponse::error(
                    None,
                    codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                ),
            };

            let mut payload = serde_json::to_vec(&response)?;
            payload.push(b'\n');
            stdout.write_all(&payload).await?;
            stdout.flush().await?;
        }

        Ok(())
    }

    /// Handle a JSON-RPC request.
    pub async fn handle_request(
        &self,
        request: JsonRpcRequest,
        request_id: Option<&str>,
    ) -> JsonRpcResponse {
        let id = request.id.clone();

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "initialized" | "notifications/initialized" | "ping" => {
                JsonRpcResponse::success(id, json!({}))
            }
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params, request_id).await,
            "shutdown" => {
                tracing::info!("MCP server shutdown requested");
                JsonRpcResponse::success(id, Value::Null)
            }
            _ => JsonRpcResponse::error(
                id,
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": "sqlgate",
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {
                "tools": {
                    "listChanged": false
                }
            }
        });
        JsonRpcResponse::success(id, result)
    }

    fn handle_list_tools(&self, id: Option<Value>) -> JsonRpcResponse {
        let tools = self.tools.list();
        match serde_json::to_value(&tools) {
            Ok(tools) => JsonRpcResponse::success(id, json!({ "tools": tools })),
            Err(e) => JsonRpcResponse::error(id, codes::INTERNAL_ERROR, e.to_string()),
        }
    }

    async fn handle_call_tool(
        &self,
        id: Option<Value>,
        params: Option<Value>,
        request_id: Option<&str>,
    ) -> JsonRpcResponse {
        let params: CallToolParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return JsonRpcResponse::error(
                    id,
                    codes::INVALID_PARAMS,
                    format!("Invalid params: {}", e),
                );
            }
            None => return JsonRpcResponse::error(id, codes::INVALID_PARAMS, "Missing params"),
        };

        let Some(target) = self.tools.target(&params.name).cloned() else {
            return JsonRpcResponse::error(
                id,
                codes::INVALID_PARAMS,
                format!("Tool not found: {}", params.name),
            );
        };

        tracing::debug!(tool = %params.name, "Calling tool");
        let response = match target {
            ToolTarget::Template(template) => {
                self.call_template_tool(template, params.arguments, request_id)
                    .await
            }
            ToolTarget::Builtin => {
                self.call_builtin(&params.name, params.arguments, request_id)
                    .await
            }
        };

        match serde_json::to_value(response) {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => JsonRpcResponse::error(id, codes::INTERNAL_ERROR, e.to_string()),
        }
    }

    async fn call_builtin(
        &self,
        tool: &str,
        arguments: Value,
        request_id: Option<&str>,
    ) -> CallToolResponse {
        match tool {
            RENDER_TEMPLATE => {
                let request: TemplateRequest = match parse_arguments(arguments) {
                    Ok(request) => request,
                    Err(e) => return self.rejected(None, e, request_id),
                };
                match self.service.render(&request).await {
                    Ok(rendered) => to_tool_response(&rendered, false),
                    Err(e) => self.rejected(Some(&request.template), e, request_id),
                }
            }
            QUERY_TEMPLATE => match parse_arguments::<TemplateRequest>(arguments) {
                Ok(request) => {
                    let served = self.service.query(request, request_id).await;
                    to_tool_response(&served.envelope, served.error.is_some())
                }
                Err(e) => self.rejected(None, e, request_id),
            },
            EXECUTE_QUERY => match parse_arguments::<ExecuteRequest>(arguments) {
                Ok(request) => {
                    let served = self.service.execute(request, request_id).await;
                    to_tool_response(&served.envelope, served.error.is_some())
                }
                Err(e) => self.rejected(None, e, request_id),
            },
            LIST_TEMPLATES => match self.service.list_templates().await {
                Ok(templates) => to_tool_response(&json!({ "templates": templates }), false),
                Err(e) => self.rejected(None, e, request_id),
            },
            API_INFO => to_tool_response(&self.service.info(), false),
            other => self.rejected(
                None,
                GatewayError::InvalidRequest(format!("unknown tool {other}")),
                request_id,
            ),
        }
    }

    async fn call_template_tool(
        &self,
        template: String,
        arguments: Value,
        request_id: Option<&str>,
    ) -> CallToolResponse {
        let args: TemplateToolArgs = match parse_arguments(arguments) {
            Ok(args) => args,
            Err(e) => return self.rejected(Some(&template), e, request_id),
        };
        let request = TemplateRequest {
            template,
            schema: args.schema,
            view: args.view,
            params: args.params,
            limit: args.limit,
            ..Default::default()
        };
        let served = self.service.query(request, request_id).await;
        to_tool_response(&served.envelope, served.error.is_some())
    }

    fn rejected(
        &self,
        template: Option<&str>,
        error: GatewayError,
        request_id: Option<&str>,
    ) -> CallToolResponse {
        let served = self.service.reject(template, error, request_id);
        to_tool_response(&served.envelope, true)
    }
}

/// Absent arguments read as an empty object.
fn parse_arguments<T: DeserializeOwned>(arguments: Value) -> Result<T, GatewayError> {
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments
    };
    serde_json::from_value(arguments)
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid arguments: {e}")))
}

fn to_tool_response<T: serde::Serialize>(value: &T, is_error: bool) -> CallToolResponse {
    match serde_json::to_value(value) {
        Ok(json) => CallToolResponse::json(json, is_error),
        Err(e) => CallToolResponse {
            content: vec![ToolContent::Text {
                text: format!("serialization error: {e}"),
            }],
            is_error: Some(true),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_arguments_read_as_empty_object() {
        let args: TemplateToolArgs = parse_arguments(Value::Null).unwrap();
        assert!(args.params.is_empty());
        assert!(args.schema.is_none());
    }

    #[test]
    fn malformed_arguments_are_invalid_requests() {
        let err = parse_arguments::<TemplateToolArgs>(json!({"limit": "ten"})).unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }
}
