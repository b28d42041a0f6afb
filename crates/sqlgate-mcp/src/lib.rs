//! # sqlgate-mcp
//!
//! Query execution and the MCP / REST server for sqlgate.
//!
//! Every request, whichever transport it arrives on, follows the same path:
//!
//! ```text
//! AI Agent / HTTP client
//!       │
//!       │ MCP tools/call  or  POST /api/query
//!       ▼
//! ┌──────────────────────┐
//! │  GatewayService      │
//! │  1. Safe name check  │  ← sqlgate-template
//! │  2. Load + render    │
//! │  3. Classify         │  ← sqlgate-sql
//! │  4. Authorize        │  ← sqlgate-policy
//! │  5. Bound SELECTs    │
//! │  6. Limit + execute  │  ← QueryBackend
//! │  7. Envelope         │
//! └──────────┬───────────┘
//!            │
//!            ▼
//!     Upstream Postgres
//! ```
//!
//! Nothing reaches the database unless steps 1 to 5 succeed.
//!
//! ## Tools
//!
//! See [`tool_generator`] for the fixed tools and the per-template tools.
//!
//! ## Example Usage
//!
//! ```ignore
//! use sqlgate_core::GatewayConfig;
//! use sqlgate_mcp::{GatewayService, McpServer};
//!
//! let config = GatewayConfig::from_file("config/sqlgate.yaml")?;
//! let service = Arc::new(GatewayService::from_config(&config, backend));
//!
//! let mut server = McpServer::new(config.mcp.clone(), service);
//! server.generate_tools().await?;
//! Arc::new(server).run(shutdown).await?;
//! ```

pub mod error;
pub mod executor;
pub mod http_transport;
pub mod limiter;
pub mod protocol;
pub mod provenance;
pub mod server;
pub mod service;
pub mod staleness;
pub mod tool_generator;
pub mod tools;

pub use error::{GatewayError, McpError};
pub use executor::{
    ExecutionContext, ExecutorSettings, QueryAttempt, QueryExecutor, QueryResult,
};
pub use limiter::QueryLimiter;
pub use protocol::{
    CallToolParams, CallToolResponse, JsonRpcRequest, JsonRpcResponse, ToolAnnotations,
    ToolContent, ToolDefinition,
};
pub use provenance::{ErrorDetail, ProvenanceBuilder, ProvenanceEnvelope};
pub use server::McpServer;
pub use service::{
    ApiInfo, ExecuteRequest, GatewayService, Health, RenderResponse, Served, TemplateInfo,
    TemplateRequest,
};
pub use staleness::is_stale;
pub use tool_generator::ToolGenerator;
pub use tools::{ToolRegistry, ToolTarget};
