//! The gateway operations shared by the MCP tools and the REST endpoints.

use crate::error::GatewayError;
use crate::executor::{ExecutionContext, ExecutorSettings, QueryExecutor};
use crate::provenance::{ProvenanceBuilder, ProvenanceEnvelope};
use axum::http::StatusCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlgate_core::{GatewayConfig, OperationKind, QueryBackend};
use sqlgate_policy::{PermissionPolicy, PolicySnapshot};
use sqlgate_sql::classify;
use sqlgate_template::{
    SCHEMA_PLACEHOLDER, Substitutions, TemplateStore, VIEW_PLACEHOLDER, validate_template_name,
};
use std::sync::Arc;

/// Request naming a template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateRequest {
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    /// Additional identifier substitutions; only `schema` and `view` are accepted.
    #[serde(default, skip_serializing_if = "Substitutions::is_empty")]
    pub substitutions: Substitutions,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl TemplateRequest {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..Default::default()
        }
    }

    /// All identifier substitutions; the `schema` / `view` fields win over the map.
    pub fn substitutions(&self) -> Substitutions {
        let mut subs = self.substitutions.clone();
        if let Some(schema) = &self.schema {
            subs.insert(SCHEMA_PLACEHOLDER.to_string(), schema.clone());
        }
        if let Some(view) = &self.view {
            subs.insert(VIEW_PLACEHOLDER.to_string(), view.clone());
        }
        subs
    }
}

/// Request carrying caller-written SQL for the free execute path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Result of rendering without executing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderResponse {
    pub template: String,
    pub sql: String,
    pub params: Vec<Value>,
    pub kind: OperationKind,
}

/// Catalog entry for one template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub name: String,
    /// MCP tool name (the file stem).
    pub tool: String,
    pub placeholders: Vec<String>,
}

/// Readiness report; never touches the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub version: String,
    pub template_root: String,
}

/// Static description of the running gateway.
#[derive(Debug, Clone, Serialize)]
pub struct ApiInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub template_root: String,
    pub free_execute: bool,
    pub default_row_limit: u32,
    pub max_row_limit: u32,
    pub max_concurrent_queries: usize,
    pub max_connections: u32,
    pub freshness_seconds: u64,
    pub permissions: PolicySnapshot,
}

/// An envelope plus the error behind it, for transports that map status codes.
#[derive(Debug, Clone)]
pub struct Served {
    pub envelope: ProvenanceEnvelope,
    pub error: Option<GatewayError>,
}

impl Served {
    pub fn status(&self) -> StatusCode {
        self.error
            .as_ref()
            .map_or(StatusCode::OK, GatewayError::http_status)
    }
}

/// Entry point for every gateway operation.
pub struct GatewayService {
    executor: QueryExecutor,
    provenance: ProvenanceBuilder,
}

impl GatewayService {
    pub fn new(executor: QueryExecutor, provenance: ProvenanceBuilder) -> Self {
        Self {
            executor,
            provenance,
        }
    }

    /// Wire the store, policy and executor from a validated configuration.
    pub fn from_config(config: &GatewayConfig, backend: Arc<dyn QueryBackend>) -> Self {
        let store = Arc::new(TemplateStore::new(config.templates.root.clone()));
        let policy = Arc::new(PermissionPolicy::new(config.permissions.clone()));
        let executor = QueryExecutor::new(
            store,
            policy,
            backend,
            ExecutorSettings::from_config(config),
        );
        Self::new(executor, ProvenanceBuilder::new(config.provenance.freshness()))
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Render a template to SQL text without executing it.
    pub async fn render(&self, request: &TemplateRequest) -> Result<RenderResponse, GatewayError> {
        let template = self.executor.store().load(&request.template).await?;
        let rendered = template.render(&request.substitutions(), request.params.clone())?;
        let kind = classify(&rendered.sql);
        Ok(RenderResponse {
            template: rendered.template,
            sql: rendered.sql,
            params: rendered.params,
            kind,
        })
    }

    /// Run a template and package the outcome.
    pub async fn query(&self, request: TemplateRequest, request_id: Option<&str>) -> Served {
        let request_id = resolve_request_id(request_id);
        let attempt = self
            .executor
            .execute(
                &request.template,
                &request.substitutions(),
                request.params,
                request.limit,
            )
            .await;
        let envelope = self.provenance.build(&attempt, &request_id, Utc::now());
        Served {
            envelope,
            error: attempt.result.err(),
        }
    }

    /// Run caller-written SQL under the same policy.
    pub async fn execute(&self, request: ExecuteRequest, request_id: Option<&str>) -> Served {
        let request_id = resolve_request_id(request_id);
        let attempt = self
            .executor
            .execute_sql(&request.sql, request.params, request.limit)
            .await;
        let envelope = self.provenance.build(&attempt, &request_id, Utc::now());
        Served {
            envelope,
            error: attempt.result.err(),
        }
    }

    /// Envelope for a request that failed before reaching the executor.
    pub fn reject(
        &self,
        template: Option<&str>,
        error: GatewayError,
        request_id: Option<&str>,
    ) -> Served {
        let template = template
            .filter(|name| validate_template_name(name).is_ok())
            .map(str::to_string);
        let context = ExecutionContext {
            sql_or_view: template.clone(),
            template,
            ..Default::default()
        };
        let envelope = self.provenance.failure(
            &context,
            &error,
            &resolve_request_id(request_id),
            Utc::now(),
        );
        Served {
            envelope,
            error: Some(error),
        }
    }

    /// Every template under the root with its declared placeholders.
    pub async fn list_templates(&self) -> Result<Vec<TemplateInfo>, GatewayError> {
        let store = self.executor.store();
        let names = store.list().await?;
        let mut catalog = Vec::with_capacity(names.len());
        for name in names {
            match store.load(&name).await {
                Ok(template) => catalog.push(TemplateInfo {
                    tool: template.stem().to_string(),
                    placeholders: template.placeholders().iter().cloned().collect(),
                    name,
                }),
                Err(e) => tracing::warn!(template = %name, error = %e, "Skipping template"),
            }
        }
        Ok(catalog)
    }

    pub fn info(&self) -> ApiInfo {
        let settings = self.executor.settings();
        ApiInfo {
            name: "sqlgate",
            version: env!("CARGO_PKG_VERSION"),
            template_root: self.template_root(),
            free_execute: settings.free_execute,
            default_row_limit: settings.default_row_limit,
            max_row_limit: settings.max_row_limit,
            max_concurrent_queries: settings.max_concurrent_queries,
            max_connections: self.executor.backend().max_connections(),
            freshness_seconds: self.provenance.freshness().as_secs(),
            permissions: self.executor.policy().snapshot(),
        }
    }

    pub fn health(&self) -> Health {
        Health {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            template_root: self.template_root(),
        }
    }

    fn template_root(&self) -> String {
        self.executor.store().root().display().to_string()
    }
}

/// Keep a caller-supplied request id, or mint a UUID v4.
pub fn resolve_request_id(given: Option<&str>) -> String {
    given
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}
