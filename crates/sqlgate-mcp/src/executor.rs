//! Query executor.
//!
//! Drives one request through render, classify, authorize and execute. Every
//! step before the database call is in-memory; a step never starts once an
//! earlier one has failed. Whatever was resolved before a failure is kept in
//! the [`ExecutionContext`] so the provenance envelope can still report it.

use crate::error::GatewayError;
use crate::limiter::QueryLimiter;
use serde_json::{Map, Value};
use sqlgate_core::{
    BoundStatement, ColumnMeta, GatewayConfig, OperationKind, QueryBackend, sanitize_identifier,
};
use sqlgate_policy::PermissionPolicy;
use sqlgate_sql::{bound_select, classify, referenced_schemas};
use sqlgate_template::{
    SCHEMA_PLACEHOLDER, Substitutions, TemplateStore, VIEW_PLACEHOLDER, check_identifier,
    validate_template_name,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// `sql_or_view` reported for the free execute path.
pub const FREE_EXECUTE_SOURCE: &str = "execute_query";

/// Limits the executor enforces on every request.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub default_row_limit: u32,
    pub max_row_limit: u32,
    pub query_timeout: Duration,
    pub max_concurrent_queries: usize,
    pub max_query_wait: Duration,
    pub free_execute: bool,
}

impl ExecutorSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            default_row_limit: config.templates.default_row_limit,
            max_row_limit: config.templates.max_row_limit,
            query_timeout: config.guardrails.query_timeout(),
            max_concurrent_queries: config.guardrails.max_concurrent_queries,
            max_query_wait: config.guardrails.max_query_wait(),
            free_execute: config.guardrails.free_execute,
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

/// What was resolved about a request, successful or not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    /// Template file name, once it passed the safe-name check.
    pub template: Option<String>,
    /// Template name, resolved view name, or [`FREE_EXECUTE_SOURCE`].
    pub sql_or_view: Option<String>,
    /// Effective schema, once it passed the identifier sanitizer.
    pub schema: Option<String>,
    pub kind: Option<OperationKind>,
    /// Value parameters exactly as supplied.
    pub params: Vec<Value>,
    pub row_limit: Option<u32>,
}

/// Rows of a successful call.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<ColumnMeta>,
    /// One map per row, keys in column order.
    pub rows: Vec<Map<String, Value>>,
    pub row_count: usize,
    pub rows_affected: u64,
    pub elapsed: Duration,
    /// Statement text sent to the database, before parameter binding.
    pub sql: String,
}

impl QueryResult {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Outcome of one request plus the context resolved along the way.
#[derive(Debug, Clone)]
pub struct QueryAttempt {
    pub context: ExecutionContext,
    pub result: Result<QueryResult, GatewayError>,
}

/// Runs templates and free-form statements under the permission policy.
pub struct QueryExecutor {
    store: Arc<TemplateStore>,
    policy: Arc<PermissionPolicy>,
    backend: Arc<dyn QueryBackend>,
    limiter: QueryLimiter,
    settings: ExecutorSettings,
}

impl QueryExecutor {
    pub fn new(
        store: Arc<TemplateStore>,
        policy: Arc<PermissionPolicy>,
        backend: Arc<dyn QueryBackend>,
        settings: ExecutorSettings,
    ) -> Self {
        let limiter = QueryLimiter::new(settings.max_concurrent_queries, settings.max_query_wait);
        Self {
            store,
            policy,
            backend,
            limiter,
            settings,
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<TemplateStore> {
        &self.store
    }

    pub fn policy(&self) -> &Arc<PermissionPolicy> {
        &self.policy
    }

    pub fn backend(&self) -> &Arc<dyn QueryBackend> {
        &self.backend
    }

    /// Run a named template.
    pub async fn execute(
        &self,
        template_name: &str,
        substitutions: &Substitutions,
        params: Vec<Value>,
        row_limit: Option<u32>,
    ) -> QueryAttempt {
        let mut context = ExecutionContext {
            params: params.clone(),
            row_limit,
            ..Default::default()
        };
        let result = self
            .execute_template(&mut context, template_name, substitutions, params, row_limit)
            .await;
        QueryAttempt { context, result }
    }

    /// Run caller-supplied SQL, authorizing every schema it references.
    pub async fn execute_sql(
        &self,
        sql: &str,
        params: Vec<Value>,
        row_limit: Option<u32>,
    ) -> QueryAttempt {
        let mut context = ExecutionContext {
            sql_or_view: Some(FREE_EXECUTE_SOURCE.to_string()),
            params: params.clone(),
            row_limit,
            ..Default::default()
        };
        let result = self.execute_free(&mut context, sql, params, row_limit).await;
        QueryAttempt { context, result }
    }

    async fn execute_template(
        &self,
        context: &mut ExecutionContext,
        template_name: &str,
        substitutions: &Substitutions,
        params: Vec<Value>,
        row_limit: Option<u32>,
    ) -> Result<QueryResult, GatewayError> {
        validate_template_name(template_name)?;
        context.template = Some(template_name.to_string());
        context.sql_or_view = Some(template_name.to_string());

        let template = self.store.load(template_name).await?;
        let rendered = template.render(substitutions, params)?;

        let schema = self.effective_schema(substitutions)?;
        context.schema = Some(schema.clone());
        if let Some(view) = substitutions.get(VIEW_PLACEHOLDER)
            && template.placeholders().contains(VIEW_PLACEHOLDER)
        {
            context.sql_or_view = Some(qualified_view(substitutions, view));
        }

        let kind = classify(&rendered.sql);
        context.kind = Some(kind);
        self.authorize(&schema, kind, Some(template_name))?;

        let limit = self.row_limit(row_limit)?;
        context.row_limit = Some(limit);

        let sql = if kind == OperationKind::Select {
            bound_select(&rendered.sql, limit)
        } else {
            rendered.sql
        };
        let result = self
            .run(BoundStatement::new(sql, rendered.params), kind, limit)
            .await?;

        tracing::info!(
            template = template_name,
            schema = %schema,
            kind = %kind,
            row_count = result.row_count,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Template executed"
        );
        Ok(result)
    }

    async fn execute_free(
        &self,
        context: &mut ExecutionContext,
        sql: &str,
        params: Vec<Value>,
        row_limit: Option<u32>,
    ) -> Result<QueryResult, GatewayError> {
        if !self.settings.free_execute {
            return Err(GatewayError::FreeExecuteDisabled);
        }

        let kind = classify(sql);
        context.kind = Some(kind);
        let default_schema = self.policy.default_schema().to_lowercase();
        if kind == OperationKind::Unknown {
            context.schema = Some(default_schema.clone());
            self.authorize(&default_schema, kind, None)?;
        }

        let schemas = referenced_schemas(sql)?.resolve(&default_schema);
        if schemas.iter().any(|s| sanitize_identifier(s).is_err()) {
            return Err(GatewayError::InvalidRequest(
                "statement references an invalid schema name".to_string(),
            ));
        }
        for schema in &schemas {
            context.schema = Some(schema.clone());
            self.authorize(schema, kind, None)?;
        }
        if schemas.len() > 1 {
            context.schema = None;
        }

        let limit = self.row_limit(row_limit)?;
        context.row_limit = Some(limit);

        let sql = if kind == OperationKind::Select {
            bound_select(sql, limit)
        } else {
            sql.to_string()
        };
        let result = self.run(BoundStatement::new(sql, params), kind, limit).await?;

        tracing::info!(
            schemas = ?schemas,
            kind = %kind,
            row_count = result.row_count,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Statement executed"
        );
        Ok(result)
    }

    /// Explicit `schema`, else the qualifier of `view`, else the default.
    fn effective_schema(&self, substitutions: &Substitutions) -> Result<String, GatewayError> {
        if let Some(schema) = substitutions.get(SCHEMA_PLACEHOLDER) {
            check_identifier(SCHEMA_PLACEHOLDER, schema)?;
            return Ok(schema.to_lowercase());
        }
        if let Some(view) = substitutions.get(VIEW_PLACEHOLDER) {
            check_identifier(VIEW_PLACEHOLDER, view)?;
            if let Some((schema, _)) = view.split_once('.') {
                return Ok(schema.to_lowercase());
            }
        }
        Ok(self.policy.default_schema().to_lowercase())
    }

    fn authorize(
        &self,
        schema: &str,
        kind: OperationKind,
        template: Option<&str>,
    ) -> Result<(), GatewayError> {
        let decision = self.policy.decide(schema, kind);
        if decision.allowed {
            return Ok(());
        }
        tracing::info!(
            target: "sqlgate::policy",
            template = template.unwrap_or(FREE_EXECUTE_SOURCE),
            schema,
            kind = %kind,
            source = ?decision.source,
            "Operation denied"
        );
        Err(GatewayError::PermissionDenied {
            schema: schema.to_string(),
            kind,
        })
    }

    fn row_limit(&self, requested: Option<u32>) -> Result<u32, GatewayError> {
        let limit = requested.unwrap_or(self.settings.default_row_limit);
        if limit == 0 || limit > self.settings.max_row_limit {
            return Err(GatewayError::InvalidRowLimit {
                max: self.settings.max_row_limit,
            });
        }
        Ok(limit)
    }

    async fn run(
        &self,
        statement: BoundStatement,
        kind: OperationKind,
        limit: u32,
    ) -> Result<QueryResult, GatewayError> {
        let _permit = self.limiter.acquire().await?;
        let started = Instant::now();

        let rowset = match tokio::time::timeout(
            self.settings.query_timeout,
            self.backend.execute(&statement),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.settings.query_timeout.as_millis() as u64,
                    kind = %kind,
                    "Query exceeded its deadline"
                );
                return Err(GatewayError::QueryCancelled);
            }
        };
        let elapsed = started.elapsed();

        let mut rows: Vec<Map<String, Value>> = rowset
            .rows
            .into_iter()
            .map(|values| {
                rowset
                    .columns
                    .iter()
                    .map(|c| c.name.clone())
                    .zip(values)
                    .collect()
            })
            .collect();
        if kind == OperationKind::Select {
            rows.truncate(limit as usize);
        }

        Ok(QueryResult {
            columns: rowset.columns,
            row_count: rows.len(),
            rows,
            rows_affected: rowset.rows_affected,
            elapsed,
            sql: statement.sql,
        })
    }
}

/// `schema.view` when the view is unqualified and a schema was supplied.
fn qualified_view(substitutions: &Substitutions, view: &str) -> String {
    match substitutions.get(SCHEMA_PLACEHOLDER) {
        Some(schema) if !view.contains('.') => format!("{schema}.{view}"),
        _ => view.to_string(),
    }
}
