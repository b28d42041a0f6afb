//! Tool generation from the template catalog.
//!
//! | Tool | Arguments | Description |
//! |------|-----------|-------------|
//! | `render_template` | template, schema, view, params | Render SQL without executing |
//! | `query_template` | template, schema, view, params, limit | Run any template |
//! | `execute_query` | sql, params, limit | Policy-gated free execute |
//! | `list_templates` | | Template catalog |
//! | `api_info` | | Version, limits and permissions |
//! | `<stem>` | schema, view, params, limit | Run one template (declared placeholders required) |

use crate::protocol::{ToolAnnotations, ToolDefinition};
use crate::tools::{ToolRegistry, ToolTarget};
use serde_json::{Map, Value, json};
use sqlgate_core::OperationKind;
use sqlgate_sql::classify;
use sqlgate_template::{SCHEMA_PLACEHOLDER, Template, VIEW_PLACEHOLDER};
use std::sync::Arc;

pub const RENDER_TEMPLATE: &str = "render_template";
pub const QUERY_TEMPLATE: &str = "query_template";
pub const EXECUTE_QUERY: &str = "execute_query";
pub const LIST_TEMPLATES: &str = "list_templates";
pub const API_INFO: &str = "api_info";

/// Builds the tool registry for a set of loaded templates.
pub struct ToolGenerator {
    templates: Vec<Arc<Template>>,
    max_row_limit: u32,
    free_execute: bool,
}

impl ToolGenerator {
    pub fn new(templates: Vec<Arc<Template>>, max_row_limit: u32, free_execute: bool) -> Self {
        Self {
            templates,
            max_row_limit,
            free_execute,
        }
    }

    /// Fixed tools first, then one per template; a template whose stem
    /// collides with an existing tool is skipped.
    pub fn generate_all(&self) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for tool in self.builtin_tools() {
            registry.register(tool, ToolTarget::Builtin);
        }

        for template in &self.templates {
            let tool = self.template_tool(template);
            let name = tool.name.clone();
            if !registry.register(tool, ToolTarget::Template(template.name().to_string())) {
                tracing::warn!(
                    template = template.name(),
                    tool = %name,
                    "Template tool name already taken; skipping"
                );
            }
        }

        tracing::debug!(tools = ?registry.names(), "Generated tools");
        registry
    }

    fn builtin_tools(&self) -> Vec<ToolDefinition> {
        let mut tools = vec![
            ToolDefinition {
                name: RENDER_TEMPLATE.to_string(),
                description: Some("Render a SQL template to text without executing it".into()),
                input_schema: json!({
                    "type": "object",
                    "properties": self.template_properties(None, false),
                    "required": ["template"]
                }),
                annotations: Some(read_only()),
            },
            ToolDefinition {
                name: QUERY_TEMPLATE.to_string(),
                description: Some(
                    "Run a SQL template under the permission policy and return rows with provenance"
                        .into(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": self.template_properties(None, true),
                    "required": ["template"]
                }),
                annotations: None,
            },
            ToolDefinition {
                name: LIST_TEMPLATES.to_string(),
                description: Some("List the available SQL templates".into()),
                input_schema: json!({"type": "object", "properties": {}}),
                annotations: Some(read_only()),
            },
            ToolDefinition {
                name: API_INFO.to_string(),
                description: Some("Server version, row limits and effective permissions".into()),
                input_schema: json!({"type": "object", "properties": {}}),
                annotations: Some(read_only()),
            },
        ];

        if self.free_execute {
            tools.push(ToolDefinition {
                name: EXECUTE_QUERY.to_string(),
                description: Some(
                    "Execute a SQL statement; every referenced schema must be permitted".into(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "sql": {"type": "string", "description": "A single SQL statement"},
                        "params": params_property(),
                        "limit": self.limit_property()
                    },
                    "required": ["sql"]
                }),
                annotations: None,
            });
        }
        tools
    }

    fn template_tool(&self, template: &Template) -> ToolDefinition {
        let required: Vec<&str> = template.placeholders().iter().map(String::as_str).collect();
        let annotations = match classify(template.text()) {
            OperationKind::Unknown => None,
            OperationKind::Select => Some(read_only()),
            _ => Some(ToolAnnotations {
                read_only: Some(false),
                destructive: Some(true),
            }),
        };

        ToolDefinition {
            name: template.stem().to_string(),
            description: Some(format!("Run the {} template", template.name())),
            input_schema: json!({
                "type": "object",
                "properties": self.template_properties(Some(template), true),
                "required": required
            }),
            annotations,
        }
    }

    /// Properties for template-running tools. Without a template the
    /// `template` name itself is an argument.
    fn template_properties(&self, template: Option<&Template>, with_limit: bool) -> Value {
        let mut props = Map::new();
        if template.is_none() {
            props.insert(
                "template".into(),
                json!({"type": "string", "description": "Template file name, e.g. get_version.sql"}),
            );
        }
        let declares = |name: &str| template.is_none_or(|t| t.placeholders().contains(name));
        if declares(SCHEMA_PLACEHOLDER) {
            props.insert(
                SCHEMA_PLACEHOLDER.into(),
                json!({"type": "string", "description": "Schema name substituted for {schema}"}),
            );
        }
        if declares(VIEW_PLACEHOLDER) {
            props.insert(
                VIEW_PLACEHOLDER.into(),
                json!({"type": "string", "description": "View name substituted for {view}"}),
            );
        }
        props.insert("params".into(), params_property());
        if with_limit {
            props.insert("limit".into(), self.limit_property());
        }
        Value::Object(props)
    }

    fn limit_property(&self) -> Value {
        json!({
            "type": "integer",
            "minimum": 1,
            "maximum": self.max_row_limit,
            "description": "Maximum number of rows returned"
        })
    }
}

fn params_property() -> Value {
    json!({
        "type": "array",
        "description": "Values bound to $1, $2, ... in order",
        "items": {}
    })
}

fn read_only() -> ToolAnnotations {
    ToolAnnotations {
        read_only: Some(true),
        destructive: Some(false),
    }
}
