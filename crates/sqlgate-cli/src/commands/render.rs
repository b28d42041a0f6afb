//! `sqlgate render` command implementation.
//!
//! Renders offline: no database connection is opened.

use super::load_config;
use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;
use sqlgate_sql::classify;
use sqlgate_template::{SCHEMA_PLACEHOLDER, Substitutions, TemplateStore, VIEW_PLACEHOLDER};
use std::path::Path;

/// Arguments for `sqlgate render`.
#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Template file name, e.g. `get_version.sql`.
    pub template: String,

    /// Value for `{schema}`.
    #[arg(long)]
    pub schema: Option<String>,

    /// Value for `{view}`.
    #[arg(long)]
    pub view: Option<String>,

    /// Value parameter for $1, $2, ... (JSON, or a plain string). Repeatable.
    #[arg(long = "param")]
    pub params: Vec<String>,
}

pub async fn execute(config_path: &Path, args: RenderArgs) -> Result<()> {
    let config = load_config(config_path)?;
    config.validate().context("Invalid configuration")?;

    let store = TemplateStore::new(config.templates.root.clone());
    let template = store
        .load(&args.template)
        .await
        .with_context(|| format!("Failed to load template {}", args.template))?;

    let rendered = template
        .render(&substitutions(&args), parse_params(&args.params))
        .context("Failed to render template")?;

    println!("-- template: {}", rendered.template);
    println!("-- kind: {}", classify(&rendered.sql));
    for (i, param) in rendered.params.iter().enumerate() {
        println!("-- ${}: {}", i + 1, param);
    }
    println!("{}", rendered.sql);
    Ok(())
}

fn substitutions(args: &RenderArgs) -> Substitutions {
    let mut subs = Substitutions::new();
    if let Some(schema) = &args.schema {
        subs.insert(SCHEMA_PLACEHOLDER.to_string(), schema.clone());
    }
    if let Some(view) = &args.view {
        subs.insert(VIEW_PLACEHOLDER.to_string(), view.clone());
    }
    subs
}

fn parse_params(raw: &[String]) -> Vec<Value> {
    raw.iter()
        .map(|p| serde_json::from_str(p).unwrap_or_else(|_| Value::String(p.clone())))
        .collect()
}
