//! `sqlgate templates` command implementation.

use super::load_config;
use anyhow::{Context, Result};
use sqlgate_sql::classify;
use sqlgate_template::TemplateStore;
use std::path::Path;

pub async fn execute(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let store = TemplateStore::new(config.templates.root.clone());
    let names = store.list().await.with_context(|| {
        format!(
            "Failed to list templates under {}",
            config.templates.root.display()
        )
    })?;

    if names.is_empty() {
        println!("No templates found under {}", store.root().display());
        return Ok(());
    }

    println!("{:<32} {:<8} PLACEHOLDERS", "TEMPLATE", "KIND");
    for name in names {
        match store.load(&name).await {
            Ok(template) => {
                let placeholders: Vec<&str> =
                    template.placeholders().iter().map(String::as_str).collect();
                println!(
                    "{:<32} {:<8} {}",
                    name,
                    classify(template.text()).to_string(),
                    placeholders.join(", ")
                );
            }
            Err(e) => println!("{:<32} {:<8} {}", name, "-", e),
        }
    }
    Ok(())
}
