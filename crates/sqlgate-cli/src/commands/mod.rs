//! CLI command implementations.

pub mod check;
pub mod render;
pub mod serve;
pub mod templates;

use anyhow::{Context, Result};
use sqlgate_core::GatewayConfig;
use std::path::Path;
use tracing::warn;

/// Load the config file (defaults when absent) and overlay the environment.
///
/// Validation is left to the caller so CLI overrides can be applied first.
pub fn load_config(path: &Path) -> Result<GatewayConfig> {
    let mut config = if path.exists() {
        GatewayConfig::load_with_context(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?
    } else {
        warn!(config = %path.display(), "Config file not found, using defaults");
        GatewayConfig::default()
    };
    config.apply_env();
    Ok(config)
}
