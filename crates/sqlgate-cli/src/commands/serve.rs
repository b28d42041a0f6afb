//! `sqlgate serve` command implementation.

use super::load_config;
use anyhow::{Context, Result};
use clap::Args;
use sqlgate_adapter_pg::PgBackend;
use sqlgate_core::Transport;
use sqlgate_mcp::{GatewayService, McpServer};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Arguments for `sqlgate serve`. Each flag overrides the config file.
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Transport type (stdio or http).
    #[arg(long)]
    pub transport: Option<Transport>,

    /// HTTP bind host (http transport only).
    #[arg(long)]
    pub host: Option<String>,

    /// HTTP port (http transport only).
    #[arg(long)]
    pub port: Option<u16>,

    /// Deny every write operation regardless of other permissions.
    #[arg(long, default_value_t = false)]
    pub read_only: bool,
}

pub async fn execute(config_path: &Path, args: ServeArgs) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(transport) = args.transport {
        config.mcp.transport = transport;
    }
    if let Some(host) = args.host {
        config.mcp.host = host;
    }
    if let Some(port) = args.port {
        config.mcp.port = port;
    }
    if args.read_only {
        config.permissions.read_only = true;
    }
    config.validate().context("Invalid configuration")?;

    let backend = Arc::new(
        PgBackend::connect_lazy(&config.upstream, config.guardrails.query_timeout())
            .context("Failed to configure database pool")?,
    );
    let service = Arc::new(GatewayService::from_config(&config, backend.clone()));

    let mut server = McpServer::new(config.mcp.clone(), service);
    let tool_count = server
        .generate_tools()
        .await
        .context("Failed to load template catalog")?;

    info!(
        transport = %config.mcp.transport,
        template_root = %config.templates.root.display(),
        read_only = config.permissions.read_only,
        free_execute = config.guardrails.free_execute,
        tool_count,
        "Starting sqlgate"
    );
    if config.mcp.is_http() {
        eprintln!("sqlgate listening on http://{}", config.mcp.bind_addr());
    }

    Arc::new(server)
        .run(shutdown_signal())
        .await
        .context("Server failed")?;

    backend.close().await;
    info!("sqlgate stopped");
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed the server runs
/// until killed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
