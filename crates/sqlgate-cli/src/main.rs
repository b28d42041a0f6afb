use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::render::RenderArgs;
use commands::serve::ServeArgs;

#[derive(Parser, Debug)]
#[command(name = "sqlgate", version, about = "Policy-gated SQL template gateway")]
struct Cli {
    /// Configuration file.
    #[arg(
        short,
        long,
        global = true,
        env = "SQLGATE_CONFIG",
        default_value = "config/sqlgate.yaml"
    )]
    config: PathBuf,

    /// More log output (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the MCP server (stdio) or the HTTP API.
    Serve(ServeArgs),

    /// Render a template to SQL without executing it.
    Render(RenderArgs),

    /// List the templates under the configured root.
    Templates,

    /// Validate the configuration and every template.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.cmd {
        Command::Serve(args) => commands::serve::execute(&cli.config, args).await?,
        Command::Render(args) => commands::render::execute(&cli.config, args).await?,
        Command::Templates => commands::templates::execute(&cli.config).await?,
        Command::Check => commands::check::execute(&cli.config).await?,
    }

    Ok(())
}

/// Logs go to stderr so stdout stays clean for the stdio transport.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
