mod cli;
mod config;
mod error;
mod protocol;
mod server;
mod transport;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use sandbar_runtime::ToolRegistry;
use sandbar_tools::{register_all, ToolOptions};
use server::Server;
use tracing::info;
use transport::StdioTransport;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the protocol
    sandbar_runtime::init_logging();

    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let allowed_dirs =
        config::resolve_allowed_dirs(&config.sandbox.allowed_dirs, &cli.allowed_dirs, &cwd)?;

    let options = ToolOptions {
        shell: config.bash.shell.clone(),
        grep_strategy: cli
            .grep_strategy
            .map(Into::into)
            .unwrap_or(config.grep.strategy),
    };

    let registry = ToolRegistry::new();
    let session = register_all(&registry, &options)?;
    info!(
        cwd = %session.cwd().await.display(),
        shell = %options.shell.display(),
        "Tools registered"
    );

    let server = Server::new(registry, allowed_dirs);
    let mut transport = StdioTransport::new();
    server.run(&mut transport).await?;

    Ok(())
}
