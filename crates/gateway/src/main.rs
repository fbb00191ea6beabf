use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use compute_gateway::{
    compute::GceClient, config::Config, gateway::ToolGateway, metrics, server::Server, stdio,
};

#[derive(Parser)]
#[command(
    name = "compute-gateway",
    version,
    about = "Tool-call gateway for cloud compute instances"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve JSON-RPC over HTTP on POST /mcp
    Serve {
        /// Listen address, overrides GATEWAY_ADDR
        #[arg(long)]
        addr: Option<String>,
    },
    /// Serve line-delimited JSON-RPC on stdin/stdout
    Stdio,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve { addr: None });

    // stdout carries protocol traffic in stdio mode, so logs always go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load().context("loading configuration")?;
    info!(
        "Loaded configuration: server={:?} lifecycle={:?} ledger={:?} compute_api={}",
        config.server, config.lifecycle, config.ledger, config.compute.api_base
    );

    metrics::register_metrics();

    let client = Arc::new(GceClient::new(&config.compute).context("building compute client")?);
    let gateway = Arc::new(ToolGateway::new(client, &config));

    match command {
        Command::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| config.server.addr.clone());
            Server::new(gateway).start(&addr).await?;
        }
        Command::Stdio => stdio::serve_stdio(gateway).await?,
    }

    Ok(())
}
