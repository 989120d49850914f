use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use agent_node::mcp::HealthStatus;
use agent_node::{Config, Node};

/// Agent node - dispatch, tool bridging, audit credentials and live events
#[derive(Parser)]
#[command(name = "agent-node", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/agent-node/config.toml)
    #[arg(short, long, env = "AGENT_NODE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the node and run until interrupted (default)
    Run,
    /// Run one bridging pass and print the resulting skills
    Tools,
    /// Health-check every configured tool server
    Health,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,agent_node=info",
        1 => "info,agent_node=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let explicit = cli.config.map(|p| p.to_string_lossy().into_owned());
    let config = Config::from_lookup(|key| {
        if key == "AGENT_NODE_CONFIG" {
            return explicit.clone();
        }
        std::env::var(key).ok()
    })?;
    tracing::debug!(?config, "loaded configuration");

    let node = Node::new(config)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let report = node.start().await;
            tracing::info!(
                bridged = report.bridged.len(),
                identity = report.identity_enabled,
                events = report.events_enabled,
                "agent node ready"
            );
            tokio::signal::ctrl_c().await?;
            tracing::info!("shutdown requested");
            node.shutdown();
            Ok(ExitCode::SUCCESS)
        }
        Command::Tools => {
            let bridged = node.bridge_tools().await;
            let output = serde_json::json!({
                "bridged": bridged,
                "callables": node.dispatch().describe(),
                "servers": node.servers().status_list(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Health => {
            let summary = node.servers().health_summary().await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(match summary.status {
                HealthStatus::Ok | HealthStatus::Disabled => ExitCode::SUCCESS,
                HealthStatus::Degraded => ExitCode::FAILURE,
            })
        }
    }
}
