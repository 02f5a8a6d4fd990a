//! TIRA CLI
//!
//! Operator command-line interface: evaluates runs locally, inspects and
//! drives transactions of the coordinator, encodes and validates job
//! descriptor files and shows runs and their reviews.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tira")]
#[command(about = "TIRA job orchestration and evaluation CLI", long_about = None)]
struct Cli {
    /// Coordinator URL
    #[arg(
        long,
        env = "TIRA_COORDINATOR_URL",
        default_value = "http://localhost:8080"
    )]
    coordinator_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tira_cli=info,tira_eval=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config {
        coordinator_url: cli.coordinator_url,
    };

    handle_command(cli.command, &config).await
}
