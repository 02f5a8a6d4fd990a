//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod descriptor;
mod evaluate;
mod run;
mod transaction;

pub use descriptor::DescriptorCommands;
pub use evaluate::EvaluateArgs;
pub use run::{ReviewCommands, RunCommands};
pub use transaction::TransactionCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate a run directory locally
    Evaluate(EvaluateArgs),
    /// Transaction ledger and VM states
    Transaction {
        #[command(subcommand)]
        command: TransactionCommands,
    },
    /// Job descriptor files
    Descriptor {
        #[command(subcommand)]
        command: DescriptorCommands,
    },
    /// Runs
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Run reviews
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Evaluate(args) => evaluate::handle_evaluate(args),
        Commands::Transaction { command } => {
            transaction::handle_transaction_command(command, config).await
        }
        Commands::Descriptor { command } => descriptor::handle_descriptor_command(command),
        Commands::Run { command } => run::handle_run_command(command, config).await,
        Commands::Review { command } => run::handle_review_command(command, config).await,
    }
}
