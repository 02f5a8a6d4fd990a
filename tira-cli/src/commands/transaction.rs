//! Transaction command handlers
//!
//! Inspects ledger records and VM states, and drives the confirmation
//! protocol by hand when a backend could not.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use tira_client::{Backoff, CoordinatorClient};
use tira_core::domain::run::RunKey;
use tira_core::domain::transaction::{LedgerStatus, Transaction, TransactionRecord};
use tira_core::domain::vm::VmState;

use crate::config::Config;

/// Transaction subcommands
#[derive(Subcommand)]
pub enum TransactionCommands {
    /// Show the ledger record of a transaction
    Get {
        /// Transaction id
        id: String,
    },
    /// Complete a transaction
    Complete {
        /// Transaction id
        id: String,

        /// Completion message
        #[arg(short, long, default_value = "completed by operator")]
        message: String,
    },
    /// Report the state of a VM
    SetState {
        /// VM id
        vm_id: String,

        /// One of running, powering_off, sandboxing, executing, unsandboxing, powering_on, busy, failed
        state: String,
    },
    /// Show the last reported state of a VM
    State {
        /// VM id
        vm_id: String,
    },
    /// Confirm a run as executed and complete the transaction
    ConfirmExecution {
        /// Run as dataset/vm/run
        run: String,
    },
}

/// Handle transaction commands
///
/// # Arguments
/// * `command` - The transaction command to execute
/// * `config` - The CLI configuration
pub async fn handle_transaction_command(command: TransactionCommands, config: &Config) -> Result<()> {
    let client = CoordinatorClient::new(config.coordinator_url.clone());

    match command {
        TransactionCommands::Get { id } => {
            let record = client.get_transaction(&id).await?;
            print_record(&record);
            Ok(())
        }
        TransactionCommands::Complete { id, message } => {
            let answer = client
                .complete_transaction(Transaction::success(id, message))
                .await?;
            print_answer(&answer);
            Ok(())
        }
        TransactionCommands::SetState { vm_id, state } => {
            let state = VmState::parse(&state)
                .with_context(|| format!("Unknown VM state {:?}", state))?;
            let answer = client
                .set_state(
                    Transaction::success(Transaction::new_id(), format!("state {}", state.as_str())),
                    &vm_id,
                    state,
                )
                .await?;
            print_answer(&answer);
            Ok(())
        }
        TransactionCommands::State { vm_id } => {
            let transition = client.get_vm_state(&vm_id).await?;
            println!("{}", "VM State:".bold());
            println!("  VM:               {}", transition.vm_id.cyan());
            println!("  State:            {}", transition.state.as_str());
            println!("  Last transaction: {}", transition.last_transaction.dimmed());
            println!(
                "  Updated:          {}",
                transition.updated_at.format("%Y-%m-%d %H:%M:%S")
            );
            Ok(())
        }
        TransactionCommands::ConfirmExecution { run } => {
            let run = RunKey::parse(&run)
                .with_context(|| format!("Expected dataset/vm/run, got {:?}", run))?;
            let answer = client
                .confirm_execution_until_acknowledged(
                    Transaction::success(Transaction::new_id(), "confirmed by operator"),
                    run,
                    &Backoff::default(),
                )
                .await?;
            print_answer(&answer);
            Ok(())
        }
    }
}

fn print_answer(answer: &Transaction) {
    let status = if answer.is_success() {
        answer.status.to_string().green()
    } else {
        answer.status.to_string().red()
    };
    println!("{} {}", status, answer.message);
    println!("  Transaction: {}", answer.transaction_id.dimmed());
}

fn print_record(record: &TransactionRecord) {
    let status = match record.status {
        LedgerStatus::Pending => record.status.as_str().yellow(),
        LedgerStatus::Success => record.status.as_str().green(),
        LedgerStatus::Failed => record.status.as_str().red(),
    };

    println!("{}", "Transaction:".bold());
    println!("  ID:        {}", record.transaction_id.cyan());
    println!("  Status:    {}", status);
    println!(
        "  Completed: {}",
        if record.completed { "✓".green() } else { "✗".dimmed() }
    );
    println!("  Message:   {}", record.last_message);
    println!(
        "  Updated:   {}",
        record.last_update.format("%Y-%m-%d %H:%M:%S")
    );
}
