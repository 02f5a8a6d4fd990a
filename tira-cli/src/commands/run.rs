//! Run and review command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use tira_client::CoordinatorClient;
use tira_core::domain::review::Review;
use tira_core::domain::run::{Run, RunKey};
use tira_core::dto::run::CreateRun;

use crate::config::Config;

/// Run subcommands
#[derive(Subcommand)]
pub enum RunCommands {
    /// Create a run, the coordinator picks the run id
    Create {
        /// Dataset id
        #[arg(long)]
        dataset: String,

        /// VM id
        #[arg(long)]
        vm: String,

        /// Software id
        #[arg(long)]
        software: Option<String>,

        /// Run this one consumes or evaluates
        #[arg(long)]
        input_run: Option<String>,

        /// Mark the run as an evaluation
        #[arg(long)]
        evaluation: bool,
    },
    /// Show a run with its lifecycle state
    Get {
        /// Run as dataset/vm/run
        run: String,
    },
}

/// Review subcommands
#[derive(Subcommand)]
pub enum ReviewCommands {
    /// Show the review of a run, auto-reviewing it on first request
    Get {
        /// Run as dataset/vm/run
        run: String,
    },
}

/// Handle run commands
///
/// # Arguments
/// * `command` - The run command to execute
/// * `config` - The CLI configuration
pub async fn handle_run_command(command: RunCommands, config: &Config) -> Result<()> {
    let client = CoordinatorClient::new(config.coordinator_url.clone());

    match command {
        RunCommands::Create {
            dataset,
            vm,
            software,
            input_run,
            evaluation,
        } => {
            let run = client
                .create_run(CreateRun {
                    dataset_id: dataset,
                    vm_id: vm,
                    software_id: software,
                    input_run_id: input_run,
                    is_evaluation: evaluation,
                })
                .await?;
            println!("{} Created run {}", "✓".green(), run.key.to_string().cyan());
            Ok(())
        }
        RunCommands::Get { run } => {
            let run = client.get_run(&parse_run(&run)?).await?;
            print_run_details(&run);
            Ok(())
        }
    }
}

/// Handle review commands
///
/// # Arguments
/// * `command` - The review command to execute
/// * `config` - The CLI configuration
pub async fn handle_review_command(command: ReviewCommands, config: &Config) -> Result<()> {
    let client = CoordinatorClient::new(config.coordinator_url.clone());

    match command {
        ReviewCommands::Get { run } => {
            let review = client.get_review(&parse_run(&run)?).await?;
            print_review_details(&review);
            Ok(())
        }
    }
}

fn parse_run(value: &str) -> Result<RunKey> {
    RunKey::parse(value).with_context(|| format!("Expected dataset/vm/run, got {:?}", value))
}

fn print_run_details(run: &Run) {
    println!("{}", "Run:".bold());
    println!("  Key:        {}", run.key.to_string().cyan());
    println!("  Lifecycle:  {}", run.lifecycle.to_string().yellow());
    println!(
        "  Software:   {}",
        run.software_id.as_deref().unwrap_or("-")
    );
    if let Some(input) = &run.input_run_id {
        let label = if run.is_evaluation { "Evaluates:" } else { "Input run:" };
        println!("  {:<11} {}", label, input);
    }
    println!(
        "  Downloadable: {}",
        if run.downloadable { "✓".green() } else { "✗".dimmed() }
    );
    if run.deleted {
        println!("  {}", "deleted".red());
    }
    println!(
        "  Created:    {}",
        run.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}

fn review_verdict(review: &Review) -> ColoredString {
    if review.has_errors {
        "errors".red()
    } else if review.has_warnings {
        "warnings".yellow()
    } else if review.has_no_errors {
        "no errors".green()
    } else {
        "unreviewed".dimmed()
    }
}

fn print_review_details(review: &Review) {
    let flag = |set: bool| if set { "✓".green() } else { "✗".dimmed() };

    println!("{}", "Review:".bold());
    println!("  Run:      {}", review.run_id.cyan());
    println!("  Reviewer: {}", review.reviewer_id);
    println!("  Date:     {}", review.review_date.format("%Y-%m-%d %H:%M:%S"));
    println!("  Verdict:  {}", review_verdict(review));
    println!("  Blinded:          {}", flag(review.blinded));
    println!("  Missing output:   {}", flag(review.missing_output));
    println!("  Error output:     {}", flag(review.has_error_output));
    if !review.comment.is_empty() {
        println!();
        for line in review.comment.lines() {
            println!("  {} {}", "▸".cyan(), line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn review() -> Review {
        Review {
            run_id: "run-1".to_string(),
            reviewer_id: "tira".to_string(),
            review_date: Utc::now(),
            has_warnings: false,
            has_errors: false,
            has_no_errors: false,
            blinded: true,
            missing_output: false,
            has_error_output: false,
            comment: String::new(),
        }
    }

    #[test]
    fn test_parse_run() {
        assert_eq!(
            parse_run("dataset-1/vm-1/run-1").unwrap(),
            RunKey::new("dataset-1", "vm-1", "run-1")
        );
        assert!(parse_run("dataset-1/run-1").is_err());
    }

    #[test]
    fn test_review_verdict_prefers_errors() {
        let mut review = review();
        assert_eq!(review_verdict(&review).to_string(), "unreviewed".dimmed().to_string());

        review.has_warnings = true;
        review.has_errors = true;
        assert_eq!(review_verdict(&review).to_string(), "errors".red().to_string());
    }
}
