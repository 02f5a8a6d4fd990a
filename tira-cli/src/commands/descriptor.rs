//! Job descriptor command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use std::path::{Path, PathBuf};
use tira_core::domain::descriptor::JobDescriptor;
use tira_core::dto::descriptor::{decode, encode, job_file_path};

/// Descriptor subcommands
#[derive(Subcommand)]
pub enum DescriptorCommands {
    /// Encode a JSON descriptor as a job file (KEY=VALUE lines)
    Encode {
        /// JSON descriptor
        file: PathBuf,

        /// Write the job file here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Decode and validate a job file
    Validate {
        /// Job file
        file: PathBuf,

        /// Print the descriptor as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Handle descriptor commands
///
/// # Arguments
/// * `command` - The descriptor command to execute
pub fn handle_descriptor_command(command: DescriptorCommands) -> Result<()> {
    match command {
        DescriptorCommands::Encode { file, output } => {
            let content = encode_file(&file)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &content)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("{} {}", "✓".green(), path.display());
                }
                None => println!("{}", content),
            }
            Ok(())
        }
        DescriptorCommands::Validate { file, json } => {
            let descriptor = decode_file(&file)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&descriptor)?);
            } else {
                print_descriptor_details(&descriptor);
            }
            Ok(())
        }
    }
}

fn encode_file(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let descriptor: JobDescriptor = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(encode(&descriptor)?)
}

fn decode_file(path: &Path) -> Result<JobDescriptor> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    decode(&content).with_context(|| format!("Invalid job file {}", path.display()))
}

fn print_descriptor_details(descriptor: &JobDescriptor) {
    println!("{} {}", "✓".green(), "Valid job descriptor".bold());
    println!();
    println!("  Run:       {}", descriptor.run_key().to_string().cyan());
    println!("  Task:      {}", descriptor.task_id);
    println!("  Dataset:   {} ({})", descriptor.dataset_id, descriptor.dataset_type);
    println!("  Image:     {}", descriptor.resolved_image());
    println!("  Command:   {}", descriptor.command.dimmed());
    println!("  Output:    {}", descriptor.output_dir.display());
    println!("  Job file:  {}", job_file_path(descriptor));

    if let Some(evaluated) = descriptor.evaluated_run() {
        println!("  Evaluates: {}", evaluated.to_string().yellow());
    } else if !descriptor.input_runs.is_empty() {
        println!("  Input runs:");
        for run in &descriptor.input_runs {
            println!("    {} {}", "▸".cyan(), run);
        }
    }

    if !descriptor.hf_models.is_empty() {
        println!("  Models:    {}", descriptor.hf_models.join(", "));
    }
    if descriptor.resources.gpu.is_requested() {
        println!("  GPU:       {}", "requested".yellow());
    }
    if descriptor.allow_network {
        println!("  Network:   {}", "allowed".yellow());
    }
}
