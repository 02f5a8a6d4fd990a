//! Input staging
//!
//! Copies the dataset, the ground truth and previous-stage run outputs into a
//! scratch directory owned by one job. Inputs are always copied so a job never
//! sees a link into another trust domain.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

/// Copies the content of `src` into `dst`, returning the number of files copied
///
/// Existing files in `dst` are overwritten. Symbolic links are resolved and
/// their targets copied.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<u64> {
    if !src.is_dir() {
        anyhow::bail!("{} is not a directory", src.display());
    }
    std::fs::create_dir_all(dst).with_context(|| format!("Failed to create {}", dst.display()))?;

    let mut copied = 0;
    for entry in walkdir::WalkDir::new(src).follow_links(true) {
        let entry = entry.with_context(|| format!("Failed to walk {}", src.display()))?;
        let relative = entry.path().strip_prefix(src)?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
        } else {
            std::fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "Failed to copy {} to {}",
                    entry.path().display(),
                    target.display()
                )
            })?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Previous-stage outputs merged into one exclusive directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedInput {
    /// Directory with one numbered slot per input, starting at `1`
    pub dir: PathBuf,

    /// Shell command that removes `dir` and nothing else
    pub cleanup_command: String,
}

/// Merges previous-stage outputs into `<scratch>/merged-<uuid>/<n>/`
///
/// Slots follow the supplied order. Nothing removes the merged directory
/// except the returned cleanup command.
pub fn merge_input_runs(scratch_dir: &Path, outputs: &[PathBuf]) -> Result<MergedInput> {
    let dir = scratch_dir.join(format!("merged-{}", Uuid::new_v4()));

    for (index, output) in outputs.iter().enumerate() {
        let slot = dir.join((index + 1).to_string());
        let files = copy_dir(output, &slot)
            .with_context(|| format!("Failed to stage input run {}", output.display()))?;
        debug!("Staged {} file(s) of {} into {}", files, output.display(), slot.display());
    }

    info!("Merged {} input run(s) into {}", outputs.len(), dir.display());
    Ok(MergedInput {
        cleanup_command: format!("rm -rf {}", dir.display()),
        dir,
    })
}

/// Runs a cleanup command returned by [`merge_input_runs`]
pub fn run_cleanup(cleanup_command: &str) -> Result<()> {
    let status = Command::new("sh")
        .arg("-c")
        .arg(cleanup_command)
        .status()
        .context("Failed to run cleanup command")?;
    if !status.success() {
        anyhow::bail!("Cleanup command {:?} failed with {}", cleanup_command, status);
    }
    Ok(())
}

/// The staged inputs of one job
#[derive(Debug)]
pub struct StagedInputs {
    /// Scratch directory of this job, removed by [`StagedInputs::cleanup`]
    pub root: PathBuf,
    pub input_dataset: PathBuf,
    pub ground_truth: Option<PathBuf>,
    pub input_run: Option<PathBuf>,
    merged: Option<MergedInput>,
}

impl StagedInputs {
    /// Copies all inputs of a job into a fresh scratch directory
    ///
    /// # Arguments
    /// * `scratch_dir` - Scratch space shared by all jobs
    /// * `dataset` - Dataset directory
    /// * `ground_truth` - Ground-truth directory, if the job reads it
    /// * `input_runs` - Previous-stage outputs in staging order
    pub fn stage(
        scratch_dir: &Path,
        dataset: &Path,
        ground_truth: Option<&Path>,
        input_runs: &[PathBuf],
    ) -> Result<Self> {
        let root = scratch_dir.join(format!("job-{}", Uuid::new_v4()));

        let input_dataset = root.join("input");
        copy_dir(dataset, &input_dataset).context("Failed to stage the input dataset")?;

        let ground_truth = match ground_truth {
            Some(truth) => {
                let staged = root.join("input-truth");
                copy_dir(truth, &staged).context("Failed to stage the ground truth")?;
                Some(staged)
            }
            None => None,
        };

        let (input_run, merged) = match input_runs {
            [] => (None, None),
            [single] => {
                let staged = root.join("input-run");
                copy_dir(single, &staged).context("Failed to stage the input run")?;
                (Some(staged), None)
            }
            several => {
                let merged = merge_input_runs(scratch_dir, several)?;
                (Some(merged.dir.clone()), Some(merged))
            }
        };

        Ok(Self {
            root,
            input_dataset,
            ground_truth,
            input_run,
            merged,
        })
    }

    /// Cleanup command of the merged previous stages, if any
    pub fn merge_cleanup_command(&self) -> Option<&str> {
        self.merged.as_ref().map(|m| m.cleanup_command.as_str())
    }

    /// Removes the job's scratch directory and the merged previous stages
    pub fn cleanup(self) -> Result<()> {
        if let Some(command) = self.merge_cleanup_command() {
            run_cleanup(command)?;
        }
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root)
                .with_context(|| format!("Failed to remove {}", self.root.display()))?;
        }
        Ok(())
    }
}
