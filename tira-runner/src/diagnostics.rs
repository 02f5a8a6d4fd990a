//! Diagnostics writer
//!
//! Writes the files every backend leaves next to `output/`: `stdout.txt`,
//! `stderr.txt`, `file-list.txt`, `size.txt` and `run.prototext`. Shared by
//! the sandbox runner and the CI persistence step.

use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;
use tira_core::domain::descriptor::JobDescriptor;
use tira_core::domain::diagnostics::{
    FILE_LIST_FILE, OUTPUT_DIR, RUN_DESCRIPTOR_FILE, SIZE_FILE, STDERR_FILE, STDOUT_FILE,
    command_banner,
};
use tracing::debug;
use uuid::Uuid;

/// What a finished job printed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
}

/// Writes all diagnostics files into `job_dir`
///
/// A missing `output/` is recorded as an empty listing, it is never created here.
pub fn write_diagnostics(
    job_dir: &Path,
    descriptor: &JobDescriptor,
    diagnostics: &Diagnostics,
) -> Result<()> {
    std::fs::create_dir_all(job_dir)
        .with_context(|| format!("Failed to create {}", job_dir.display()))?;
    let output_dir = job_dir.join(OUTPUT_DIR);

    write(job_dir, STDOUT_FILE, &diagnostics.stdout)?;
    write(
        job_dir,
        STDERR_FILE,
        &format!("{}{}", command_banner(&diagnostics.command), diagnostics.stderr),
    )?;
    write(job_dir, FILE_LIST_FILE, &file_list(&output_dir)?)?;
    write(job_dir, SIZE_FILE, &OutputSize::measure(&output_dir)?.to_string())?;
    write(job_dir, RUN_DESCRIPTOR_FILE, &run_prototext(descriptor))?;

    debug!("Wrote diagnostics of run {} to {}", descriptor.run_id, job_dir.display());
    Ok(())
}

fn write(dir: &Path, name: &str, content: &str) -> Result<()> {
    let path = dir.join(name);
    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
}

// =============================================================================
// File List
// =============================================================================

/// Indented tree of a directory, two spaces per level, entries sorted by name
pub fn file_list(dir: &Path) -> Result<String> {
    if !dir.is_dir() {
        return Ok(String::new());
    }

    let mut listing = String::new();
    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy();
        let indent = "  ".repeat(entry.depth());
        if entry.file_type().is_dir() {
            listing.push_str(&format!("{}{}/\n", indent, name));
        } else {
            listing.push_str(&format!("{}{}\n", indent, name));
        }
    }
    Ok(listing)
}

// =============================================================================
// Size Summary
// =============================================================================

/// Size summary of an output directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputSize {
    pub bytes: u64,
    pub lines: u64,
    pub files: u64,
    /// Directories including the output directory itself
    pub directories: u64,
}

impl OutputSize {
    pub fn measure(dir: &Path) -> Result<Self> {
        let mut size = Self::default();
        if !dir.is_dir() {
            return Ok(size);
        }

        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
            if entry.file_type().is_dir() {
                size.directories += 1;
            } else if entry.file_type().is_file() {
                let content = std::fs::read(entry.path())
                    .with_context(|| format!("Failed to read {}", entry.path().display()))?;
                size.files += 1;
                size.bytes += content.len() as u64;
                size.lines += content.iter().filter(|b| **b == b'\n').count() as u64;
            }
        }
        Ok(size)
    }
}

impl fmt::Display for OutputSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.bytes)?;
        writeln!(f, "{}", self.lines)?;
        writeln!(f, "{}", self.files)?;
        writeln!(f, "{}", self.directories)
    }
}

// =============================================================================
// Run Descriptor
// =============================================================================

/// The `run.prototext` of a job
///
/// Evaluations record their evaluator software and the run they evaluated.
pub fn run_prototext(descriptor: &JobDescriptor) -> String {
    let (software_id, input_run) = match descriptor.evaluated_run() {
        Some(evaluated) => (
            descriptor
                .evaluator
                .as_ref()
                .and_then(|evaluator| evaluator.software_id.clone()),
            evaluated.run_id.clone(),
        ),
        None => (descriptor.software_id.clone(), "none".to_string()),
    };

    format!(
        "softwareId: \"{}\"\nrunId: \"{}\"\ninputDataset: \"{}\"\ninputRun: \"{}\"\ndownloadable: false\ndeleted: false\ntaskId: \"{}\"\naccessToken: \"{}\"\n",
        software_id.unwrap_or_default(),
        descriptor.run_id,
        descriptor.dataset_id,
        input_run,
        descriptor.task_id,
        Uuid::new_v4()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tira_core::domain::descriptor::{DatasetType, EvaluatorSoftware};
    use tira_core::domain::diagnostics::strip_command_banner;
    use tira_core::domain::run::RunKey;

    fn execution(job_dir: &Path) -> JobDescriptor {
        let mut job = JobDescriptor::execution(
            RunKey::new("dataset-1", "vm-1", "2024-01-01-10-00-00"),
            "task-1",
            "alpine",
            "ls $inputDataset",
            job_dir,
            DatasetType::Test,
        );
        job.software_id = Some("7".to_string());
        job
    }

    fn populate(output: &Path) {
        std::fs::create_dir_all(output.join("sub")).unwrap();
        std::fs::write(output.join("run.txt"), "a\nb\n").unwrap();
        std::fs::write(output.join("sub/notes.txt"), "c\n").unwrap();
    }

    #[test]
    fn test_size_counts_output_dir_itself() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());

        let size = OutputSize::measure(dir.path()).unwrap();
        assert_eq!(
            size,
            OutputSize {
                bytes: 6,
                lines: 3,
                files: 2,
                directories: 2,
            }
        );
        assert_eq!(size.to_string(), "6\n3\n2\n2\n");
    }

    #[test]
    fn test_file_list_is_sorted_tree() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        populate(&output);

        assert_eq!(
            file_list(&output).unwrap(),
            "output/\n  run.txt\n  sub/\n    notes.txt\n"
        );
    }

    #[test]
    fn test_write_diagnostics_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let job = execution(dir.path());
        let diagnostics = Diagnostics {
            command: "ls /tira-data/input".to_string(),
            stdout: "hello\n".to_string(),
            stderr: "boom\n".to_string(),
        };

        write_diagnostics(dir.path(), &job, &diagnostics).unwrap();

        assert!(!dir.path().join(OUTPUT_DIR).exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join(STDOUT_FILE)).unwrap(),
            "hello\n"
        );
        let stderr = std::fs::read_to_string(dir.path().join(STDERR_FILE)).unwrap();
        assert!(stderr.contains("# Executed Command\n"));
        assert_eq!(strip_command_banner(&stderr), "boom\n");
        assert_eq!(
            std::fs::read_to_string(dir.path().join(SIZE_FILE)).unwrap(),
            "0\n0\n0\n0\n"
        );
    }

    #[test]
    fn test_run_prototext_of_execution() {
        let dir = tempfile::tempdir().unwrap();
        let text = run_prototext(&execution(dir.path()));

        assert!(text.starts_with(
            "softwareId: \"7\"\nrunId: \"2024-01-01-10-00-00\"\ninputDataset: \"dataset-1\"\ninputRun: \"none\"\n"
        ));
        assert!(text.contains("downloadable: false\ndeleted: false\ntaskId: \"task-1\"\n"));
        assert!(text.contains("accessToken: \""));
    }

    #[test]
    fn test_run_prototext_of_evaluation() {
        let dir = tempfile::tempdir().unwrap();
        let job = JobDescriptor::evaluation(
            RunKey::new("dataset-1", "vm-1", "2024-01-02-10-00-00"),
            "task-1",
            RunKey::new("dataset-1", "vm-1", "2024-01-01-10-00-00"),
            EvaluatorSoftware {
                image: "evaluator".to_string(),
                command: "evaluate".to_string(),
                software_id: Some("eval-3".to_string()),
            },
            dir.path(),
            DatasetType::Test,
        );

        let text = run_prototext(&job);
        assert!(text.contains("softwareId: \"eval-3\""));
        assert!(text.contains("inputRun: \"2024-01-01-10-00-00\""));
    }
}
