//! Job descriptor file
//!
//! Newline-separated ASCII `KEY=VALUE` lines, no escaping, split on the first
//! `=`. This is the representation committed to the CI repository as
//! `<dataset>/<vm>/<run>/job-to-execute.txt`.

use crate::domain::descriptor::{DescriptorError, JobDescriptor};

/// File name of the descriptor inside a job directory of the CI repository
pub const JOB_FILE_NAME: &str = "job-to-execute.txt";

/// Path of the descriptor file relative to the CI repository root
pub fn job_file_path(descriptor: &JobDescriptor) -> String {
    format!(
        "{}/{}/{}/{}",
        descriptor.dataset_id, descriptor.vm_id, descriptor.run_id, JOB_FILE_NAME
    )
}

/// Encodes a descriptor as a job file
///
/// Values cannot contain line breaks since the format has no escaping.
pub fn encode(descriptor: &JobDescriptor) -> Result<String, DescriptorError> {
    descriptor.validate()?;

    let mut lines = Vec::new();
    for (key, value) in descriptor.to_entries() {
        if value.contains('\n') || value.contains('\r') {
            return Err(DescriptorError::InvalidValue {
                key,
                value,
                reason: "values cannot span multiple lines".to_string(),
            });
        }
        lines.push(format!("{}={}", key, value).trim().to_string());
    }

    Ok(lines.join("\n"))
}

/// Splits a job file into ordered entries
///
/// Blank lines are skipped. Duplicates are kept here and rejected by [`decode`].
pub fn parse(content: &str) -> Result<Vec<(String, String)>, DescriptorError> {
    let mut entries = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(DescriptorError::MalformedLine {
                line_number: index + 1,
                line: line.to_string(),
            });
        };

        entries.push((key.trim().to_string(), value.to_string()));
    }

    Ok(entries)
}

/// Decodes and validates a job file
pub fn decode(content: &str) -> Result<JobDescriptor, DescriptorError> {
    let entries = parse(content)?;
    JobDescriptor::from_entries(&entries)
}
