//! Run directory layout
//!
//! File names every execution backend writes into a run directory, and the
//! banner that precedes the captured stderr.

/// Task artifacts produced by the software
pub const OUTPUT_DIR: &str = "output";
pub const STDOUT_FILE: &str = "stdout.txt";
pub const STDERR_FILE: &str = "stderr.txt";
pub const FILE_LIST_FILE: &str = "file-list.txt";
pub const SIZE_FILE: &str = "size.txt";

/// Run definition written next to the output
pub const RUN_DESCRIPTOR_FILE: &str = "run.prototext";

/// Persisted review of the run
pub const REVIEW_FILE: &str = "run-review.json";

pub const PROFILING_DIR: &str = "profiling";
pub const PROFILING_ARCHIVE: &str = "profiling.zip";
pub const PARSED_PROFILING_FILE: &str = "parsed_profiling.jsonl";

const BANNER_RULE: &str = "################################################################";
const BANNER_TITLE: &str = "# Executed Command";

/// Banner embedding the executed command at the top of `stderr.txt`
pub fn command_banner(command: &str) -> String {
    format!(
        "{rule}\n{title}\n{rule}\n{command}\n{rule}\n",
        rule = BANNER_RULE,
        title = BANNER_TITLE,
        command = command
    )
}

/// Text of a `stderr.txt` after its command banner, or all of it without one
pub fn strip_command_banner(stderr: &str) -> &str {
    let header = format!("{rule}\n{title}\n{rule}\n", rule = BANNER_RULE, title = BANNER_TITLE);
    let Some(rest) = stderr.strip_prefix(header.as_str()) else {
        return stderr;
    };

    let closing = format!("{}\n", BANNER_RULE);
    match rest.find(closing.as_str()) {
        Some(position) => &rest[position + closing.len()..],
        None => stderr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_banner() {
        let stderr = format!("{}warning: slow\n", command_banner("echo 1\necho 2"));
        assert_eq!(strip_command_banner(&stderr), "warning: slow\n");
        assert_eq!(strip_command_banner(&command_banner("true")), "");
    }

    #[test]
    fn test_strip_without_banner() {
        assert_eq!(strip_command_banner("plain error\n"), "plain error\n");
    }
}
