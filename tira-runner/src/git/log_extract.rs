//! CI log extraction
//!
//! Slices the output and the command of the user software out of a raw CI job
//! log. The markers are the shell echo lines of the CI job definition.

use anyhow::Result;

const EVAL_MARKERS: [&str; 2] = [
    "$ eval \"${TIRA_COMMAND_TO_EXECUTE}\"[0;m",
    "$ eval \"${TIRA_EVALUATION_COMMAND_TO_EXECUTE}\"[0;m",
];
const COMMAND_MARKERS: [(&str, &str); 2] = [
    (
        "$ echo \"${TIRA_COMMAND_TO_EXECUTE}\"[0;m",
        "[32;1m$ eval \"${TIRA_COMMAND_TO_EXECUTE}\"",
    ),
    (
        "$ echo \"${TIRA_EVALUATION_COMMAND_TO_EXECUTE}\"[0;m",
        "[32;1m$ eval \"${TIRA_EVALUATION_COMMAND_TO_EXECUTE}\"",
    ),
];
const ENV_DUMP_MARKER: &str = "[32;1m$ env|grep 'TIRA' > task.env";
const SECTION_END_MARKER: &str = "section_end:";

/// Keeps printable ASCII, newlines and tabs; drops the ESC of color codes
pub fn printable(log: &str) -> String {
    log.chars()
        .filter(|c| matches!(c, ' '..='~' | '\n' | '\t' | '\r'))
        .collect()
}

/// Output of the user command
pub fn extract_output(log: &str) -> Result<String> {
    let log = printable(log.trim());

    for marker in EVAL_MARKERS {
        if let Some((_, after)) = log.split_once(marker) {
            return Ok(cut_suffix(after).to_string());
        }
    }

    Err(changed_format(&log))
}

/// Command the CI job executed
pub fn extract_command(log: &str) -> Result<String> {
    let log = printable(log.trim());

    for (start, end) in COMMAND_MARKERS {
        if let Some((_, after)) = log.split_once(start) {
            if let Some((command, _)) = after.split_once(end) {
                return Ok(command.trim().to_string());
            }
        }
    }

    Err(changed_format(&log))
}

fn cut_suffix(output: &str) -> &str {
    let output = output
        .split_once(ENV_DUMP_MARKER)
        .map(|(before, _)| before)
        .unwrap_or(output);
    let output = output
        .split_once(SECTION_END_MARKER)
        .map(|(before, _)| before)
        .unwrap_or(output);
    output.trim()
}

fn changed_format(log: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "The format of the CI log seems to have changed, no command markers found in:\n\n{}",
        log
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\u{1b}[0KRunning with gitlab-runner\n\
\u{1b}[32;1m$ echo \"${TIRA_COMMAND_TO_EXECUTE}\"\u{1b}[0;m\n\
python3 /app/run.py --input /tira-data/input\n\
\u{1b}[32;1m$ eval \"${TIRA_COMMAND_TO_EXECUTE}\"\u{1b}[0;m\n\
processing 3 queries\n\
done\n\
\u{1b}[32;1m$ env|grep 'TIRA' > task.env\u{1b}[0;m\n\
section_end:1700000000:step_script\n";

    #[test]
    fn test_extract_output() {
        assert_eq!(extract_output(LOG).unwrap(), "processing 3 queries\ndone");
    }

    #[test]
    fn test_extract_command() {
        assert_eq!(
            extract_command(LOG).unwrap(),
            "python3 /app/run.py --input /tira-data/input"
        );
    }

    #[test]
    fn test_evaluation_markers() {
        let log = LOG.replace("TIRA_COMMAND_TO_EXECUTE", "TIRA_EVALUATION_COMMAND_TO_EXECUTE");
        assert_eq!(extract_output(&log).unwrap(), "processing 3 queries\ndone");
        assert_eq!(
            extract_command(&log).unwrap(),
            "python3 /app/run.py --input /tira-data/input"
        );
    }

    #[test]
    fn test_output_cut_at_section_end() {
        let log = "$ eval \"${TIRA_COMMAND_TO_EXECUTE}\"[0;m\nresult\nsection_end:1:script\ntrailer";
        assert_eq!(extract_output(log).unwrap(), "result");
    }

    #[test]
    fn test_missing_marker_mentions_changed_format() {
        let err = extract_output("plain log without markers").unwrap_err();
        assert!(err.to_string().contains("format of the CI log"));
        assert!(extract_command("plain log").is_err());
    }

    #[test]
    fn test_printable_drops_escape() {
        assert_eq!(printable("\u{1b}[32;1mok\u{7}\n"), "[32;1mok\n");
    }
}
