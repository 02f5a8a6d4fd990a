//! Review domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reviewer id used for reviews produced by the auto-reviewer
pub const AUTO_REVIEWER_ID: &str = "tira";

/// Review of a run
///
/// Persisted once per run and never silently overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub run_id: String,
    pub reviewer_id: String,
    pub review_date: DateTime<Utc>,
    pub has_warnings: bool,
    pub has_errors: bool,
    pub has_no_errors: bool,
    pub blinded: bool,
    pub missing_output: bool,
    pub has_error_output: bool,
    pub comment: String,
}

impl Review {
    /// An empty review with every flag cleared
    pub fn blank(run_id: impl Into<String>, reviewer_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            reviewer_id: reviewer_id.into(),
            review_date: Utc::now(),
            has_warnings: false,
            has_errors: false,
            has_no_errors: false,
            blinded: false,
            missing_output: false,
            has_error_output: false,
            comment: String::new(),
        }
    }

    /// Whether the review verdict matches another one, ignoring the date
    pub fn same_verdict(&self, other: &Review) -> bool {
        self.run_id == other.run_id
            && self.has_warnings == other.has_warnings
            && self.has_errors == other.has_errors
            && self.has_no_errors == other.has_no_errors
            && self.blinded == other.blinded
            && self.missing_output == other.missing_output
            && self.has_error_output == other.has_error_output
            && self.comment == other.comment
    }
}
