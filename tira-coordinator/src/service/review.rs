//! Review Service
//!
//! The auto-reviewer derives a review from a run directory the first time a
//! review is requested and persists it next to the run. A persisted review is
//! returned as is; one that cannot be read is an error and is never replaced.

use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tira_core::domain::diagnostics::{OUTPUT_DIR, REVIEW_FILE, RUN_DESCRIPTOR_FILE, STDERR_FILE, strip_command_banner};
use tira_core::domain::review::{AUTO_REVIEWER_ID, Review};
use tira_core::domain::run::{RunKey, RunLifecycle};
use uuid::Uuid;

use crate::repository::LedgerStore;
use crate::service::run_service::{self, RunError};

pub const MISSING_OUTPUT_COMMENT: &str = "No output was produced";
pub const MISSING_DEFINITION_COMMENT: &str = "No run definition recorded";
pub const ERROR_OUTPUT_COMMENT: &str = "The software wrote to stderr";

/// Service error type
#[derive(Debug, Error)]
pub enum ReviewError {
    /// A persisted review exists but cannot be parsed
    #[error("Review file {path} exists but is corrupted: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode review: {0}")]
    Encode(serde_json::Error),

    #[error(transparent)]
    Run(#[from] RunError),
}

/// Directory holding the files of a run
pub fn run_dir(runs_dir: &Path, key: &RunKey) -> PathBuf {
    runs_dir.join(&key.dataset_id).join(&key.vm_id).join(&key.run_id)
}

/// Get the review of a known run, creating it on first request
///
/// The run moves to `reviewed`.
pub async fn review_run(
    store: &dyn LedgerStore,
    runs_dir: &Path,
    key: &RunKey,
) -> Result<Review, ReviewError> {
    run_service::get_run(store, key).await?;

    let review = load_or_create(&run_dir(runs_dir, key), &key.run_id, Utc::now())?;
    run_service::advance(store, key, RunLifecycle::Reviewed).await?;

    Ok(review)
}

/// Reads the persisted review of a run directory or creates and persists one
///
/// The review is written to a temporary file and linked into place, the
/// link fails when another request persisted a review first. That review
/// is returned instead, so concurrent first requests agree.
pub fn load_or_create(dir: &Path, run_id: &str, now: DateTime<Utc>) -> Result<Review, ReviewError> {
    let path = dir.join(REVIEW_FILE);

    if path.exists() {
        return read_review(&path);
    }

    let review = auto_review(dir, run_id, now);

    fs::create_dir_all(dir).map_err(|source| ReviewError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let encoded = serde_json::to_string_pretty(&review).map_err(ReviewError::Encode)?;

    let staged = dir.join(format!(".{}.{}.tmp", REVIEW_FILE, Uuid::new_v4()));
    fs::write(&staged, encoded).map_err(|source| ReviewError::Io {
        path: staged.clone(),
        source,
    })?;
    let linked = fs::hard_link(&staged, &path);
    if let Err(e) = fs::remove_file(&staged) {
        tracing::warn!("Failed to remove {}: {}", staged.display(), e);
    }

    match linked {
        Ok(()) => {
            tracing::info!("Auto-review of {} persisted: {}", run_id, describe(&review));
            Ok(review)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            tracing::debug!("Review of {} was persisted concurrently", run_id);
            read_review(&path)
        }
        Err(source) => Err(ReviewError::Io { path, source }),
    }
}

fn read_review(path: &Path) -> Result<Review, ReviewError> {
    let content = fs::read(path).map_err(|source| ReviewError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&content).map_err(|source| {
        tracing::error!("Review file {} is corrupted: {}", path.display(), source);
        ReviewError::Corrupt {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Derives a review from the contents of a run directory
pub fn auto_review(dir: &Path, run_id: &str, now: DateTime<Utc>) -> Review {
    let mut review = Review::blank(run_id, AUTO_REVIEWER_ID);
    review.review_date = now;

    if !dir.join(OUTPUT_DIR).is_dir() {
        review.has_errors = true;
        review.missing_output = true;
        review.has_error_output = true;
        review.blinded = true;
        review.comment = MISSING_OUTPUT_COMMENT.to_string();
    } else if !dir.join(RUN_DESCRIPTOR_FILE).is_file() {
        review.has_errors = true;
        review.comment = MISSING_DEFINITION_COMMENT.to_string();
    } else if has_error_output(dir) {
        review.has_warnings = true;
        review.has_error_output = true;
        review.has_no_errors = true;
        review.blinded = true;
        review.comment = ERROR_OUTPUT_COMMENT.to_string();
    } else {
        review.has_no_errors = true;
        review.blinded = true;
    }

    review
}

fn has_error_output(dir: &Path) -> bool {
    match fs::read(dir.join(STDERR_FILE)) {
        Ok(content) => !strip_command_banner(&String::from_utf8_lossy(&content))
            .trim()
            .is_empty(),
        Err(_) => false,
    }
}

fn describe(review: &Review) -> &'static str {
    if review.has_errors {
        "errors"
    } else if review.has_warnings {
        "warnings"
    } else {
        "no errors"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryLedgerStore;
    use tira_core::domain::diagnostics::command_banner;
    use tira_core::domain::run::Run;

    fn complete_run_dir(dir: &Path) {
        fs::create_dir_all(dir.join(OUTPUT_DIR)).unwrap();
        fs::write(dir.join(RUN_DESCRIPTOR_FILE), "runId: \"r\"\n").unwrap();
    }

    #[test]
    fn test_missing_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(RUN_DESCRIPTOR_FILE), "").unwrap();

        let review = auto_review(dir.path(), "run-1", Utc::now());
        assert!(review.has_errors);
        assert!(review.missing_output);
        assert!(!review.has_no_errors);
        assert_eq!(review.comment, MISSING_OUTPUT_COMMENT);
        assert_eq!(review.reviewer_id, "tira");
    }

    #[test]
    fn test_missing_definition_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(OUTPUT_DIR)).unwrap();

        let review = auto_review(dir.path(), "run-1", Utc::now());
        assert!(review.has_errors);
        assert!(!review.missing_output);
        assert_eq!(review.comment, MISSING_DEFINITION_COMMENT);
    }

    #[test]
    fn test_clean_run_is_blinded_without_errors() {
        let dir = tempfile::tempdir().unwrap();
        complete_run_dir(dir.path());
        fs::write(dir.path().join(STDERR_FILE), command_banner("./run.sh")).unwrap();

        let review = auto_review(dir.path(), "run-1", Utc::now());
        assert!(review.has_no_errors);
        assert!(review.blinded);
        assert!(!review.has_errors);
        assert!(!review.has_warnings);
    }

    #[test]
    fn test_stderr_output_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        complete_run_dir(dir.path());
        fs::write(
            dir.path().join(STDERR_FILE),
            format!("{}Traceback (most recent call last)\n", command_banner("./run.sh")),
        )
        .unwrap();

        let review = auto_review(dir.path(), "run-1", Utc::now());
        assert!(review.has_warnings);
        assert!(review.has_error_output);
        assert!(!review.has_errors);
    }

    #[test]
    fn test_review_is_persisted_once() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_create(dir.path(), "run-1", Utc::now()).unwrap();
        assert!(dir.path().join(REVIEW_FILE).exists());

        // Output appearing later does not change the persisted review
        complete_run_dir(dir.path());
        let second = load_or_create(dir.path(), "run-1", Utc::now()).unwrap();
        assert_eq!(first, second);
        assert!(second.missing_output);
    }

    #[test]
    fn test_corrupt_review_is_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(REVIEW_FILE), "{not json").unwrap();

        let err = load_or_create(dir.path(), "run-1", Utc::now()).unwrap_err();
        assert!(matches!(err, ReviewError::Corrupt { .. }));
        assert_eq!(
            fs::read_to_string(dir.path().join(REVIEW_FILE)).unwrap(),
            "{not json"
        );
    }

    #[test]
    fn test_concurrent_first_requests_agree() {
        let dir = tempfile::tempdir().unwrap();
        let barrier = std::sync::Barrier::new(8);

        let reviews: Vec<Review> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let barrier = &barrier;
                    let dir = dir.path();
                    scope.spawn(move || {
                        let now = Utc::now() + chrono::Duration::seconds(i);
                        barrier.wait();
                        load_or_create(dir, "run-1", now).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let persisted: Review =
            serde_json::from_str(&fs::read_to_string(dir.path().join(REVIEW_FILE)).unwrap()).unwrap();
        for review in &reviews {
            assert_eq!(review, &persisted);
        }

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .filter(|name| name != REVIEW_FILE)
            .collect();
        assert!(leftovers.is_empty(), "unexpected files {:?}", leftovers);
    }

    #[tokio::test]
    async fn test_review_run_marks_reviewed() {
        let runs_dir = tempfile::tempdir().unwrap();
        let store = MemoryLedgerStore::new();
        let key = RunKey::new("d", "v", "r");
        store
            .insert_run(&Run {
                key: key.clone(),
                software_id: None,
                input_run_id: None,
                is_evaluation: false,
                downloadable: false,
                deleted: false,
                lifecycle: RunLifecycle::Executed,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        complete_run_dir(&run_dir(runs_dir.path(), &key));

        let review = review_run(&store, runs_dir.path(), &key).await.unwrap();
        assert!(review.has_no_errors);
        assert_eq!(
            store.find_run(&key).await.unwrap().unwrap().lifecycle,
            RunLifecycle::Reviewed
        );
    }
}
