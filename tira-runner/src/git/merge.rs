//! Merging job branches back into the trunk
//!
//! The fast in-place merge is tried once. If it fails, the merge is repeated
//! from a fresh clone with a bounded number of attempts and capped exponential
//! backoff.

use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

use super::CiPlatform;

/// Attempts and delays of the clone-and-merge fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRetry {
    pub attempts: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl Default for MergeRetry {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial: Duration::from_secs(15),
            max: Duration::from_secs(150),
        }
    }
}

impl MergeRetry {
    /// Delay after the failed attempt `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.initial
            .checked_mul(2u32.saturating_pow(attempt))
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Merges `branch` into the trunk
pub async fn merge_branch(platform: &dyn CiPlatform, branch: &str, retry: &MergeRetry) -> Result<()> {
    match platform.merge_in_place(branch).await {
        Ok(()) => {
            info!("Merged {} in place", branch);
            return Ok(());
        }
        Err(e) => warn!("In-place merge of {} failed, merging from a fresh clone: {:#}", branch, e),
    }

    let mut attempt = 0;
    loop {
        match platform.merge_from_fresh_clone(branch).await {
            Ok(()) => {
                info!("Merged {} from a fresh clone (attempt {})", branch, attempt + 1);
                return Ok(());
            }
            Err(e) if attempt + 1 >= retry.attempts => {
                return Err(e.context(format!(
                    "Failed to merge {} after {} attempts",
                    branch, retry.attempts
                )));
            }
            Err(e) => {
                let delay = retry.delay(attempt);
                warn!(
                    "Merge attempt {} of {} failed, retrying in {:?}: {:#}",
                    attempt + 1,
                    branch,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::fake::FakeCiPlatform;

    fn quick() -> MergeRetry {
        MergeRetry {
            attempts: 5,
            initial: Duration::from_millis(1),
            max: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_default_delays_double_up_to_cap() {
        let retry = MergeRetry::default();
        let delays: Vec<u64> = (0..5).map(|n| retry.delay(n).as_secs()).collect();
        assert_eq!(delays, vec![15, 30, 60, 120, 150]);
        assert_eq!(retry.delay(40), Duration::from_secs(150));
    }

    #[tokio::test]
    async fn test_in_place_merge_skips_fallback() {
        let platform = FakeCiPlatform::new();
        merge_branch(&platform, "run---d---v---r", &quick()).await.unwrap();
        assert_eq!(platform.merged(), vec!["run---d---v---r".to_string()]);
        assert_eq!(platform.fresh_clone_attempts(), 0);
    }

    #[tokio::test]
    async fn test_fallback_retries_until_success() {
        let platform = FakeCiPlatform::new();
        platform.fail_in_place_merges();
        platform.fail_fresh_clone_merges(3);

        merge_branch(&platform, "b", &quick()).await.unwrap();
        assert_eq!(platform.fresh_clone_attempts(), 4);
        assert_eq!(platform.merged(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_fallback_gives_up_after_five_attempts() {
        let platform = FakeCiPlatform::new();
        platform.fail_in_place_merges();
        platform.fail_fresh_clone_merges(10);

        let err = merge_branch(&platform, "b", &quick()).await.unwrap_err();
        assert!(err.to_string().contains("after 5 attempts"));
        assert_eq!(platform.fresh_clone_attempts(), 5);
        assert!(platform.merged().is_empty());
    }
}
