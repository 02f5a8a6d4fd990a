//! Retry-until-acknowledged loop of the confirmation protocol
//!
//! Confirmations are delivered at least once: transport errors and `FAILED`
//! answers are retried without bound, duplicates are idempotent on the
//! coordinator. Client errors (4xx) end the loop, a 409 means the transaction
//! was already completed differently and retrying cannot help.

use std::future::Future;
use std::time::Duration;
use tira_core::domain::transaction::Transaction;
use tracing::{info, warn};

use crate::error::Result;

/// Capped exponential backoff between attempts
///
/// The first retry happens immediately, later ones wait `step`, `2 * step`,
/// and so on up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub step: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(step: Duration, max: Duration) -> Self {
        Self { step, max }
    }

    /// Retries without waiting
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        self.step.saturating_mul(factor).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}

/// Calls `call` until the coordinator answers with `SUCCESS`
///
/// # Arguments
/// * `backoff` - Delay policy between attempts
/// * `operation` - Name used in log messages
/// * `call` - Performs one attempt
pub async fn until_acknowledged<F, Fut>(backoff: &Backoff, operation: &str, mut call: F) -> Result<Transaction>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Transaction>>,
{
    let mut retry: u32 = 0;

    loop {
        match call().await {
            Ok(answer) if answer.is_success() => {
                if retry > 0 {
                    info!("{} acknowledged after {} retries", operation, retry);
                }
                return Ok(answer);
            }
            Ok(answer) => {
                warn!("{} not acknowledged: {}", operation, answer.message);
            }
            Err(e) if e.is_client_error() => return Err(e),
            Err(e) => {
                warn!("{} failed: {}", operation, e);
            }
        }

        let delay = backoff.delay(retry);
        retry = retry.saturating_add(1);
        if !delay.is_zero() {
            warn!("Retrying {} in {:?}", operation, delay);
        }
        tokio::time::sleep(delay).await;
    }
}
