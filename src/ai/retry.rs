use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use super::JudgeError;

/// Exponential backoff: `base_delay`, doubled after every failed attempt,
/// for at most `max_attempts` calls in total.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl BackoffPolicy {
    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// attempt budget is spent. Only [`super::JudgeErrorKind::Transient`] is retried.
pub async fn with_backoff<F, Fut, T>(policy: &BackoffPolicy, mut op: F) -> Result<T, JudgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, JudgeError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let wait = policy.delay_for(attempt);
                warn!(
                    error = %err,
                    attempt,
                    max_attempts,
                    "Judge call failed, retrying in {:?}",
                    wait
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    error!(error = %err, attempts = attempt, "Judge call failed after all retries");
                }
                return Err(err);
            }
        }
    }
}
