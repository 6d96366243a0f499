//! Bounded retry with exponential backoff and jitter

use crate::error::{PipelineError, PipelineResult};

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry settings for network reads
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_ms: u64,
    max_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_ms: u64, max_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_ms,
            max_ms,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Only [`PipelineError::NetworkUnavailable`] is retried.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> PipelineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PipelineResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(PipelineError::NetworkUnavailable(msg)) if attempt < self.max_attempts => {
                    let delay = calculate_backoff(attempt, self.base_ms, self.max_ms);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Network read failed, retrying: {}",
                        msg
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}
