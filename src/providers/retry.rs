//! Shared retry policy for external calls.
//!
//! Every suspension point in the pipeline is an external network call, and
//! each one gets the same treatment: a per-call timeout after which the call
//! counts as a retryable transient failure, then exponential backoff up to a
//! bounded attempt count.

use std::future::Future;
use std::time::Duration;

/// Classifies an error as transient (worth retrying) or permanent, and
/// constructs the error used when a call exceeds its timeout.
pub trait RetryClass {
    fn is_retryable(&self) -> bool;
    fn timed_out(after: Duration) -> Self;
}

/// Backoff and timeout parameters shared by all external call sites.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per retry.
    pub base_delay: Duration,
    /// Ceiling on the backoff delay.
    pub max_delay: Duration,
    /// Per-call timeout; an elapsed call is treated as retryable.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
    /// capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }
}

/// Runs `op` under the policy's timeout, retrying transient failures with
/// exponential backoff until the attempt budget is spent.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    E: RetryClass,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 1;
    loop {
        let outcome = match tokio::time::timeout(policy.call_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(E::timed_out(policy.call_timeout)),
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying external call");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
