use std::fmt::Display;

use futures::future::BoxFuture;
use tracing::warn;

use crate::config::RetryPolicy;

/// Run `op` until it succeeds, fails with an error `is_retryable` rejects, or
/// the policy's attempt budget is spent. The closure receives the 1-based
/// attempt number and returns a boxed future.
pub async fn retry_with_policy<'a, T, E, F>(
    policy: &RetryPolicy,
    label: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u16) -> BoxFuture<'a, Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u16;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    operation = label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
