use crate::MineError;
use crate::config::RetryPolicy;
use std::future::Future;
use tracing::{error, warn};

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy's retry budget is spent. The last error is returned on exhaustion.
pub async fn retry_async<T, F, Fut>(label: &str, policy: RetryPolicy, mut op: F) -> Result<T, MineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MineError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                warn!(%label, attempt, max = policy.max_retries, error = %e, "retrying");
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    error!(%label, attempts = attempt + 1, error = %e, "retry budget exhausted");
                }
                return Err(e);
            }
        }
    }
}

/// Blocking twin of [`retry_async`] for code running on blocking threads.
pub fn retry_blocking<T, F>(label: &str, policy: RetryPolicy, mut op: F) -> Result<T, MineError>
where
    F: FnMut() -> Result<T, MineError>,
{
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                warn!(%label, attempt, max = policy.max_retries, error = %e, "retrying");
                std::thread::sleep(policy.delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    error!(%label, attempts = attempt + 1, error = %e, "retry budget exhausted");
                }
                return Err(e);
            }
        }
    }
}
