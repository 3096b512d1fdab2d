//! Bounded polling for operations that complete asynchronously upstream,
//! such as a query that is submitted, then polled until its results exist.

use crate::error::{FetchError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Calls `probe` every `interval` until it yields a value.
///
/// Fails with [`FetchError::Timeout`] once `max_wait` has elapsed without a
/// value. Errors from `probe` end the loop immediately.
pub async fn poll_until<T, F, Fut>(
    operation: &str,
    interval: Duration,
    max_wait: Duration,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        if let Some(value) = probe().await? {
            debug!(operation, attempts, "Polled operation completed");
            return Ok(value);
        }
        let waited = started.elapsed();
        if waited + interval > max_wait {
            return Err(FetchError::Timeout {
                operation: operation.to_string(),
                waited,
            });
        }
        tokio::time::sleep(interval).await;
    }
}
