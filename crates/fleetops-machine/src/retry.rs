//! In-place retry with a fixed interval, driven by a state's
//! [`crate::state::RetryRule`].

use std::future::Future;
use std::time::Duration;

use crate::state::RetryRule;

/// Runs `op` until it succeeds, `rule` is exhausted, or `op` returns an
/// error `rule` doesn't cover. On the final attempt the last error (or
/// success) is returned as-is.
pub async fn with_retry<T, E, F, Fut>(rule: Option<&RetryRule>, applies: impl Fn(&E) -> bool, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let Some(rule) = rule else {
        return op().await;
    };

    let mut attempt = 1;
    loop {
        tracing::debug!(attempt, max_attempts = rule.max_attempts, "attempting stage");
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < rule.max_attempts && applies(&err) => {
                tracing::warn!(attempt, max_attempts = rule.max_attempts, error = %err, "stage attempt failed, retrying");
                tokio::time::sleep(rule.interval()).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// A fixed, non-retried pause, used between task handlers for the
/// `WaitFor*` states.
pub async fn pause(duration: Duration) {
    tokio::time::sleep(duration).await;
}
