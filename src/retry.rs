//! Retry logic with linear backoff
//!
//! Every error returned by the wrapped operation counts as a failed attempt. The
//! loop only gives up once the attempt budget is spent. Errors can carry a
//! rate-limit hint through [`BackoffHint`]; a hinted wait replaces the standard
//! backoff for that attempt and does not advance the backoff step.
//!
//! # Example
//!
//! ```no_run
//! use book_relay::config::RetryConfig;
//! use book_relay::retry::{BackoffHint, retry_with_backoff};
//!
//! #[derive(Debug)]
//! struct Flaky;
//!
//! impl std::fmt::Display for Flaky {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "flaky")
//!     }
//! }
//!
//! impl BackoffHint for Flaky {}
//!
//! # async fn example() -> Result<(), Flaky> {
//! let policy = RetryConfig::default();
//! let value = retry_with_backoff(&policy, "example", || async { Ok::<_, Flaky>(7) }).await?;
//! assert_eq!(value, 7);
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{FetchError, PublishError};
use std::future::Future;
use std::time::Duration;

/// Lets an error override the standard backoff delay
pub trait BackoffHint {
    /// Wait mandated by the remote side before the next attempt, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl BackoffHint for FetchError {}

impl BackoffHint for PublishError {
    fn retry_after(&self) -> Option<Duration> {
        match self {
            PublishError::RateLimited { retry_after } => Some(*retry_after),
            PublishError::Transient(_) => None,
        }
    }
}

/// Execute an async operation, retrying every failure with linear backoff
///
/// # Arguments
///
/// * `policy` - attempt budget and delay parameters
/// * `label` - short description used in log lines (e.g. the item name)
/// * `operation` - closure producing a fresh attempt future on each call
///
/// # Returns
///
/// The first successful result, or the last error once `policy.max_attempts`
/// attempts have been made. There is no sleep after the final attempt.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryConfig,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: BackoffHint + std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    let mut step = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(item = label, attempts = attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if attempt < max_attempts => {
                let delay = match e.retry_after() {
                    Some(hint) => hint.saturating_add(policy.rate_limit_margin),
                    None => {
                        let delay = policy.delay_for(step);
                        step += 1;
                        delay
                    }
                };

                tracing::warn!(
                    item = label,
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    rate_limited = e.retry_after().is_some(),
                    "attempt failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(
                    item = label,
                    error = %e,
                    attempts = attempt,
                    "operation failed after all retry attempts exhausted"
                );
                return Err(e);
            }
        }
    }
}
