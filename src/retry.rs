// SPDX-License-Identifier: MIT
//! Bounded fixed-delay retry for transport calls.
//!
//! Every outbound request gets at most a small, fixed number of attempts
//! with a constant delay between them. Only retryable failures
//! ([`SyncError::is_retryable`]) are re-attempted — a 4xx rejection fails
//! immediately, because repeating the identical request cannot succeed.

use std::time::Duration;
use tracing::{debug, warn};

use crate::error::SyncError;

/// Configuration for [`retry_transport`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first try).
    ///
    /// Default: 2 — a single retry before surfacing failure.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    ///
    /// Default: 500 ms
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    /// A config suitable for quick unit tests (no real waiting).
    pub fn instant(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::from_millis(1),
        }
    }

    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

/// Run `f` up to `config.max_attempts` times, sleeping `config.delay`
/// between attempts.
///
/// Stops early on the first success or the first non-retryable error.
/// Returns the last error once attempts are exhausted.
///
/// # Panics
/// Panics if `config.max_attempts` is 0 (would never attempt the operation).
pub async fn retry_transport<F, Fut, T>(config: &RetryConfig, mut f: F) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SyncError>>,
{
    assert!(
        config.max_attempts > 0,
        "RetryConfig.max_attempts must be at least 1"
    );

    let mut last_err: Option<SyncError> = None;

    for attempt in 1..=config.max_attempts {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "retry succeeded");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                debug!(attempt, err = %e, "non-retryable failure — giving up");
                return Err(e);
            }
            Err(e) => {
                if attempt < config.max_attempts {
                    warn!(
                        attempt,
                        max = config.max_attempts,
                        delay_ms = config.delay.as_millis(),
                        err = %e,
                        "attempt failed — retrying"
                    );
                    tokio::time::sleep(config.delay).await;
                } else {
                    warn!(attempt, max = config.max_attempts, err = %e, "all attempts exhausted");
                }
                last_err = Some(e);
            }
        }
    }

    // The loop always assigns last_err when all attempts fail.
    Err(last_err.expect("retry loop ended without setting last_err"))
}
