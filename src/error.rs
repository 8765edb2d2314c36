// SPDX-License-Identifier: MIT
//! Error taxonomy for the sync layer.
//!
//! Raw transport errors never cross the component boundary — the arbiter and
//! the mutation manager resolve every [`SyncError`] into either a silent
//! retry or a structured [`Alert`](crate::alerts::Alert). Staleness is not an
//! error (stale responses are dropped without surfacing anything), and
//! unknown suggestion kinds degrade to informational alerts.

use thiserror::Error;

/// Failure classes produced by the sync layer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network unreachable, request timeout, or a 5xx from the server.
    ///
    /// Always recoverable; eligible for a bounded retry before surfacing.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Malformed input rejected before any request was sent.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The server rejected the request (4xx) — e.g. a mutation conflict.
    ///
    /// Not retried: the same request would fail the same way.
    #[error("rejected by server: {0}")]
    Rejected(String),

    /// The response body did not match the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl SyncError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Transport failures are transient by definition; a garbled body is
    /// treated the same way (a proxy truncation looks identical to us).
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport(_) | SyncError::Decode(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::Decode(err.to_string())
        } else {
            // Timeouts, connect failures, and body errors all land here.
            SyncError::Transport(err.to_string())
        }
    }
}
