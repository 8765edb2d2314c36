// SPDX-License-Identifier: MIT
//! Per-key debounce timers.
//!
//! [`DebounceScheduler::schedule`] arms a timer for a key; arming the same
//! key again cancels the previous timer and uses the fresh action, so at most
//! one action fires per quiet period per key. Cancellation is a generation
//! bump: every armed timer remembers the generation it was armed under and
//! fires only if nothing has bumped it since. Purely in-memory — nothing
//! survives a restart.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::trace;

/// Per-key cancellable timer set.
///
/// Cheaply cloneable — all clones share the same timer state.
#[derive(Clone, Default)]
pub struct DebounceScheduler {
    /// key → generation it was last armed/cancelled under. A timer armed
    /// under generation g fires only if the key still maps to g when the
    /// delay elapses. Generations are minted from one global counter, so a
    /// number is never reused even across [`clear`](Self::clear).
    generations: Arc<Mutex<HashMap<String, u64>>>,
    next_generation: Arc<AtomicU64>,
}

impl DebounceScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer for `key`. After `delay` of quiet, `action`
    /// runs — unless another `schedule` or [`cancel`](Self::cancel) for the
    /// same key happens first, in which case this timer dies silently.
    ///
    /// A zero delay still yields to the runtime once, so a caller that arms
    /// and immediately re-arms observes last-write-wins either way.
    pub async fn schedule<F, Fut>(&self, key: &str, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let armed_at = self.bump(key).await;
        trace!(key, generation = armed_at, delay_ms = delay.as_millis() as u64, "timer armed");

        let generations = Arc::clone(&self.generations);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let current = generations.lock().await.get(&key).copied();
            if current == Some(armed_at) {
                trace!(key = %key, "timer fired");
                action().await;
            } else {
                trace!(key = %key, "timer superseded — skipping");
            }
        });
    }

    /// Cancel any armed timer for `key` without re-arming.
    pub async fn cancel(&self, key: &str) {
        self.bump(key).await;
        trace!(key, "timer cancelled");
    }

    /// Forget all keys (session reset). Pending timers find their key gone
    /// at the generation check and die silently.
    pub async fn clear(&self) {
        self.generations.lock().await.clear();
    }

    async fn bump(&self, key: &str) -> u64 {
        let g = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        self.generations.lock().await.insert(key.to_string(), g);
        g
    }
}
