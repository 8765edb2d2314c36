// SPDX-License-Identifier: MIT
//! Client-side autocomplete cache.
//!
//! Completion lookups hit the wire at most once per input per TTL window
//! (~30 s): repeats inside the window serve the cached list. Inputs below
//! the minimum length never leave the client at all — the server would
//! reject them anyway.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::api::AiBackend;
use crate::error::SyncError;

struct CachedCompletions {
    completions: Vec<String>,
    cached_at: Instant,
}

/// TTL-bounded autocomplete front end over an [`AiBackend`].
pub struct Autocompleter {
    backend: Arc<dyn AiBackend>,
    ttl: Duration,
    min_input_len: usize,
    entries: Mutex<HashMap<String, CachedCompletions>>,
}

impl Autocompleter {
    pub fn new(backend: Arc<dyn AiBackend>, ttl: Duration, min_input_len: usize) -> Self {
        Self {
            backend,
            ttl,
            min_input_len,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Completion candidates for the given partial input.
    ///
    /// Short inputs resolve to an empty list without a network call; cache
    /// hits inside the TTL window do the same with the stored list.
    pub async fn suggest(&self, input: &str) -> Result<Vec<String>, SyncError> {
        let key = input.trim().to_lowercase();
        if key.chars().count() < self.min_input_len {
            return Ok(Vec::new());
        }

        {
            let mut entries = self.entries.lock().await;
            // Opportunistic purge keeps the table from accumulating a
            // session's worth of dead prefixes.
            let ttl = self.ttl;
            entries.retain(|_, cached| cached.cached_at.elapsed() < ttl);
            if let Some(cached) = entries.get(&key) {
                trace!(input = %key, "autocomplete cache hit");
                return Ok(cached.completions.clone());
            }
        }

        let completions = self.backend.autocomplete(input.trim()).await?;
        self.entries.lock().await.insert(
            key,
            CachedCompletions {
                completions: completions.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(completions)
    }

    /// Session reset: drop all cached completions.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskId;
    use crate::suggest::{AiHealth, ParseContext, ParseResponse, SuggestionEnvelope};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingBackend {
        calls: AtomicU32,
    }

    #[async_trait]
    impl AiBackend for CountingBackend {
        async fn parse_task(
            &self,
            _input: &str,
            _context: Option<&ParseContext>,
        ) -> Result<ParseResponse, SyncError> {
            unreachable!("not exercised")
        }
        async fn suggest_improvements(
            &self,
            _task_id: TaskId,
            _input: Option<&str>,
        ) -> Result<Vec<SuggestionEnvelope>, SyncError> {
            unreachable!("not exercised")
        }
        async fn autocomplete(&self, input: &str) -> Result<Vec<String>, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![format!("{input} the team"), format!("{input} the report")])
        }
        async fn health(&self) -> Result<AiHealth, SyncError> {
            unreachable!("not exercised")
        }
    }

    fn completer(ttl: Duration) -> (Arc<CountingBackend>, Autocompleter) {
        let backend = Arc::new(CountingBackend {
            calls: AtomicU32::new(0),
        });
        let auto = Autocompleter::new(backend.clone(), ttl, 3);
        (backend, auto)
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_lookup_within_ttl_is_cached() {
        let (backend, auto) = completer(Duration::from_secs(30));

        let first = auto.suggest("email").await.unwrap();
        let second = auto.suggest("email").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_refetches() {
        let (backend, auto) = completer(Duration::from_secs(30));

        auto.suggest("email").await.unwrap();
        tokio::time::sleep(Duration::from_secs(31)).await;
        auto.suggest("email").await.unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn short_input_never_hits_the_network() {
        let (backend, auto) = completer(Duration::from_secs(30));

        let result = auto.suggest("em").await.unwrap();
        assert!(result.is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn key_is_case_and_whitespace_insensitive() {
        let (backend, auto) = completer(Duration::from_secs(30));

        auto.suggest("Email").await.unwrap();
        auto.suggest("  email  ").await.unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }
}
