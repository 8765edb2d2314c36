// SPDX-License-Identifier: MIT
//! Suggestion request arbiter.
//!
//! Concurrent parse requests for one draft are tolerated at the network
//! layer, but only the response to the *latest* request may touch the draft.
//! Each outbound request mints a strictly increasing [`RequestToken`]; when
//! a response lands, it commits only if its token is still the highest
//! issued for that draft — otherwise it is discarded silently (no state
//! change, no alert). Different drafts are fully independent.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::api::AiBackend;
use crate::model::TaskDraft;
use crate::retry::{retry_transport, RetryConfig};

use super::{AiState, ParseContext, RequestToken};

/// Shared draft table: one transient [`TaskDraft`] per open form, keyed by
/// an opaque draft key (the store owns creation/teardown).
pub type SharedDrafts = Arc<RwLock<HashMap<String, TaskDraft>>>;

pub struct SuggestionArbiter {
    backend: Arc<dyn AiBackend>,
    drafts: SharedDrafts,
    /// Highest token issued per draft key.
    latest: RwLock<HashMap<String, u64>>,
    retry: RetryConfig,
}

impl SuggestionArbiter {
    pub fn new(backend: Arc<dyn AiBackend>, drafts: SharedDrafts, retry: RetryConfig) -> Self {
        Self {
            backend,
            drafts,
            latest: RwLock::new(HashMap::new()),
            retry,
        }
    }

    /// Issue a parse request for a draft and commit the result if it is
    /// still current when it arrives.
    ///
    /// Failure is never fatal to the form: a transport error on the current
    /// token puts the draft into [`AiState::Unavailable`] with suggestions
    /// cleared, and manual entry continues to work.
    pub async fn request(
        &self,
        draft_key: &str,
        input: &str,
        context: Option<ParseContext>,
    ) -> RequestToken {
        let token = self.mint(draft_key).await;
        self.with_draft(draft_key, |d| d.ai = AiState::Loading).await;
        debug!(draft = draft_key, token = token.0, "parse request issued");

        let result = retry_transport(&self.retry, || {
            self.backend.parse_task(input, context.as_ref())
        })
        .await;

        // Suspension is over — re-check currency before any effect.
        if !self.is_current(draft_key, token).await {
            debug!(draft = draft_key, token = token.0, "stale response discarded");
            return token;
        }

        match result {
            Ok(response) => {
                debug!(
                    draft = draft_key,
                    token = token.0,
                    suggestions = response.suggestions.len(),
                    confidence = response.parsed_task.confidence,
                    "parse result committed"
                );
                self.with_draft(draft_key, move |d| {
                    d.parse = Some(response.parsed_task);
                    d.suggestions = response.suggestions;
                    d.ai = AiState::Ready;
                })
                .await;
            }
            Err(e) => {
                warn!(draft = draft_key, err = %e, "parse request failed — AI unavailable");
                self.with_draft(draft_key, |d| {
                    d.parse = None;
                    d.suggestions.clear();
                    d.ai = AiState::Unavailable;
                })
                .await;
            }
        }
        token
    }

    /// Drop a draft's suggestion state back to idle (short/empty input).
    pub async fn clear(&self, draft_key: &str) {
        // Invalidate any in-flight response as well: it would otherwise
        // resurrect suggestions the user just typed away.
        self.mint(draft_key).await;
        self.with_draft(draft_key, |d| d.clear_suggestions()).await;
    }

    /// Run `f` against the draft if it still exists. A closed form simply
    /// loses the update — that is the discard-on-cancel semantics.
    pub async fn with_draft(&self, draft_key: &str, f: impl FnOnce(&mut TaskDraft)) {
        if let Some(draft) = self.drafts.write().await.get_mut(draft_key) {
            f(draft);
        }
    }

    /// Highest token issued so far for a draft (testing/introspection).
    pub async fn latest_token(&self, draft_key: &str) -> Option<RequestToken> {
        self.latest.read().await.get(draft_key).copied().map(RequestToken)
    }

    /// Session reset: forget every token counter.
    pub async fn reset(&self) {
        self.latest.write().await.clear();
    }

    async fn mint(&self, draft_key: &str) -> RequestToken {
        let mut latest = self.latest.write().await;
        let counter = latest.entry(draft_key.to_string()).or_insert(0);
        *counter += 1;
        RequestToken(*counter)
    }

    async fn is_current(&self, draft_key: &str, token: RequestToken) -> bool {
        self.latest
            .read()
            .await
            .get(draft_key)
            .is_some_and(|highest| *highest == token.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::suggest::{AiHealth, ParseResponse, ParseResult, SuggestionEnvelope};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Fake AI backend whose `parse_task` blocks until released, so tests
    /// control exactly when each response "arrives".
    struct GatedBackend {
        gate: Notify,
        calls: AtomicU32,
    }

    impl GatedBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                gate: Notify::new(),
                calls: AtomicU32::new(0),
            })
        }

        fn response_for(input: &str) -> ParseResponse {
            ParseResponse {
                parsed_task: ParseResult {
                    title: input.to_string(),
                    description: None,
                    priority: Default::default(),
                    category: None,
                    due_date: None,
                    estimated_duration_minutes: None,
                    confidence: 0.9,
                },
                suggestions: vec![],
                alternatives: vec![],
            }
        }
    }

    #[async_trait]
    impl AiBackend for GatedBackend {
        async fn parse_task(
            &self,
            input: &str,
            _context: Option<&ParseContext>,
        ) -> Result<ParseResponse, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(Self::response_for(input))
        }

        async fn suggest_improvements(
            &self,
            _task_id: crate::model::TaskId,
            _input: Option<&str>,
        ) -> Result<Vec<SuggestionEnvelope>, SyncError> {
            Ok(vec![])
        }

        async fn autocomplete(&self, _input: &str) -> Result<Vec<String>, SyncError> {
            Ok(vec![])
        }

        async fn health(&self) -> Result<AiHealth, SyncError> {
            Ok(AiHealth {
                status: "healthy".into(),
                features: vec![],
            })
        }
    }

    fn arbiter_with(backend: Arc<dyn AiBackend>) -> (Arc<SuggestionArbiter>, SharedDrafts) {
        let drafts: SharedDrafts = Arc::new(RwLock::new(HashMap::new()));
        drafts
            .try_write()
            .unwrap()
            .insert("draft".into(), TaskDraft::default());
        let arbiter = Arc::new(SuggestionArbiter::new(
            backend,
            Arc::clone(&drafts),
            RetryConfig::no_retry(),
        ));
        (arbiter, drafts)
    }

    #[tokio::test]
    async fn tokens_strictly_increase() {
        let backend = GatedBackend::new();
        let (arbiter, _drafts) = arbiter_with(backend.clone());

        let a1 = Arc::clone(&arbiter);
        let h1 = tokio::spawn(async move { a1.request("draft", "one", None).await });
        let a2 = Arc::clone(&arbiter);
        let h2 = tokio::spawn(async move { a2.request("draft", "two", None).await });

        // Let both requests reach the gate, then release them.
        tokio::time::sleep(Duration::from_millis(10)).await;
        backend.gate.notify_waiters();

        let (t1, t2) = (h1.await.unwrap(), h2.await.unwrap());
        assert_ne!(t1, t2);
        assert_eq!(t1.0.max(t2.0), 2);
        assert_eq!(
            arbiter.latest_token("draft").await,
            Some(RequestToken(2))
        );
        // Both calls went to the network — staleness is arbitrated on
        // arrival, not by cancelling the in-flight request.
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn only_latest_response_commits() {
        let backend = GatedBackend::new();
        let (arbiter, drafts) = arbiter_with(backend.clone());

        // Two requests in flight; both responses then arrive together. Only
        // the second one's payload may land in the draft.
        let a1 = Arc::clone(&arbiter);
        let h1 = tokio::spawn(async move { a1.request("draft", "older input", None).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let a2 = Arc::clone(&arbiter);
        let h2 = tokio::spawn(async move { a2.request("draft", "newer input", None).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        backend.gate.notify_waiters();
        h1.await.unwrap();
        h2.await.unwrap();

        let drafts = drafts.read().await;
        let draft = drafts.get("draft").unwrap();
        assert_eq!(draft.ai, AiState::Ready);
        assert_eq!(draft.parse.as_ref().unwrap().title, "newer input");
    }

    #[tokio::test]
    async fn failure_is_recoverable_unavailable() {
        struct FailingBackend;

        #[async_trait]
        impl AiBackend for FailingBackend {
            async fn parse_task(
                &self,
                _input: &str,
                _context: Option<&ParseContext>,
            ) -> Result<ParseResponse, SyncError> {
                Err(SyncError::Transport("ai service down".into()))
            }
            async fn suggest_improvements(
                &self,
                _task_id: crate::model::TaskId,
                _input: Option<&str>,
            ) -> Result<Vec<SuggestionEnvelope>, SyncError> {
                Err(SyncError::Transport("down".into()))
            }
            async fn autocomplete(&self, _input: &str) -> Result<Vec<String>, SyncError> {
                Err(SyncError::Transport("down".into()))
            }
            async fn health(&self) -> Result<AiHealth, SyncError> {
                Err(SyncError::Transport("down".into()))
            }
        }

        let (arbiter, drafts) = arbiter_with(Arc::new(FailingBackend));
        arbiter.request("draft", "some input", None).await;

        let drafts = drafts.read().await;
        let draft = drafts.get("draft").unwrap();
        assert_eq!(draft.ai, AiState::Unavailable);
        assert!(draft.suggestions.is_empty());
        assert!(draft.parse.is_none());
    }

    #[tokio::test]
    async fn clear_invalidates_in_flight_response() {
        let backend = GatedBackend::new();
        let (arbiter, drafts) = arbiter_with(backend.clone());

        let a1 = Arc::clone(&arbiter);
        let h1 = tokio::spawn(async move { a1.request("draft", "typed then deleted", None).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // User deletes the input; the in-flight response must not resurrect.
        arbiter.clear("draft").await;
        backend.gate.notify_waiters();
        h1.await.unwrap();

        let drafts = drafts.read().await;
        let draft = drafts.get("draft").unwrap();
        assert_eq!(draft.ai, AiState::Idle);
        assert!(draft.parse.is_none());
    }

    #[tokio::test]
    async fn different_drafts_are_independent() {
        let backend = GatedBackend::new();
        let (arbiter, drafts) = arbiter_with(backend.clone());
        drafts
            .write()
            .await
            .insert("other".into(), TaskDraft::default());

        let a1 = Arc::clone(&arbiter);
        let h1 = tokio::spawn(async move { a1.request("draft", "for draft", None).await });
        let a2 = Arc::clone(&arbiter);
        let h2 = tokio::spawn(async move { a2.request("other", "for other", None).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        backend.gate.notify_waiters();
        let (t1, t2) = (h1.await.unwrap(), h2.await.unwrap());

        // Each draft has its own token sequence, starting at 1.
        assert_eq!(t1.0, 1);
        assert_eq!(t2.0, 1);

        let drafts = drafts.read().await;
        assert_eq!(drafts.get("draft").unwrap().parse.as_ref().unwrap().title, "for draft");
        assert_eq!(drafts.get("other").unwrap().parse.as_ref().unwrap().title, "for other");
    }
}
