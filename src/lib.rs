// SPDX-License-Identifier: MIT
//! tasksync — client-side state synchronization for TaskMind.
//!
//! Reconciles user-entered task data, AI-derived suggestions, and the remote
//! authoritative store while keeping the list and detail views consistent
//! under concurrent, latency-bearing network operations. Rendering, routing
//! and credential storage live elsewhere; this crate owns the ordering and
//! consistency hazards: debounced suggestion requests, stale-response
//! arbitration, optimistic mutations with rollback, tag-based cache
//! invalidation, and the bounded alert queue that surfaces outcomes.

pub mod alerts;
pub mod api;
pub mod cache;
pub mod config;
pub mod dates;
pub mod debounce;
pub mod error;
pub mod model;
pub mod mutation;
pub mod retry;
pub mod store;
pub mod suggest;

pub use error::SyncError;
pub use store::SessionEvent;

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use alerts::AlertQueue;
use api::autocomplete::Autocompleter;
use api::{AiBackend, ApiClient, CredentialProvider, TaskBackend};
use cache::{CacheKey, CachedValue};
use config::SyncConfig;
use model::{NewTask, TaskDraft, TaskId, TaskPatch, TaskRecord};
use mutation::{MutationHandle, MutationManager};
use retry::{retry_transport, RetryConfig};
use store::SyncStore;
use suggest::arbiter::SuggestionArbiter;
use suggest::{resolver, SuggestionEnvelope, SuggestionPipeline};

/// Shared application context wiring every component to one [`SyncStore`].
///
/// Cheaply cloneable; clones share all state. Construct once per session
/// with [`SyncContext::new`] (injected backends, used by tests) or
/// [`SyncContext::with_api`] (real HTTP client).
#[derive(Clone)]
pub struct SyncContext {
    pub config: Arc<SyncConfig>,
    pub store: SyncStore,
    pub mutations: Arc<MutationManager>,
    pub arbiter: Arc<SuggestionArbiter>,
    pub pipeline: SuggestionPipeline,
    pub autocomplete: Arc<Autocompleter>,
    task_backend: Arc<dyn TaskBackend>,
    ai_backend: Arc<dyn AiBackend>,
    /// Cache keys with a background refetch already in flight, so a burst of
    /// reads against one stale entry spawns a single fetch.
    refetching: Arc<Mutex<HashSet<CacheKey>>>,
}

impl SyncContext {
    /// Wire the context from explicit backends.
    pub fn new(
        config: SyncConfig,
        task_backend: Arc<dyn TaskBackend>,
        ai_backend: Arc<dyn AiBackend>,
    ) -> Self {
        let config = Arc::new(config);
        let store = SyncStore::new(config.alerts.clone());

        let fetch_retry = RetryConfig {
            max_attempts: config.retry.fetch_attempts,
            delay: config.retry_delay(),
        };
        let mutation_retry = RetryConfig {
            max_attempts: config.retry.mutation_attempts,
            delay: config.retry_delay(),
        };

        let mutations = Arc::new(MutationManager::new(
            Arc::clone(&task_backend),
            Arc::clone(&store.cache),
            store.alerts.clone(),
            mutation_retry,
        ));
        let arbiter = Arc::new(SuggestionArbiter::new(
            Arc::clone(&ai_backend),
            Arc::clone(&store.drafts),
            fetch_retry.clone(),
        ));
        let pipeline = SuggestionPipeline::new(
            Arc::clone(&arbiter),
            config.debounce_delay(),
            config.suggest.min_input_len,
        );
        let autocomplete = Arc::new(Autocompleter::new(
            Arc::clone(&ai_backend),
            config.autocomplete_ttl(),
            config.suggest.min_input_len,
        ));

        Self {
            config,
            store,
            mutations,
            arbiter,
            pipeline,
            autocomplete,
            task_backend,
            ai_backend,
            refetching: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Wire the context against the real HTTP API.
    pub fn with_api(
        config: SyncConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, SyncError> {
        let client = Arc::new(ApiClient::new(&config, credentials)?);
        Ok(Self::new(
            config,
            Arc::clone(&client) as Arc<dyn TaskBackend>,
            client as Arc<dyn AiBackend>,
        ))
    }

    fn fetch_retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.config.retry.fetch_attempts,
            delay: self.config.retry_delay(),
        }
    }

    // ─── Reads ───────────────────────────────────────────────────────────────

    /// The task list: last-known snapshot immediately, with a background
    /// refetch when the entry is stale. A cold cache fetches in the
    /// foreground (there is nothing to serve meanwhile).
    pub async fn tasks(&self) -> Result<Vec<TaskRecord>, SyncError> {
        let cached = {
            let cache = self.store.cache.read().await;
            cache.read(&CacheKey::TaskList).map(|entry| {
                let records = match &entry.value {
                    CachedValue::List(records) => records.clone(),
                    _ => Vec::new(),
                };
                (records, entry.is_stale(), entry.version)
            })
        };

        match cached {
            Some((records, stale, observed)) => {
                if stale {
                    self.spawn_refetch(CacheKey::TaskList, observed).await;
                }
                Ok(records)
            }
            None => {
                let records =
                    retry_transport(&self.fetch_retry(), || self.task_backend.list_tasks()).await?;
                self.store.cache.write().await.apply_fetch(
                    CacheKey::TaskList,
                    CachedValue::List(records.clone()),
                    0,
                );
                Ok(records)
            }
        }
    }

    /// A single task view, same stale-while-refetch discipline as
    /// [`tasks`](Self::tasks).
    pub async fn task(&self, id: TaskId) -> Result<Option<TaskRecord>, SyncError> {
        let key = CacheKey::Task(id);
        let cached = {
            let cache = self.store.cache.read().await;
            cache.read(&key).map(|entry| {
                let record = match &entry.value {
                    CachedValue::Entity(record) => Some(record.clone()),
                    _ => None,
                };
                (record, entry.is_stale(), entry.version)
            })
        };

        match cached {
            Some((record, stale, observed)) => {
                if stale {
                    self.spawn_refetch(key, observed).await;
                }
                Ok(record)
            }
            None => {
                let record =
                    retry_transport(&self.fetch_retry(), || self.task_backend.get_task(id)).await?;
                self.store.cache.write().await.apply_fetch(
                    key,
                    CachedValue::Entity(record.clone()),
                    0,
                );
                Ok(Some(record))
            }
        }
    }

    async fn spawn_refetch(&self, key: CacheKey, observed: u64) {
        {
            let mut in_flight = self.refetching.lock().await;
            if !in_flight.insert(key) {
                return;
            }
        }
        debug!(?key, observed, "background refetch");

        let ctx = self.clone();
        tokio::spawn(async move {
            let result = match key {
                CacheKey::TaskList => {
                    retry_transport(&ctx.fetch_retry(), || ctx.task_backend.list_tasks())
                        .await
                        .map(CachedValue::List)
                }
                CacheKey::Task(id) => {
                    retry_transport(&ctx.fetch_retry(), || ctx.task_backend.get_task(id))
                        .await
                        .map(CachedValue::Entity)
                }
            };
            match result {
                Ok(value) => {
                    // Guarded install: dropped if the entry moved past the
                    // version this refetch was issued against.
                    ctx.store.cache.write().await.apply_fetch(key, value, observed);
                }
                Err(e) => {
                    // The stale snapshot keeps serving; nothing to roll back.
                    warn!(?key, err = %e, "background refetch failed");
                }
            }
            ctx.refetching.lock().await.remove(&key);
        });
    }

    // ─── Mutations ───────────────────────────────────────────────────────────

    pub async fn create_task(&self, new: NewTask) -> Result<TaskRecord, SyncError> {
        self.mutations.create(new).await
    }

    pub async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<MutationHandle, SyncError> {
        self.mutations.update(id, patch).await
    }

    pub async fn delete_task(&self, id: TaskId) -> Result<MutationHandle, SyncError> {
        self.mutations.delete(id).await
    }

    // ─── Drafts & suggestions ────────────────────────────────────────────────

    pub async fn open_draft(&self, key: &str) {
        self.store.open_draft(key).await;
    }

    pub async fn cancel_draft(&self, key: &str) {
        self.pipeline.reset_key(key).await;
        self.store.close_draft(key).await;
    }

    pub async fn draft(&self, key: &str) -> Option<TaskDraft> {
        self.store.draft(key).await
    }

    /// Forward keystrokes into the debounced suggestion pipeline.
    pub async fn draft_input(&self, key: &str, input: &str) {
        self.pipeline.input_changed(key, input).await;
    }

    /// Merge an open suggestion into its draft. Returns `false` when the
    /// draft or the suggestion no longer exists.
    pub async fn accept_suggestion(&self, draft_key: &str, suggestion_id: &str) -> bool {
        let now = chrono::Utc::now();
        let alert = {
            let mut drafts = self.store.drafts.write().await;
            let Some(draft) = drafts.get_mut(draft_key) else {
                return false;
            };
            let Some(position) = draft
                .suggestions
                .iter()
                .position(|s| s.id == suggestion_id)
            else {
                return false;
            };
            let suggestion = draft.suggestions[position].clone();
            let (mut next, alert) = resolver::apply(draft, &suggestion, now);
            next.suggestions.remove(position);
            *draft = next;
            alert
        };
        self.store.alerts.push(alert).await;
        true
    }

    /// Dismiss an open suggestion without applying it.
    pub async fn dismiss_suggestion(&self, draft_key: &str, suggestion_id: &str) -> bool {
        let mut drafts = self.store.drafts.write().await;
        match drafts.get_mut(draft_key) {
            Some(draft) => {
                let before = draft.suggestions.len();
                draft.suggestions.retain(|s| s.id != suggestion_id);
                draft.suggestions.len() != before
            }
            None => false,
        }
    }

    /// Submit a draft as a new task. The draft is discarded on success.
    ///
    /// Fields the user never touched fall back to the accepted parse result
    /// (the AI's structured reading of the raw input), then to the raw input
    /// itself for the title.
    pub async fn submit_draft(&self, draft_key: &str) -> Result<TaskRecord, SyncError> {
        let draft = self
            .store
            .draft(draft_key)
            .await
            .ok_or_else(|| SyncError::Validation(format!("no open draft {draft_key:?}")))?;

        let parse = draft.parse.as_ref();
        let title = [
            draft.title.trim(),
            parse.map(|p| p.title.trim()).unwrap_or_default(),
            draft.raw_input.trim(),
        ]
        .into_iter()
        .find(|t| !t.is_empty())
        .unwrap_or_default()
        .to_string();
        let description = draft
            .description
            .clone()
            .or_else(|| parse.and_then(|p| p.description.clone()));
        let due_date = draft
            .due_date
            .or_else(|| parse.and_then(|p| p.resolved_due_date(chrono::Utc::now())));

        let record = self
            .mutations
            .create(NewTask {
                title,
                description,
                status: None,
                priority: Some(draft.priority),
                due_date,
            })
            .await?;
        self.cancel_draft(draft_key).await;
        Ok(record)
    }

    /// Improvement suggestions for an existing task (`/ai/suggest-improvements`).
    pub async fn improvements(
        &self,
        id: TaskId,
        input: Option<&str>,
    ) -> Result<Vec<SuggestionEnvelope>, SyncError> {
        retry_transport(&self.fetch_retry(), || {
            self.ai_backend.suggest_improvements(id, input)
        })
        .await
    }

    /// Pre-flight the AI collaborator (`/ai/health`). A transport failure
    /// here is a cheap early signal for the Unavailable draft state.
    pub async fn ai_health(&self) -> Result<suggest::AiHealth, SyncError> {
        self.ai_backend.health().await
    }

    // ─── Session lifecycle ───────────────────────────────────────────────────

    /// React to an authentication transition. Logout is the one
    /// unconditional teardown: every cache entry, draft, alert, token
    /// counter and timer goes, so no stale data survives into the next
    /// principal's session.
    pub async fn handle_session_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::LoggedIn => {
                info!("session started — cache will repopulate on first read");
            }
            SessionEvent::LoggedOut => {
                self.pipeline.reset().await;
                self.arbiter.reset().await;
                self.mutations.reset().await;
                self.autocomplete.clear().await;
                self.store.reset().await;
                self.refetching.lock().await.clear();
            }
        }
    }

    /// Convenience handle to the alert queue.
    pub fn alerts(&self) -> &AlertQueue {
        &self.store.alerts
    }
}
