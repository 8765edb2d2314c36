// SPDX-License-Identifier: MIT
//! Process-wide state container.
//!
//! One [`SyncStore`] holds everything the invariants range over: the cache
//! table, the open drafts, and the alert queue. Components share it rather
//! than holding private copies, so "at most one pending mutation per id" and
//! "versions only increase" stay checkable in one place.
//!
//! Lifecycle: `init` at session start is just construction; [`reset`] on
//! logout unconditionally clears every cache entry, draft, and alert so the
//! next principal can never observe the previous one's data.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::alerts::AlertQueue;
use crate::cache::CacheTable;
use crate::config::AlertConfig;
use crate::model::TaskDraft;
use crate::suggest::arbiter::SharedDrafts;

/// Authentication transitions delivered by the external session collaborator.
/// This layer never sees the credential itself — only the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    LoggedOut,
}

/// Shared mutable state: cache, drafts, alerts. Cheaply cloneable.
#[derive(Clone)]
pub struct SyncStore {
    pub cache: Arc<RwLock<CacheTable>>,
    pub drafts: SharedDrafts,
    pub alerts: AlertQueue,
}

impl SyncStore {
    pub fn new(alert_config: AlertConfig) -> Self {
        Self {
            cache: Arc::new(RwLock::new(CacheTable::new())),
            drafts: Arc::new(RwLock::new(HashMap::new())),
            alerts: AlertQueue::new(alert_config),
        }
    }

    /// Open a fresh draft for a task form. An existing draft under the same
    /// key is replaced — the form was reopened.
    pub async fn open_draft(&self, key: &str) {
        self.drafts
            .write()
            .await
            .insert(key.to_string(), TaskDraft::default());
    }

    /// Snapshot of a draft, if the form is still open.
    pub async fn draft(&self, key: &str) -> Option<TaskDraft> {
        self.drafts.read().await.get(key).cloned()
    }

    /// Discard a draft (submit or cancel). Any in-flight suggestion response
    /// for it finds nothing to write to and evaporates.
    pub async fn close_draft(&self, key: &str) {
        self.drafts.write().await.remove(key);
    }

    pub async fn open_draft_count(&self) -> usize {
        self.drafts.read().await.len()
    }

    /// Session-boundary teardown: everything goes, unconditionally.
    pub async fn reset(&self) {
        self.cache.write().await.clear();
        self.drafts.write().await.clear();
        self.alerts.clear().await;
        info!("store reset — cache, drafts and alerts cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Alert;
    use crate::cache::{CacheKey, CachedValue};
    use crate::model::{TaskId, TaskRecord};

    fn record(id: i64) -> TaskRecord {
        TaskRecord {
            id: TaskId(id),
            title: format!("task {id}"),
            description: None,
            status: Default::default(),
            priority: Default::default(),
            due_date: None,
            created_at: None,
            owner_id: None,
        }
    }

    #[tokio::test]
    async fn draft_lifecycle() {
        let store = SyncStore::new(AlertConfig::default());
        store.open_draft("new-task").await;
        assert!(store.draft("new-task").await.is_some());

        store.close_draft("new-task").await;
        assert!(store.draft("new-task").await.is_none());
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let store = SyncStore::new(AlertConfig::default());
        {
            let mut cache = store.cache.write().await;
            cache.apply_fetch(CacheKey::TaskList, CachedValue::List(vec![record(1)]), 0);
            cache.apply_fetch(CacheKey::Task(TaskId(1)), CachedValue::Entity(record(1)), 0);
        }
        store.open_draft("d").await;
        store.alerts.push(Alert::info("hello").pinned()).await;

        store.reset().await;

        assert!(store.cache.read().await.is_empty());
        assert_eq!(store.open_draft_count().await, 0);
        assert!(store.alerts.is_empty().await);
    }
}
