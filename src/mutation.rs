// SPDX-License-Identifier: MIT
//! Optimistic mutation manager.
//!
//! A mutation applies locally before the server confirms: capture the
//! inverse patch from the cached snapshot, patch every cache entry that
//! contains the entity (detail view and list views alike), then issue the
//! remote call. Success adopts the server record and refreshes versions;
//! failure replays the inverse so the cache is bit-for-bit back where it
//! started, and a "save failed" alert crosses the boundary — never a raw
//! transport error.
//!
//! Mutations to one entity are strictly serialized: a second edit queues
//! behind the first's resolution (fair per-entity async lock), so effects
//! commit in submission order and forward/inverse pairs never interleave.
//! Deletion is the same dance with removal/reinsertion instead of patches.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::alerts::{AlertQueue, Severity};
use crate::api::TaskBackend;
use crate::cache::{CacheKey, CacheTable, CachedValue, Tag};
use crate::error::SyncError;
use crate::model::{NewTask, TaskId, TaskPatch, TaskRecord};
use crate::retry::{retry_transport, RetryConfig};

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Update,
    Delete,
}

/// An in-flight local edit, tracked from optimistic apply to resolution.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub entity: TaskId,
    pub kind: MutationKind,
    pub forward: TaskPatch,
    /// Field values captured at apply time; replaying this undoes `forward`.
    pub inverse: TaskPatch,
    pub state: MutationState,
}

/// Outcome of a resolved mutation.
#[derive(Debug, Clone)]
pub struct MutationHandle {
    pub entity: TaskId,
    pub state: MutationState,
    /// Server-confirmed record on commit (absent for deletions).
    pub record: Option<TaskRecord>,
}

// ─── Manager ─────────────────────────────────────────────────────────────────

pub struct MutationManager {
    backend: Arc<dyn TaskBackend>,
    cache: Arc<RwLock<CacheTable>>,
    alerts: AlertQueue,
    retry: RetryConfig,
    /// Per-entity serialization. tokio's Mutex queues waiters fairly, which
    /// is exactly the submission-order guarantee.
    locks: Mutex<HashMap<TaskId, Arc<Mutex<()>>>>,
    /// Outstanding mutations, at most one per entity id.
    pending: RwLock<HashMap<TaskId, PendingMutation>>,
}

impl MutationManager {
    pub fn new(
        backend: Arc<dyn TaskBackend>,
        cache: Arc<RwLock<CacheTable>>,
        alerts: AlertQueue,
        retry: RetryConfig,
    ) -> Self {
        Self {
            backend,
            cache,
            alerts,
            retry,
            locks: Mutex::new(HashMap::new()),
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Create a task. Not optimistic — the id is server-minted, so there is
    /// no cache row to patch; the list tag is invalidated on success.
    pub async fn create(&self, new: NewTask) -> Result<TaskRecord, SyncError> {
        if new.title.trim().is_empty() {
            return Err(SyncError::Validation("title must not be empty".into()));
        }

        let result = retry_transport(&self.retry, || self.backend.create_task(&new)).await;
        match result {
            Ok(record) => {
                info!(id = %record.id, "task created");
                {
                    let mut cache = self.cache.write().await;
                    let observed = cache.version_of(&CacheKey::Task(record.id));
                    cache.apply_fetch(
                        CacheKey::Task(record.id),
                        CachedValue::Entity(record.clone()),
                        observed,
                    );
                    cache.invalidate(&[Tag::TaskList]);
                }
                self.alerts.notify(Severity::Success, "Task created").await;
                Ok(record)
            }
            Err(e) => {
                warn!(err = %e, "task creation failed");
                self.alerts
                    .notify(Severity::Error, "Could not create the task")
                    .await;
                Err(e)
            }
        }
    }

    /// Optimistically update a task.
    ///
    /// The patch is visible in every cached view before the network call
    /// returns. On remote failure the inverse restores each touched entry
    /// and the returned error mirrors the "save failed" alert.
    pub async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<MutationHandle, SyncError> {
        if patch.is_empty() {
            return Err(SyncError::Validation("empty patch".into()));
        }
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(SyncError::Validation("title must not be empty".into()));
            }
        }

        let lock = self.entity_lock(id).await;
        let _guard = lock.lock().await;

        // Capture the inverse and apply the forward patch in one cache
        // critical section, so no reader ever sees a half-applied edit.
        let inverse = {
            let mut cache = self.cache.write().await;
            match cache.snapshot_of(id) {
                Some(snapshot) => {
                    let inverse = patch.inverse_of(&snapshot);
                    let touched = cache.patch_entity(id, &patch);
                    debug!(%id, entries = touched.len(), "optimistic patch applied");
                    Some(inverse)
                }
                None => None,
            }
        };
        if let Some(inverse) = &inverse {
            self.pending.write().await.insert(
                id,
                PendingMutation {
                    entity: id,
                    kind: MutationKind::Update,
                    forward: patch.clone(),
                    inverse: inverse.clone(),
                    state: MutationState::Pending,
                },
            );
        }

        let result = retry_transport(&self.retry, || self.backend.update_task(id, &patch)).await;
        self.pending.write().await.remove(&id);

        match result {
            Ok(record) => {
                info!(%id, "mutation committed");
                let mut cache = self.cache.write().await;
                cache.absorb_record(&record);
                // Narrow invalidation: this entity plus the collection
                // (lists may show derived fields) — never the whole world.
                cache.invalidate(&[Tag::Task(id), Tag::TaskList]);
                drop(cache);
                self.alerts.notify(Severity::Success, "Task saved").await;
                Ok(MutationHandle {
                    entity: id,
                    state: MutationState::Committed,
                    record: Some(record),
                })
            }
            Err(e) => {
                warn!(%id, err = %e, "mutation failed — rolling back");
                if let Some(inverse) = inverse {
                    self.cache.write().await.patch_entity(id, &inverse);
                }
                self.alerts
                    .notify(Severity::Error, "Save failed — your change was reverted")
                    .await;
                Err(e)
            }
        }
    }

    /// Optimistically delete a task: removed from every view immediately,
    /// fully reinserted at the original position if the server says no.
    pub async fn delete(&self, id: TaskId) -> Result<MutationHandle, SyncError> {
        let lock = self.entity_lock(id).await;
        let _guard = lock.lock().await;

        let removal = self.cache.write().await.remove_entity(id);
        debug!(%id, noop = removal.is_noop(), "optimistic removal applied");
        self.pending.write().await.insert(
            id,
            PendingMutation {
                entity: id,
                kind: MutationKind::Delete,
                forward: TaskPatch::default(),
                inverse: TaskPatch::default(),
                state: MutationState::Pending,
            },
        );

        let result = retry_transport(&self.retry, || self.backend.delete_task(id)).await;
        self.pending.write().await.remove(&id);

        match result {
            Ok(()) => {
                info!(%id, "deletion committed");
                self.cache.write().await.invalidate(&[Tag::TaskList]);
                self.alerts.notify(Severity::Success, "Task deleted").await;
                Ok(MutationHandle {
                    entity: id,
                    state: MutationState::Committed,
                    record: None,
                })
            }
            Err(e) => {
                warn!(%id, err = %e, "deletion failed — restoring");
                self.cache.write().await.restore_removal(removal);
                self.alerts
                    .notify(Severity::Error, "Delete failed — the task was restored")
                    .await;
                Err(e)
            }
        }
    }

    /// Whether an entity currently has an outstanding mutation.
    pub async fn is_pending(&self, id: TaskId) -> bool {
        self.pending.read().await.contains_key(&id)
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Session reset: drop bookkeeping. In-flight calls resolve against an
    /// empty cache, where both commit and rollback are no-ops.
    pub async fn reset(&self) {
        self.pending.write().await.clear();
        self.locks.lock().await.clear();
    }

    async fn entity_lock(&self, id: TaskId) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
