// SPDX-License-Identifier: MIT
//! Optimistic mutation + cache invalidation against an in-memory task store:
//! stale-while-refetch reads, offline rollback across views, narrow
//! invalidation, and the logout teardown.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tasksync::api::{AiBackend, TaskBackend};
use tasksync::cache::{CacheKey, Liveness};
use tasksync::config::SyncConfig;
use tasksync::error::SyncError;
use tasksync::model::{NewTask, TaskId, TaskPatch, TaskPriority, TaskRecord, TaskStatus};
use tasksync::store::SessionEvent;
use tasksync::suggest::{AiHealth, ParseContext, ParseResponse, SuggestionEnvelope};
use tasksync::SyncContext;

fn record(id: i64, title: &str) -> TaskRecord {
    TaskRecord {
        id: TaskId(id),
        title: title.into(),
        description: None,
        status: TaskStatus::Pending,
        priority: TaskPriority::Medium,
        due_date: None,
        created_at: None,
        owner_id: Some(1),
    }
}

/// In-memory task store with an `offline` switch. While offline every call
/// fails with a transport error, like a dead network.
struct MemoryStore {
    tasks: Mutex<BTreeMap<i64, TaskRecord>>,
    offline: AtomicBool,
    update_calls: AtomicU32,
    next_id: AtomicU32,
}

impl MemoryStore {
    fn seeded(records: Vec<TaskRecord>) -> Arc<Self> {
        let tasks = records.into_iter().map(|r| (r.id.0, r)).collect();
        Arc::new(Self {
            tasks: Mutex::new(tasks),
            offline: AtomicBool::new(false),
            update_calls: AtomicU32::new(0),
            next_id: AtomicU32::new(100),
        })
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), SyncError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(SyncError::Transport("network unreachable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TaskBackend for MemoryStore {
    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, SyncError> {
        self.check_online()?;
        Ok(self.tasks.lock().unwrap().values().cloned().collect())
    }

    async fn get_task(&self, id: TaskId) -> Result<TaskRecord, SyncError> {
        self.check_online()?;
        self.tasks
            .lock()
            .unwrap()
            .get(&id.0)
            .cloned()
            .ok_or_else(|| SyncError::Rejected("404: not found".into()))
    }

    async fn create_task(&self, new: &NewTask) -> Result<TaskRecord, SyncError> {
        self.check_online()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64;
        let record = TaskRecord {
            id: TaskId(id),
            title: new.title.clone(),
            description: new.description.clone(),
            status: new.status.unwrap_or_default(),
            priority: new.priority.unwrap_or_default(),
            due_date: new.due_date,
            created_at: None,
            owner_id: Some(1),
        };
        self.tasks.lock().unwrap().insert(id, record.clone());
        Ok(record)
    }

    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<TaskRecord, SyncError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let mut tasks = self.tasks.lock().unwrap();
        let record = tasks
            .get_mut(&id.0)
            .ok_or_else(|| SyncError::Rejected("404: not found".into()))?;
        patch.apply(record);
        Ok(record.clone())
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), SyncError> {
        self.check_online()?;
        self.tasks.lock().unwrap().remove(&id.0);
        Ok(())
    }
}

/// The mutation paths never consult the AI collaborator.
struct NullAi;

#[async_trait]
impl AiBackend for NullAi {
    async fn parse_task(
        &self,
        _input: &str,
        _context: Option<&ParseContext>,
    ) -> Result<ParseResponse, SyncError> {
        Err(SyncError::Transport("unused".into()))
    }
    async fn suggest_improvements(
        &self,
        _task_id: TaskId,
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

fn context(store: Arc<MemoryStore>) -> SyncContext {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let mut config = SyncConfig::default();
    config.retry.delay_ms = 1;
    SyncContext::new(config, store, Arc::new(NullAi))
}

/// Populate both the list and the detail view for task 7.
async fn warm(ctx: &SyncContext) {
    ctx.tasks().await.unwrap();
    ctx.task(TaskId(7)).await.unwrap();
}

#[tokio::test]
async fn offline_update_reverts_both_views_and_alerts() {
    let store = MemoryStore::seeded(vec![record(1, "one"), record(7, "seven")]);
    let ctx = context(store.clone());
    warm(&ctx).await;

    store.set_offline(true);
    let result = ctx
        .update_task(TaskId(7), TaskPatch::default().status(TaskStatus::Completed))
        .await;
    assert!(matches!(result, Err(SyncError::Transport(_))));

    // Mutations default to three attempts before giving up.
    assert_eq!(store.update_calls.load(Ordering::SeqCst), 3);

    // Both views are back to the pre-mutation status.
    let listed = ctx.tasks().await.unwrap();
    assert_eq!(
        listed.iter().find(|r| r.id == TaskId(7)).unwrap().status,
        TaskStatus::Pending
    );
    let detail = ctx.task(TaskId(7)).await.unwrap().unwrap();
    assert_eq!(detail.status, TaskStatus::Pending);

    // And the failure crossed the boundary as an alert.
    let alerts = ctx.alerts().snapshot().await;
    assert!(alerts.iter().any(|a| a.message.contains("Save failed")));
}

#[tokio::test]
async fn committed_update_is_visible_and_invalidation_is_narrow() {
    let store = MemoryStore::seeded(vec![record(7, "seven"), record(9, "nine")]);
    let ctx = context(store.clone());
    warm(&ctx).await;
    ctx.task(TaskId(9)).await.unwrap();

    ctx.update_task(TaskId(7), TaskPatch::default().status(TaskStatus::InProgress))
        .await
        .unwrap();

    {
        let cache = ctx.store.cache.read().await;
        // Task 7 and the list went stale (lists may show derived fields)...
        assert_eq!(
            cache.read(&CacheKey::Task(TaskId(7))).unwrap().liveness,
            Liveness::Stale
        );
        assert_eq!(
            cache.read(&CacheKey::TaskList).unwrap().liveness,
            Liveness::Stale
        );
        // ...but task 9's detail view is untouched by task 7's update.
        assert_eq!(
            cache.read(&CacheKey::Task(TaskId(9))).unwrap().liveness,
            Liveness::Fresh
        );
    }

    // Stale reads still serve the optimistic value immediately.
    let detail = ctx.task(TaskId(7)).await.unwrap().unwrap();
    assert_eq!(detail.status, TaskStatus::InProgress);

    // Give the background refetch a moment; the entry turns fresh again.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let cache = ctx.store.cache.read().await;
    assert_eq!(
        cache.read(&CacheKey::Task(TaskId(7))).unwrap().liveness,
        Liveness::Fresh
    );
}

#[tokio::test]
async fn second_update_to_same_task_is_ordered_after_first() {
    let store = MemoryStore::seeded(vec![record(7, "seven")]);
    let ctx = context(store.clone());
    warm(&ctx).await;

    // Submit two updates back to back; they must both land, in order, with
    // the second one's value winning.
    let ctx1 = ctx.clone();
    let first = tokio::spawn(async move {
        ctx1.update_task(TaskId(7), TaskPatch::default().status(TaskStatus::InProgress))
            .await
    });
    tokio::time::sleep(Duration::from_millis(5)).await;
    let ctx2 = ctx.clone();
    let second = tokio::spawn(async move {
        ctx2.update_task(TaskId(7), TaskPatch::default().status(TaskStatus::Completed))
            .await
    });

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let server_copy = store.tasks.lock().unwrap().get(&7).cloned().unwrap();
    assert_eq!(server_copy.status, TaskStatus::Completed);
    assert_eq!(ctx.mutations.pending_count().await, 0);
}

#[tokio::test]
async fn delete_and_create_round_trip() {
    let store = MemoryStore::seeded(vec![record(1, "one"), record(7, "seven")]);
    let ctx = context(store.clone());
    warm(&ctx).await;

    ctx.delete_task(TaskId(7)).await.unwrap();
    assert!(store.tasks.lock().unwrap().get(&7).is_none());

    let created = ctx
        .create_task(NewTask {
            title: "replacement".into(),
            ..NewTask::default()
        })
        .await
        .unwrap();
    assert_eq!(created.id, TaskId(100));

    // Creation invalidated the list: the next read serves the last-known
    // snapshot and kicks off the background refetch, which brings the new
    // task into view.
    ctx.tasks().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let listed = ctx.tasks().await.unwrap();
    assert!(listed.iter().any(|r| r.id == TaskId(100)));
    assert!(!listed.iter().any(|r| r.id == TaskId(7)));
}

#[tokio::test]
async fn logout_clears_every_cache_entry() -> anyhow::Result<()> {
    let store = MemoryStore::seeded(vec![record(1, "one"), record(7, "seven")]);
    let ctx = context(store.clone());
    warm(&ctx).await;
    assert_eq!(ctx.store.cache.read().await.len(), 2);

    ctx.handle_session_event(SessionEvent::LoggedOut).await;
    assert!(ctx.store.cache.read().await.is_empty());

    // Next session's first fetch repopulates from scratch — no stale data.
    store.tasks.lock().unwrap().get_mut(&7).unwrap().title = "renamed while away".into();
    ctx.handle_session_event(SessionEvent::LoggedIn).await;
    let listed = ctx.tasks().await?;
    assert_eq!(
        listed.iter().find(|r| r.id == TaskId(7)).unwrap().title,
        "renamed while away"
    );
    Ok(())
}

#[tokio::test]
async fn stale_list_read_serves_last_known_value_immediately() {
    let store = MemoryStore::seeded(vec![record(7, "seven")]);
    let ctx = context(store.clone());
    warm(&ctx).await;

    ctx.update_task(TaskId(7), TaskPatch::default().title("renamed"))
        .await
        .unwrap();

    // The server is now offline; the stale entry still answers reads with
    // the last-known (optimistic, committed) value and the failed refetch
    // changes nothing.
    store.set_offline(true);
    let listed = ctx.tasks().await.unwrap();
    assert_eq!(listed[0].title, "renamed");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let listed = ctx.tasks().await.unwrap();
    assert_eq!(listed[0].title, "renamed");
}
