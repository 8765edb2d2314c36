// SPDX-License-Identifier: MIT
//! Bounded, ordered queue of ephemeral user-facing alerts.
//!
//! Most-recent-first: `push` inserts at the front and evicts past the bound,
//! oldest non-pinned entry first. Entries with a positive time-to-live are
//! auto-dismissed by an independent timer each; a zero time-to-live pins the
//! entry until explicitly dismissed (used for confirmation prompts that
//! carry an action).

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::config::AlertConfig;

// ─── Alert ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

/// A single action attached to an alert — a label plus the side-effecting
/// callback the presentation layer invokes on click. The queue never calls
/// it; it only carries it across the boundary.
#[derive(Clone)]
pub struct AlertAction {
    pub label: String,
    pub callback: Arc<dyn Fn() + Send + Sync>,
}

impl AlertAction {
    pub fn new(label: impl Into<String>, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            callback: Arc::new(callback),
        }
    }
}

impl std::fmt::Debug for AlertAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// One ephemeral user-facing outcome.
#[derive(Debug, Clone)]
pub struct Alert {
    pub id: String,
    pub severity: Severity,
    pub message: String,
    pub title: Option<String>,
    pub action: Option<AlertAction>,
    /// Zero means pinned until explicitly dismissed.
    pub ttl: Duration,
    pub created_at: DateTime<Utc>,
}

const DEFAULT_TTL: Duration = Duration::from_secs(5);

impl Alert {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            severity,
            message: message.into(),
            title: None,
            action: None,
            ttl: DEFAULT_TTL,
            created_at: Utc::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Severity::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_action(mut self, action: AlertAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Pin the alert: never auto-dismissed.
    pub fn pinned(mut self) -> Self {
        self.ttl = Duration::ZERO;
        self
    }

    pub fn is_pinned(&self) -> bool {
        self.ttl.is_zero()
    }
}

// ─── Queue ───────────────────────────────────────────────────────────────────

/// The bounded alert queue. Cheaply cloneable; all clones share state.
#[derive(Clone)]
pub struct AlertQueue {
    entries: Arc<RwLock<Vec<Alert>>>,
    config: AlertConfig,
}

impl AlertQueue {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            config,
        }
    }

    /// Insert at the front. Past the bound, the oldest non-pinned entry is
    /// evicted; if every entry is pinned, the oldest overall goes (the bound
    /// is hard). Positive-ttl alerts get their own expiry timer. Returns the
    /// alert id.
    pub async fn push(&self, alert: Alert) -> String {
        let id = alert.id.clone();
        let ttl = alert.ttl;
        {
            let mut entries = self.entries.write().await;
            entries.insert(0, alert);
            if entries.len() > self.config.max_alerts {
                // Scan from the back (oldest) for the first evictable entry.
                let victim = entries
                    .iter()
                    .rposition(|a| !a.is_pinned())
                    .unwrap_or(entries.len() - 1);
                let evicted = entries.remove(victim);
                trace!(id = %evicted.id, "alert evicted past bound");
            }
        }

        if !ttl.is_zero() {
            let queue = self.clone();
            let expire_id = id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                if queue.dismiss(&expire_id).await {
                    trace!(id = %expire_id, "alert expired");
                }
            });
        }

        debug!(id = %id, "alert pushed");
        id
    }

    /// Build and push an alert with the queue's configured default ttl.
    pub async fn notify(&self, severity: Severity, message: impl Into<String>) -> String {
        let ttl = Duration::from_secs(self.config.default_ttl_secs);
        self.push(Alert::new(severity, message).with_ttl(ttl)).await
    }

    /// Remove by id. Returns whether anything was removed.
    pub async fn dismiss(&self, id: &str) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|a| a.id != id);
        entries.len() != before
    }

    /// Mutate an alert in place (message, action, ...) without changing its
    /// position. Returns whether the id was found.
    pub async fn update_alert(&self, id: &str, f: impl FnOnce(&mut Alert)) -> bool {
        let mut entries = self.entries.write().await;
        match entries.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                f(alert);
                true
            }
            None => false,
        }
    }

    /// Current queue contents, most recent first.
    pub async fn snapshot(&self) -> Vec<Alert> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop everything (session reset).
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> AlertQueue {
        AlertQueue::new(AlertConfig::default())
    }

    #[tokio::test]
    async fn push_is_most_recent_first() {
        let q = queue();
        q.push(Alert::info("first").pinned()).await;
        q.push(Alert::info("second").pinned()).await;

        let snap = q.snapshot().await;
        assert_eq!(snap[0].message, "second");
        assert_eq!(snap[1].message, "first");
    }

    #[tokio::test]
    async fn bound_evicts_oldest_unpinned_first() {
        let q = queue();
        let pinned_id = q.push(Alert::info("keep me").pinned()).await;
        for i in 0..5 {
            q.push(Alert::info(format!("ephemeral {i}")).with_ttl(Duration::from_secs(600)))
                .await;
        }

        let snap = q.snapshot().await;
        assert_eq!(snap.len(), 5);
        // The pinned alert was older than every ephemeral one, yet survives:
        // "ephemeral 0" (oldest unpinned) was evicted instead.
        assert!(snap.iter().any(|a| a.id == pinned_id));
        assert!(!snap.iter().any(|a| a.message == "ephemeral 0"));
    }

    #[tokio::test]
    async fn bound_is_hard_even_when_all_pinned() {
        let q = queue();
        for i in 0..7 {
            q.push(Alert::info(format!("pinned {i}")).pinned()).await;
        }
        assert_eq!(q.len().await, 5);
    }

    #[tokio::test]
    async fn dismiss_removes_by_id() {
        let q = queue();
        let id = q.push(Alert::error("boom").pinned()).await;
        assert!(q.dismiss(&id).await);
        assert!(!q.dismiss(&id).await);
        assert!(q.is_empty().await);
    }

    #[tokio::test]
    async fn update_alert_keeps_position() {
        let q = queue();
        let id = q.push(Alert::info("old message").pinned()).await;
        q.push(Alert::info("newer").pinned()).await;

        assert!(q.update_alert(&id, |a| a.message = "new message".into()).await);
        let snap = q.snapshot().await;
        assert_eq!(snap[1].id, id);
        assert_eq!(snap[1].message, "new message");
    }

    #[tokio::test(start_paused = true)]
    async fn positive_ttl_auto_dismisses() {
        let q = queue();
        q.push(Alert::success("done").with_ttl(Duration::from_millis(100)))
            .await;
        let pinned_id = q.push(Alert::info("confirm?").pinned()).await;

        tokio::time::sleep(Duration::from_millis(200)).await;

        let snap = q.snapshot().await;
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].id, pinned_id);
    }

    #[tokio::test]
    async fn action_callback_is_invocable() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();

        let q = queue();
        q.push(
            Alert::warning("unsaved changes")
                .with_action(AlertAction::new("Discard", move || {
                    fired2.store(true, Ordering::SeqCst);
                }))
                .pinned(),
        )
        .await;

        let snap = q.snapshot().await;
        (snap[0].action.as_ref().unwrap().callback)();
        assert!(fired.load(Ordering::SeqCst));
    }
}
