// SPDX-License-Identifier: MIT
//! Core task data model: the cached projection of server-side task records,
//! the patch type used by optimistic mutations, and the transient draft held
//! while a task form is open.
//!
//! Wire note: the task endpoints speak snake_case (`due_date`, `created_at`)
//! while the AI endpoints speak camelCase — aliases below accept both so a
//! record round-trips regardless of which surface produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::suggest::{AiState, ParseResult, SuggestionEnvelope};

// ─── Identity ────────────────────────────────────────────────────────────────

/// Opaque server-minted task identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── Enums ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::Low => write!(f, "low"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::High => write!(f, "high"),
        }
    }
}

impl TaskPriority {
    /// Best-effort parse from free text ("high", "urgent", ...).
    ///
    /// Returns `None` when the text names no recognizable level; callers
    /// decide the default (the merge resolver uses `Medium`).
    pub fn from_text(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        if ["high", "urgent", "critical", "asap", "immediately"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            Some(TaskPriority::High)
        } else if lower.contains("low") || lower.contains("someday") || lower.contains("eventually")
        {
            Some(TaskPriority::Low)
        } else if lower.contains("medium") || lower.contains("normal") || lower.contains("moderate")
        {
            Some(TaskPriority::Medium)
        } else {
            None
        }
    }
}

// ─── TaskRecord ──────────────────────────────────────────────────────────────

/// Client-side cached projection of a server task.
///
/// The canonical copy lives server-side; everything here is a snapshot that
/// the cache layer versions and the mutation manager patches optimistically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default, alias = "dueDate")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    /// Owner reference. The list endpoint omits it (ownership is implied by
    /// the bearer credential), so it is optional on the wire.
    #[serde(default, alias = "userId", alias = "user_id")]
    pub owner_id: Option<i64>,
}

// ─── TaskPatch ───────────────────────────────────────────────────────────────

/// A partial edit to a task — the unit both the `PUT /tasks/{id}` body and
/// the optimistic forward/inverse pair are expressed in.
///
/// Double-`Option` fields distinguish "leave unchanged" (`None`) from
/// "set to null" (`Some(None)`), which the server update handler honors for
/// `due_date` and `description`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
    }

    /// Apply this patch to a record in place.
    pub fn apply(&self, task: &mut TaskRecord) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
    }

    /// Capture the inverse of this patch against the current snapshot:
    /// for every field this patch touches, record the value it had before.
    ///
    /// Law: applying the inverse after the forward restores the snapshot
    /// bit-for-bit.
    pub fn inverse_of(&self, snapshot: &TaskRecord) -> TaskPatch {
        TaskPatch {
            title: self.title.as_ref().map(|_| snapshot.title.clone()),
            description: self
                .description
                .as_ref()
                .map(|_| snapshot.description.clone()),
            status: self.status.map(|_| snapshot.status),
            priority: self.priority.map(|_| snapshot.priority),
            due_date: self.due_date.map(|_| snapshot.due_date),
        }
    }

    // Builder-style helpers keep call sites terse.

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    pub fn due_date(mut self, due_date: Option<DateTime<Utc>>) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

// ─── NewTask ─────────────────────────────────────────────────────────────────

/// Body of `POST /tasks/`. Only `title` is required by the server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

// ─── TaskDraft ───────────────────────────────────────────────────────────────

/// Transient form state while a task is being created or edited.
///
/// Never persisted. Created when the form opens, discarded on submit or
/// cancel. The suggestion pipeline writes `parse`, `suggestions`, and `ai`;
/// the merge resolver edits the structured fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskDraft {
    /// Last raw free-text input the user typed.
    pub raw_input: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub category: Option<String>,
    /// Most recent accepted parse result (latest token only).
    pub parse: Option<ParseResult>,
    /// Open suggestions awaiting user accept/dismiss.
    pub suggestions: Vec<SuggestionEnvelope>,
    pub ai: AiState,
}

impl TaskDraft {
    /// Drop all AI-derived state, keeping the user's own fields intact.
    pub fn clear_suggestions(&mut self) {
        self.parse = None;
        self.suggestions.clear();
        self.ai = AiState::Idle;
    }
}
