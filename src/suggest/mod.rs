// SPDX-License-Identifier: MIT
//! AI suggestion plumbing: wire types for the parse/suggest contract, the
//! debounced input pipeline, and the per-draft request arbiter.
//!
//! Flow: keystrokes → [`SuggestionPipeline::input_changed`] → debounce →
//! [`arbiter::SuggestionArbiter::request`] → network → latest-token check →
//! draft state. Accepted suggestions are merged by [`resolver::apply`].

pub mod arbiter;
pub mod resolver;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::dates;
use crate::debounce::DebounceScheduler;
use crate::model::TaskPriority;

use arbiter::SuggestionArbiter;

// ─── Draft AI state ──────────────────────────────────────────────────────────

/// Where the draft's AI assistance currently stands. `Unavailable` is
/// recoverable — manual entry keeps working and the next input retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AiState {
    #[default]
    Idle,
    Loading,
    Ready,
    Unavailable,
}

// ─── Request tokens ──────────────────────────────────────────────────────────

/// Sequence number minted per outbound suggestion request; strictly
/// increasing per draft. Only the response bearing the highest token ever
/// issued for a draft may commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestToken(pub u64);

// ─── Wire types ──────────────────────────────────────────────────────────────

/// A due date as the AI collaborator actually sends it: sometimes a proper
/// timestamp, sometimes loose English ("next friday").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DueDateHint {
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl DueDateHint {
    /// Resolve to a concrete timestamp relative to `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            DueDateHint::Timestamp(ts) => Some(*ts),
            DueDateHint::Text(text) => dates::parse_natural(text, now),
        }
    }
}

/// Structured interpretation of free-text input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub due_date: Option<DueDateHint>,
    #[serde(default)]
    pub estimated_duration_minutes: Option<u32>,
    /// Parser confidence in [0, 1].
    #[serde(default)]
    pub confidence: f64,
}

impl ParseResult {
    pub fn resolved_due_date(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.due_date.as_ref().and_then(|hint| hint.resolve(now))
    }
}

/// Closed set of suggestion kinds. `Unknown` absorbs any wire string we have
/// never seen, so a newer server never crashes an older client — those
/// degrade to advisory-only handling in the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Priority,
    DueDate,
    Description,
    DescriptionImprove,
    Category,
    Breakdown,
    Reminder,
    Delegation,
    #[serde(other)]
    Unknown,
}

impl SuggestionKind {
    /// Structural kinds mutate draft fields; advisory kinds only inform.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SuggestionKind::Priority
                | SuggestionKind::DueDate
                | SuggestionKind::Description
                | SuggestionKind::DescriptionImprove
                | SuggestionKind::Category
                | SuggestionKind::Breakdown
        )
    }
}

/// One AI-derived recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    /// Which engine produced it ("openai", "nlp_rules", ...). Informational.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(rename = "suggestion")]
    pub text: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Response of `POST /ai/parse-task`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResponse {
    pub parsed_task: ParseResult,
    #[serde(default)]
    pub suggestions: Vec<SuggestionEnvelope>,
    #[serde(default)]
    pub alternatives: Vec<ParseResult>,
}

/// Optional context sent with a parse request.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_tasks: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_preferences: Option<Value>,
}

/// Response of `GET /ai/health`.
#[derive(Debug, Clone, Deserialize)]
pub struct AiHealth {
    pub status: String,
    #[serde(default)]
    pub features: Vec<String>,
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// Debounced front end of the suggestion flow.
///
/// Keystrokes come in here; at most one parse request leaves per quiet
/// period per draft. Inputs below the minimum length short-circuit: the
/// pending timer is cancelled and the draft's suggestion state cleared
/// immediately, without waiting out the quiet period.
#[derive(Clone)]
pub struct SuggestionPipeline {
    scheduler: DebounceScheduler,
    arbiter: Arc<SuggestionArbiter>,
    quiet_period: std::time::Duration,
    min_input_len: usize,
}

impl SuggestionPipeline {
    pub fn new(
        arbiter: Arc<SuggestionArbiter>,
        quiet_period: std::time::Duration,
        min_input_len: usize,
    ) -> Self {
        Self {
            scheduler: DebounceScheduler::new(),
            arbiter,
            quiet_period,
            min_input_len,
        }
    }

    /// Record fresh input for a draft and (re-)arm its suggestion timer.
    ///
    /// A zero quiet period means suggestions are disabled outright, and is
    /// treated like too-short input: skip firing, clear state now.
    pub async fn input_changed(&self, draft_key: &str, input: &str) {
        self.arbiter
            .with_draft(draft_key, |d| d.raw_input = input.to_string())
            .await;

        let trimmed = input.trim();
        if self.quiet_period.is_zero() || trimmed.chars().count() < self.min_input_len {
            debug!(draft = draft_key, "suggestion request skipped — clearing state");
            self.scheduler.cancel(draft_key).await;
            self.arbiter.clear(draft_key).await;
            return;
        }

        let arbiter = Arc::clone(&self.arbiter);
        let key = draft_key.to_string();
        let text = trimmed.to_string();
        self.scheduler
            .schedule(draft_key, self.quiet_period, move || async move {
                arbiter.request(&key, &text, None).await;
            })
            .await;
    }

    /// Drop the pending timer for one draft (form closed).
    pub async fn reset_key(&self, draft_key: &str) {
        self.scheduler.cancel(draft_key).await;
    }

    /// Session reset: drop all pending timers.
    pub async fn reset(&self) {
        self.scheduler.clear().await;
    }
}
