// SPDX-License-Identifier: MIT
//! Suggestion merge resolver.
//!
//! A pure, type-dispatched rule table: one merge rule per suggestion kind,
//! turning an accepted [`SuggestionEnvelope`] into a concrete edit of the
//! in-progress [`TaskDraft`]. Advisory kinds (reminder, delegation, anything
//! unrecognized) never mutate structured fields — they surface as an info
//! alert and leave the draft untouched.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::alerts::Alert;
use crate::dates;
use crate::model::{TaskDraft, TaskPriority};

use super::{SuggestionEnvelope, SuggestionKind};

/// Descriptions at or below this length are treated as "effectively empty"
/// and appended to rather than replaced.
const MIN_DESCRIPTION_LEN: usize = 20;

/// Merge an accepted suggestion into the draft.
///
/// Pure: returns the new draft plus the alert describing what happened.
/// Unknown kinds are never an error — they degrade to advisory.
pub fn apply(
    draft: &TaskDraft,
    suggestion: &SuggestionEnvelope,
    now: DateTime<Utc>,
) -> (TaskDraft, Alert) {
    let mut next = draft.clone();

    let alert = match suggestion.kind {
        SuggestionKind::Priority => {
            let priority = metadata_str(suggestion, "priority")
                .and_then(|s| TaskPriority::from_text(&s))
                .or_else(|| TaskPriority::from_text(&suggestion.text))
                .unwrap_or(TaskPriority::Medium);
            next.priority = priority;
            Alert::success(format!("Priority set to {priority}"))
        }

        SuggestionKind::DueDate => {
            let due = metadata_date(suggestion, now)
                .unwrap_or_else(|| now + Duration::days(1));
            next.due_date = Some(due);
            Alert::success(format!("Due date set to {}", due.format("%Y-%m-%d")))
        }

        SuggestionKind::Description => {
            merge_description(&mut next, &suggestion.text);
            Alert::success("Description updated")
        }

        SuggestionKind::DescriptionImprove => {
            // When the suggestion flags specific wording, merge its example
            // phrasing instead of the advisory text itself.
            let body = metadata_str(suggestion, "example")
                .unwrap_or_else(|| suggestion.text.clone());
            merge_description(&mut next, &body);
            Alert::success("Description improved")
        }

        SuggestionKind::Category => {
            let category =
                metadata_str(suggestion, "category").unwrap_or_else(|| suggestion.text.clone());
            next.category = Some(category.clone());
            Alert::success(format!("Category set to {category}"))
        }

        SuggestionKind::Breakdown => {
            let steps = metadata_steps(suggestion).unwrap_or_else(|| {
                vec!["…".to_string(), "…".to_string(), "…".to_string()]
            });
            let block = steps
                .iter()
                .enumerate()
                .map(|(i, step)| format!("{}. {step}", i + 1))
                .collect::<Vec<_>>()
                .join("\n");
            let existing = next.description.take().unwrap_or_default();
            next.description = Some(if existing.is_empty() {
                format!("Steps:\n{block}")
            } else {
                format!("{existing}\n\nSteps:\n{block}")
            });
            Alert::success("Breakdown added to description")
        }

        // Advisory-only kinds: inform, change nothing.
        SuggestionKind::Reminder | SuggestionKind::Delegation | SuggestionKind::Unknown => {
            Alert::info(suggestion.text.clone()).with_title("Suggestion")
        }
    };

    (next, alert)
}

/// Empty-or-short descriptions are appended to; substantial ones replaced.
fn merge_description(draft: &mut TaskDraft, body: &str) {
    match draft.description.take() {
        Some(existing) if existing.trim().len() > MIN_DESCRIPTION_LEN => {
            draft.description = Some(body.to_string());
        }
        Some(existing) if !existing.trim().is_empty() => {
            draft.description = Some(format!("{existing}\n{body}"));
        }
        _ => draft.description = Some(body.to_string()),
    }
}

fn metadata_str(suggestion: &SuggestionEnvelope, key: &str) -> Option<String> {
    suggestion
        .metadata
        .as_ref()
        .and_then(|m| m.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn metadata_steps(suggestion: &SuggestionEnvelope) -> Option<Vec<String>> {
    let steps = suggestion
        .metadata
        .as_ref()
        .and_then(|m| m.get("steps"))
        .and_then(Value::as_array)?;
    let steps: Vec<String> = steps
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    if steps.is_empty() {
        None
    } else {
        Some(steps)
    }
}

/// A concrete date in metadata wins; it may itself be an ISO timestamp or
/// loose English.
fn metadata_date(suggestion: &SuggestionEnvelope, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let raw = metadata_str(suggestion, "date")
        .or_else(|| metadata_str(suggestion, "due_date"))
        .or_else(|| metadata_str(suggestion, "dueDate"))?;
    if let Ok(ts) = raw.parse::<DateTime<Utc>>() {
        return Some(ts);
    }
    dates::parse_natural(&raw, now).or_else(|| {
        // Fall back to scanning the suggestion text itself.
        dates::parse_natural(&suggestion.text, now)
    })
}
