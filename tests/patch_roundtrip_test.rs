// SPDX-License-Identifier: MIT
//! Property test for the rollback law: for any cached record and any patch,
//! applying the forward patch and then its captured inverse restores the
//! record bit-for-bit.

use chrono::{DateTime, TimeZone, Utc};
use proptest::option;
use proptest::prelude::*;

use tasksync::model::{TaskId, TaskPatch, TaskPriority, TaskRecord, TaskStatus};

fn status_strategy() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Pending),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Completed),
    ]
}

fn priority_strategy() -> impl Strategy<Value = TaskPriority> {
    prop_oneof![
        Just(TaskPriority::Low),
        Just(TaskPriority::Medium),
        Just(TaskPriority::High),
    ]
}

fn datetime_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    // Any second within a few decades around now.
    (0i64..2_000_000_000).prop_map(|secs| Utc.timestamp_opt(secs, 0).unwrap())
}

fn record_strategy() -> impl Strategy<Value = TaskRecord> {
    (
        1i64..10_000,
        ".{0,40}",
        option::of(".{0,80}"),
        status_strategy(),
        priority_strategy(),
        option::of(datetime_strategy()),
    )
        .prop_map(|(id, title, description, status, priority, due_date)| TaskRecord {
            id: TaskId(id),
            title,
            description,
            status,
            priority,
            due_date,
            created_at: None,
            owner_id: Some(1),
        })
}

fn patch_strategy() -> impl Strategy<Value = TaskPatch> {
    (
        option::of(".{0,40}"),
        option::of(option::of(".{0,80}")),
        option::of(status_strategy()),
        option::of(priority_strategy()),
        option::of(option::of(datetime_strategy())),
    )
        .prop_map(|(title, description, status, priority, due_date)| TaskPatch {
            title,
            description,
            status,
            priority,
            due_date,
        })
}

proptest! {
    #[test]
    fn forward_then_inverse_restores_the_record(
        before in record_strategy(),
        patch in patch_strategy(),
    ) {
        let inverse = patch.inverse_of(&before);

        let mut task = before.clone();
        patch.apply(&mut task);
        inverse.apply(&mut task);

        prop_assert_eq!(task, before);
    }

    #[test]
    fn inverse_touches_exactly_the_patched_fields(
        before in record_strategy(),
        patch in patch_strategy(),
    ) {
        let inverse = patch.inverse_of(&before);

        prop_assert_eq!(inverse.title.is_some(), patch.title.is_some());
        prop_assert_eq!(inverse.description.is_some(), patch.description.is_some());
        prop_assert_eq!(inverse.status.is_some(), patch.status.is_some());
        prop_assert_eq!(inverse.priority.is_some(), patch.priority.is_some());
        prop_assert_eq!(inverse.due_date.is_some(), patch.due_date.is_some());
    }
}
