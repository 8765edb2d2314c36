// SPDX-License-Identifier: MIT
//! Tag-based cache invalidation graph.
//!
//! Every cached query result (the task list, each single-task view) is a
//! [`CacheEntry`]: a versioned snapshot carrying the set of [`Tag`]s it
//! depends on. Mutations invalidate tags; entries whose tag set intersects
//! go stale and are refetched in the background on their next read, serving
//! the last-known value meanwhile.
//!
//! Versions only increase. A refetch result is installed only if the version
//! observed when the fetch was issued still matches — anything the cache
//! learned in between (an optimistic patch, a rollback) outranks the older
//! wire snapshot, which is dropped.

use std::collections::HashMap;
use tracing::{debug, trace};

use crate::model::{TaskId, TaskPatch, TaskRecord};

// ─── Keys and tags ───────────────────────────────────────────────────────────

/// Identity of a cached query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The collection query (`GET /tasks/`).
    TaskList,
    /// A single-entity query (`GET /tasks/{id}`).
    Task(TaskId),
}

/// Logical invalidation key. Entries declare which tags they depend on;
/// mutations invalidate tags rather than naming entries directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Any collection view of tasks.
    TaskList,
    /// One task, by id.
    Task(TaskId),
}

// ─── Entries ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Fresh,
    /// Marked by an invalidation; the next read owes a background refetch.
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    List(Vec<TaskRecord>),
    Entity(TaskRecord),
}

/// A versioned, tag-keyed snapshot of one query result.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub tags: Vec<Tag>,
    /// Monotonically increasing; bumped by every write to this entry.
    pub version: u64,
    pub liveness: Liveness,
    pub value: CachedValue,
}

impl CacheEntry {
    pub fn is_stale(&self) -> bool {
        self.liveness == Liveness::Stale
    }
}

/// Everything needed to undo an optimistic deletion: the removed entity
/// entry plus, per list, the index the record sat at.
#[derive(Debug, Clone)]
pub struct EntityRemoval {
    pub id: TaskId,
    entity_entry: Option<CacheEntry>,
    list_positions: Vec<(CacheKey, usize, TaskRecord)>,
}

impl EntityRemoval {
    /// Whether the removal actually took anything out of the cache.
    pub fn is_noop(&self) -> bool {
        self.entity_entry.is_none() && self.list_positions.is_empty()
    }
}

// ─── Table ───────────────────────────────────────────────────────────────────

/// The process-wide cache table. Callers share it behind the store's lock;
/// the per-key effect serialization of the arbiter and the mutation manager
/// is what keeps concurrent writers coherent, not this type.
#[derive(Debug, Default)]
pub struct CacheTable {
    entries: HashMap<CacheKey, CacheEntry>,
}

fn list_tags(records: &[TaskRecord]) -> Vec<Tag> {
    let mut tags = Vec::with_capacity(records.len() + 1);
    tags.push(Tag::TaskList);
    tags.extend(records.iter().map(|r| Tag::Task(r.id)));
    tags
}

impl CacheTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the freshest known snapshot for a query, live or stale.
    pub fn read(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Current version of an entry, or 0 if the query has never been cached.
    /// The 0 sentinel is what a first fetch passes back to
    /// [`apply_fetch`](Self::apply_fetch).
    pub fn version_of(&self, key: &CacheKey) -> u64 {
        self.entries.get(key).map(|e| e.version).unwrap_or(0)
    }

    /// Install a fetch result observed against `observed_version`.
    ///
    /// Returns `false` (and changes nothing) when the entry has moved past
    /// that version since the fetch was issued — the snapshot is older than
    /// what the cache already knows.
    pub fn apply_fetch(&mut self, key: CacheKey, value: CachedValue, observed_version: u64) -> bool {
        let current = self.version_of(&key);
        if observed_version < current {
            debug!(?key, observed_version, current, "stale fetch result dropped");
            return false;
        }
        let tags = match (&key, &value) {
            (CacheKey::TaskList, CachedValue::List(records)) => list_tags(records),
            (CacheKey::Task(id), _) => vec![Tag::Task(*id)],
            // A list payload under an entity key (or vice versa) is a caller
            // bug; still tag it minimally rather than panic.
            (CacheKey::TaskList, CachedValue::Entity(_)) => vec![Tag::TaskList],
        };
        self.entries.insert(
            key,
            CacheEntry {
                tags,
                version: current + 1,
                liveness: Liveness::Fresh,
                value,
            },
        );
        trace!(?key, version = current + 1, "fetch installed");
        true
    }

    /// Mark every entry whose tag set intersects `tags` as stale.
    /// Entries whose tags are disjoint are untouched.
    pub fn invalidate(&mut self, tags: &[Tag]) {
        let mut marked = 0usize;
        for (key, entry) in self.entries.iter_mut() {
            if entry.tags.iter().any(|t| tags.contains(t)) {
                entry.liveness = Liveness::Stale;
                marked += 1;
                trace!(?key, "entry marked stale");
            }
        }
        debug!(?tags, marked, "invalidated");
    }

    /// Apply a patch to every entry that currently contains the entity —
    /// the single-entity view and any list containing it. Bumps the version
    /// of each touched entry. Returns the touched keys.
    pub fn patch_entity(&mut self, id: TaskId, patch: &TaskPatch) -> Vec<CacheKey> {
        let mut touched = Vec::new();
        for (key, entry) in self.entries.iter_mut() {
            let hit = match &mut entry.value {
                CachedValue::Entity(record) if record.id == id => {
                    patch.apply(record);
                    true
                }
                CachedValue::List(records) => {
                    if let Some(record) = records.iter_mut().find(|r| r.id == id) {
                        patch.apply(record);
                        true
                    } else {
                        false
                    }
                }
                _ => false,
            };
            if hit {
                entry.version += 1;
                touched.push(*key);
            }
        }
        touched
    }

    /// Adopt a server-authoritative record: replace the entity everywhere it
    /// is cached. Versions bump on each touched entry.
    pub fn absorb_record(&mut self, record: &TaskRecord) {
        for entry in self.entries.values_mut() {
            match &mut entry.value {
                CachedValue::Entity(cached) if cached.id == record.id => {
                    *cached = record.clone();
                    entry.version += 1;
                }
                CachedValue::List(records) => {
                    if let Some(cached) = records.iter_mut().find(|r| r.id == record.id) {
                        *cached = record.clone();
                        entry.version += 1;
                    }
                }
                _ => {}
            }
        }
    }

    /// Optimistically remove an entity: drop its single-entity entry and pull
    /// it out of every list, recording the original index of each removal so
    /// [`restore_removal`](Self::restore_removal) can reinsert exactly there.
    pub fn remove_entity(&mut self, id: TaskId) -> EntityRemoval {
        let entity_entry = self.entries.remove(&CacheKey::Task(id));
        let mut list_positions = Vec::new();

        for (key, entry) in self.entries.iter_mut() {
            if let CachedValue::List(records) = &mut entry.value {
                if let Some(index) = records.iter().position(|r| r.id == id) {
                    let record = records.remove(index);
                    entry.version += 1;
                    entry.tags.retain(|t| *t != Tag::Task(id));
                    list_positions.push((*key, index, record));
                }
            }
        }

        EntityRemoval {
            id,
            entity_entry,
            list_positions,
        }
    }

    /// Undo an optimistic removal: reinsert each record at its original
    /// index and restore the single-entity entry.
    pub fn restore_removal(&mut self, removal: EntityRemoval) {
        for (key, index, record) in removal.list_positions {
            if let Some(entry) = self.entries.get_mut(&key) {
                if let CachedValue::List(records) = &mut entry.value {
                    let index = index.min(records.len());
                    records.insert(index, record);
                    entry.version += 1;
                    entry.tags.push(Tag::Task(removal.id));
                }
            }
        }
        if let Some(mut entry) = removal.entity_entry {
            entry.version += 1;
            self.entries.insert(CacheKey::Task(removal.id), entry);
        }
    }

    /// Find the freshest cached snapshot of a single task, looking at the
    /// entity view first and falling back to list membership.
    pub fn snapshot_of(&self, id: TaskId) -> Option<TaskRecord> {
        if let Some(entry) = self.entries.get(&CacheKey::Task(id)) {
            if let CachedValue::Entity(record) = &entry.value {
                return Some(record.clone());
            }
        }
        self.entries.values().find_map(|entry| match &entry.value {
            CachedValue::List(records) => records.iter().find(|r| r.id == id).cloned(),
            _ => None,
        })
    }

    /// Unconditional teardown — the session-boundary (logout) path. Not a
    /// tag invalidation: nothing survives, so the next principal can never
    /// observe the previous one's data.
    pub fn clear(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        debug!(dropped, "cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
