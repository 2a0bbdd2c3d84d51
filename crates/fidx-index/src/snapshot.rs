//! The materialized index snapshot.
//!
//! An [`IndexSnapshot`] is a plain in-memory value. Merge patches a working
//! copy and rebuild assembles a fresh one; neither is visible to readers until
//! [`SnapshotStore::commit`](crate::persist::SnapshotStore::commit) swaps it in.

use std::collections::{BTreeMap, BTreeSet};

use fidx_types::keys::ancestor_directories;
use fidx_types::{FileRecord, OpKind, OperationLogEntry, Timestamp};
use tracing::warn;

/// All indexed records plus derived directory set and bookkeeping.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexSnapshot {
    /// Records keyed by id; iteration order is the query order.
    pub records: BTreeMap<String, FileRecord>,
    /// Every ancestor directory of every record (`a`, `a/b` for `a/b/c.txt`).
    pub directories: BTreeSet<String>,
    /// Always equal to `records.len()` after [`refresh_derived`](Self::refresh_derived).
    pub total_count: usize,
    pub last_updated: Timestamp,
    pub version: u64,
}

/// What applying one log entry did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Upserted,
    Removed,
    /// Delete of an id that was not indexed.
    Absent,
    /// Entry was not applicable (missing payload, reserved key, no timestamp).
    Skipped,
}

impl IndexSnapshot {
    /// An empty snapshot at version 0.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from scanned records, dropping any that are not indexable.
    pub fn from_records(records: impl IntoIterator<Item = FileRecord>) -> Self {
        let mut snapshot = Self::empty();
        for record in records {
            snapshot.upsert(record);
        }
        snapshot.refresh_derived();
        snapshot
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&FileRecord> {
        self.records.get(id)
    }

    /// Insert or replace a record. Returns `false` if the record is not indexable.
    ///
    /// Derived fields are stale until [`refresh_derived`](Self::refresh_derived).
    pub fn upsert(&mut self, record: FileRecord) -> bool {
        if !record.is_indexable() {
            return false;
        }
        self.records.insert(record.id.clone(), record);
        true
    }

    /// Remove a record if present.
    pub fn remove(&mut self, id: &str) -> bool {
        self.records.remove(id).is_some()
    }

    /// Apply one log entry. Every kind is idempotent: re-applying the same
    /// entry leaves the records unchanged.
    pub fn apply(&mut self, entry: &OperationLogEntry) -> Applied {
        if entry.kind == OpKind::Move {
            if let Some(from) = entry.from.as_deref() {
                if from != entry.id {
                    self.remove(from);
                }
            }
        }

        match entry.record() {
            Ok(None) => {
                if self.remove(&entry.id) {
                    Applied::Removed
                } else {
                    Applied::Absent
                }
            }
            Ok(Some(record)) => {
                if self.upsert(record) {
                    Applied::Upserted
                } else {
                    warn!(id = %entry.id, kind = %entry.kind, "skipping non-indexable record");
                    Applied::Skipped
                }
            }
            Err(e) => {
                warn!(op_id = %entry.op_id, error = %e, "skipping malformed log entry");
                Applied::Skipped
            }
        }
    }

    /// Recompute `directories` and `total_count` from `records`.
    pub fn refresh_derived(&mut self) {
        self.directories = self
            .records
            .keys()
            .flat_map(|id| ancestor_directories(id))
            .map(str::to_string)
            .collect();
        self.total_count = self.records.len();
    }
}
