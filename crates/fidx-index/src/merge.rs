//! Folding the operation log into the committed snapshot.

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::{IndexError, IndexResult};
use crate::guard::MaintenanceGuard;
use crate::oplog::OperationLog;
use crate::persist::SnapshotStore;
use crate::queue::MaintenanceKind;
use crate::snapshot::Applied;

/// What one merge did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub upserted: usize,
    pub removed: usize,
    /// Deletes of ids that were not indexed.
    pub absent: usize,
    pub skipped: usize,
    /// Log entries deleted after the commit.
    pub consumed: usize,
    /// Version committed by this merge; `None` if the log was empty.
    pub version: Option<u64>,
    pub total_count: usize,
}

impl MergeOutcome {
    pub fn applied(&self) -> usize {
        self.upserted + self.removed + self.absent + self.skipped
    }
}

/// Apply every pending log entry to the committed snapshot under the
/// maintenance guard.
///
/// The new snapshot is committed before the consumed entries are deleted.
/// If deletion fails the entries are simply re-applied by the next merge,
/// which is harmless because every entry kind is idempotent. A merge whose
/// guard was taken over, or whose base version moved, commits nothing and
/// leaves the log alone.
pub async fn merge_operations(
    snapshots: &SnapshotStore,
    oplog: &OperationLog,
    guard: &MaintenanceGuard,
) -> IndexResult<MergeOutcome> {
    guard
        .run_guarded(MaintenanceKind::Merge, |holder| {
            merge_locked(snapshots, oplog, guard, holder)
        })
        .await
}

async fn merge_locked(
    snapshots: &SnapshotStore,
    oplog: &OperationLog,
    guard: &MaintenanceGuard,
    holder: Uuid,
) -> IndexResult<MergeOutcome> {
    let batch = oplog.pending().await?;
    let mut outcome = MergeOutcome::default();
    if batch.is_empty() {
        info!("no pending operations to merge");
        return Ok(outcome);
    }

    let (mut snapshot, previous) = snapshots
        .load_with_meta()
        .await?
        .ok_or(IndexError::SnapshotUnavailable)?;

    for op in &batch.operations {
        match snapshot.apply(&op.entry) {
            Applied::Upserted => outcome.upserted += 1,
            Applied::Removed => outcome.removed += 1,
            Applied::Absent => outcome.absent += 1,
            Applied::Skipped => outcome.skipped += 1,
        }
    }
    outcome.skipped += batch.unreadable.len();

    guard.confirm(holder, MaintenanceKind::Merge).await?;
    let meta = snapshots.commit(&mut snapshot, Some(&previous)).await?;
    outcome.version = Some(meta.version);
    outcome.total_count = meta.total_count;
    outcome.consumed = oplog.consume(&batch.keys()).await?;

    info!(
        version = meta.version,
        applied = outcome.applied(),
        consumed = outcome.consumed,
        total = meta.total_count,
        "operations merged"
    );
    Ok(outcome)
}
