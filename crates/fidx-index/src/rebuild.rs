//! Full reconstruction of the snapshot from an object store scan.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{IndexError, IndexResult};
use crate::guard::MaintenanceGuard;
use crate::oplog::OperationLog;
use crate::persist::SnapshotStore;
use crate::queue::MaintenanceKind;
use crate::scan::Scanner;
use crate::snapshot::IndexSnapshot;

/// What one rebuild did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RebuildOutcome {
    pub version: u64,
    pub total_count: usize,
    pub directory_count: usize,
    /// Keys listed during the scan.
    pub processed: usize,
    pub skipped: usize,
    pub pages: usize,
    /// Log entries that were pending at start and are now covered by the scan.
    pub consumed_operations: usize,
}

/// Rebuild the snapshot from scratch under the maintenance guard.
///
/// `progress` receives the running processed-key count after each page. The
/// staging snapshot only becomes visible when its meta record is committed;
/// any failure before that leaves the previous snapshot live. A scan that
/// outlives the guard and finds it taken over is discarded.
pub async fn rebuild_index(
    scanner: &Scanner,
    snapshots: &SnapshotStore,
    oplog: &OperationLog,
    guard: &MaintenanceGuard,
    progress: &(dyn Fn(usize) + Send + Sync),
) -> IndexResult<RebuildOutcome> {
    guard
        .run_guarded(MaintenanceKind::Rebuild, |holder| {
            rebuild_locked(scanner, snapshots, oplog, progress, guard, holder)
        })
        .await
}

async fn rebuild_locked(
    scanner: &Scanner,
    snapshots: &SnapshotStore,
    oplog: &OperationLog,
    progress: &(dyn Fn(usize) + Send + Sync),
    guard: &MaintenanceGuard,
    holder: Uuid,
) -> IndexResult<RebuildOutcome> {
    // Entries logged before the scan starts describe writes the scan will
    // see; entries logged during the scan are left for the next merge.
    let covered = oplog.pending_keys().await?;

    let previous = match snapshots.read_meta().await {
        Ok(meta) => meta,
        Err(IndexError::CorruptSnapshot(reason)) => {
            warn!(%reason, "replacing unreadable snapshot");
            None
        }
        Err(e) => return Err(e),
    };

    info!(pending = covered.len(), "rebuild scan started");
    let report = scanner.scan("", |processed| progress(processed)).await?;

    let mut staging = IndexSnapshot::from_records(report.records);
    guard.confirm(holder, MaintenanceKind::Rebuild).await?;
    let meta = snapshots.commit(&mut staging, previous.as_ref()).await?;
    let consumed_operations = oplog.consume(&covered).await?;

    let outcome = RebuildOutcome {
        version: meta.version,
        total_count: meta.total_count,
        directory_count: meta.directories.len(),
        processed: report.processed,
        skipped: report.skipped,
        pages: report.pages,
        consumed_operations,
    };
    info!(
        version = outcome.version,
        total = outcome.total_count,
        skipped = outcome.skipped,
        pages = outcome.pages,
        "rebuild committed"
    );
    Ok(outcome)
}
