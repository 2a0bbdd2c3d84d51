//! The [`IndexManager`] facade tying the index components to one store.

use std::sync::Arc;

use async_trait::async_trait;
use fidx_store::KvStore;
use tracing::{info, warn};

use crate::config::IndexConfig;
use crate::error::{IndexError, IndexResult};
use crate::fallback::fallback_list;
use crate::filter::QueryFilter;
use crate::guard::MaintenanceGuard;
use crate::merge::{merge_operations, MergeOutcome};
use crate::oplog::OperationLog;
use crate::persist::SnapshotStore;
use crate::query::{run_query, QueryResult};
use crate::queue::{MaintenanceKind, MaintenanceQueue, MaintenanceRunner, TaskReport};
use crate::rebuild::{rebuild_index, RebuildOutcome};
use crate::scan::Scanner;
use crate::stats::{index_info, storage_stats, IndexInfo, IndexStorageStats};

/// Entry point to the index over one object store.
///
/// Holds no mutable state of its own: every piece of coordination state
/// lives in the store, so any number of managers (in one process or many)
/// may share a store.
#[derive(Clone)]
pub struct IndexManager {
    store: Arc<dyn KvStore>,
    config: IndexConfig,
    snapshots: SnapshotStore,
    oplog: OperationLog,
    guard: MaintenanceGuard,
    scanner: Scanner,
}

impl IndexManager {
    pub fn new(store: Arc<dyn KvStore>, config: IndexConfig) -> Self {
        Self {
            snapshots: SnapshotStore::new(store.clone(), config.chunk_size),
            oplog: OperationLog::new(store.clone(), config.scan_page_size),
            guard: MaintenanceGuard::new(store.clone(), config.lock_ttl_secs()),
            scanner: Scanner::new(store.clone(), config.scan_page_size, config.scan_pause()),
            store,
            config,
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// The operation log write handlers append to.
    pub fn oplog(&self) -> &OperationLog {
        &self.oplog
    }

    pub fn guard(&self) -> &MaintenanceGuard {
        &self.guard
    }

    /// Answer `filter` from the committed snapshot.
    ///
    /// A missing or unreadable snapshot yields `success == false` rather than
    /// an error; only store faults are returned as `Err`.
    pub async fn read_index(&self, filter: &QueryFilter) -> IndexResult<QueryResult> {
        match self.snapshots.load().await {
            Ok(Some(snapshot)) => Ok(run_query(&snapshot, filter)),
            Ok(None) => Ok(QueryResult::unavailable()),
            Err(IndexError::CorruptSnapshot(reason)) => {
                warn!(%reason, "index snapshot unusable");
                Ok(QueryResult::unavailable())
            }
            Err(e) => Err(e),
        }
    }

    /// Answer `filter` by scanning the store directly.
    pub async fn fallback_list(&self, filter: &QueryFilter) -> IndexResult<QueryResult> {
        fallback_list(&self.scanner, filter).await
    }

    /// [`read_index`](Self::read_index), degrading to the fallback scan when
    /// the index cannot be used.
    pub async fn list(&self, filter: &QueryFilter) -> IndexResult<QueryResult> {
        let result = self.read_index(filter).await?;
        if result.success {
            return Ok(result);
        }
        info!(directory = %filter.directory, "index unavailable, serving fallback listing");
        self.fallback_list(filter).await
    }

    pub async fn merge_operations(&self) -> IndexResult<MergeOutcome> {
        merge_operations(&self.snapshots, &self.oplog, &self.guard).await
    }

    pub async fn rebuild_index(
        &self,
        progress: &(dyn Fn(usize) + Send + Sync),
    ) -> IndexResult<RebuildOutcome> {
        rebuild_index(&self.scanner, &self.snapshots, &self.oplog, &self.guard, progress).await
    }

    /// Discard every pending operation. Unmerged writes are lost until the
    /// next rebuild picks them up from the store.
    pub async fn delete_all_operations(&self) -> IndexResult<usize> {
        self.oplog.clear().await
    }

    pub async fn index_info(&self) -> IndexResult<IndexInfo> {
        index_info(&self.snapshots, &self.oplog, &self.guard).await
    }

    pub async fn storage_stats(&self) -> IndexResult<IndexStorageStats> {
        storage_stats(&self.snapshots, self.config.scan_page_size).await
    }

    /// Start a maintenance worker running tasks against this manager.
    pub fn spawn_queue(&self) -> MaintenanceQueue {
        MaintenanceQueue::spawn(Arc::new(self.clone()), self.config.queue_capacity)
    }
}

fn log_progress(processed: usize) {
    info!(processed, "rebuild progress");
}

#[async_trait]
impl MaintenanceRunner for IndexManager {
    async fn run_task(&self, kind: MaintenanceKind) -> IndexResult<TaskReport> {
        match kind {
            MaintenanceKind::Rebuild => self
                .rebuild_index(&log_progress)
                .await
                .map(TaskReport::Rebuilt),
            MaintenanceKind::Merge => self.merge_operations().await.map(TaskReport::Merged),
            MaintenanceKind::PurgeOperations => self
                .delete_all_operations()
                .await
                .map(|removed| TaskReport::Purged { removed }),
        }
    }
}
