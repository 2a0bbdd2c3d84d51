//! Footprint and freshness reports.

use std::collections::BTreeSet;

use fidx_types::Timestamp;
use serde::Serialize;
use tracing::warn;

use crate::error::{IndexError, IndexResult};
use crate::guard::{GuardRecord, MaintenanceGuard};
use crate::oplog::OperationLog;
use crate::persist::{SnapshotStore, CHUNK_KEY_PREFIX};

/// Size of one persisted chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkStats {
    pub key: String,
    pub records: usize,
    pub bytes: usize,
}

/// Physical footprint of the persisted snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStorageStats {
    pub exists: bool,
    pub version: u64,
    pub chunk_size: usize,
    pub chunk_count: usize,
    pub total_records: usize,
    /// Bytes across all chunks plus the meta record.
    pub total_bytes: usize,
    pub meta_bytes: usize,
    pub chunks: Vec<ChunkStats>,
    /// Chunk records not referenced by the meta record, left behind by an
    /// interrupted commit or cleanup.
    pub orphaned_chunks: usize,
}

/// Freshness and backlog, for deciding whether a merge or rebuild is due.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    /// A meta record is present.
    pub exists: bool,
    /// The meta record could be decoded.
    pub readable: bool,
    pub version: u64,
    pub last_updated: Option<Timestamp>,
    pub total_count: usize,
    pub directory_count: usize,
    pub pending_operations: usize,
    /// The guard record, if a maintenance task holds or last held it.
    pub maintenance: Option<GuardRecord>,
}

/// Footprint of the live snapshot. Orphans are counted by listing the chunk
/// prefix `page_size` keys at a time.
pub async fn storage_stats(
    snapshots: &SnapshotStore,
    page_size: usize,
) -> IndexResult<IndexStorageStats> {
    let Some((meta, meta_bytes)) = snapshots.read_meta_sized().await? else {
        return Ok(IndexStorageStats::default());
    };

    let referenced: BTreeSet<&str> = meta.chunks.iter().map(|c| c.key.as_str()).collect();
    let orphaned_chunks = snapshots
        .store()
        .list_all(CHUNK_KEY_PREFIX, page_size)
        .await?
        .iter()
        .filter(|entry| !referenced.contains(entry.name.as_str()))
        .count();

    Ok(IndexStorageStats {
        exists: true,
        version: meta.version,
        chunk_size: meta.chunk_size,
        chunk_count: meta.chunks.len(),
        total_records: meta.total_count,
        total_bytes: meta.chunk_bytes() + meta_bytes,
        meta_bytes,
        chunks: meta
            .chunks
            .iter()
            .map(|c| ChunkStats {
                key: c.key.clone(),
                records: c.records,
                bytes: c.bytes,
            })
            .collect(),
        orphaned_chunks,
    })
}

pub async fn index_info(
    snapshots: &SnapshotStore,
    oplog: &OperationLog,
    guard: &MaintenanceGuard,
) -> IndexResult<IndexInfo> {
    let mut info = IndexInfo {
        pending_operations: oplog.pending_count().await?,
        maintenance: guard.current().await?,
        ..Default::default()
    };

    match snapshots.read_meta().await {
        Ok(Some(meta)) => {
            info.exists = true;
            info.readable = true;
            info.version = meta.version;
            info.last_updated = Some(meta.last_updated);
            info.total_count = meta.total_count;
            info.directory_count = meta.directories.len();
        }
        Ok(None) => {}
        Err(IndexError::CorruptSnapshot(reason)) => {
            warn!(%reason, "index meta record unreadable");
            info.exists = true;
        }
        Err(e) => return Err(e),
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{chunk_key, META_KEY};
    use crate::queue::MaintenanceKind;
    use crate::snapshot::IndexSnapshot;
    use crate::testutil::{record, seeded_store};
    use bytes::Bytes;
    use fidx_store::KvStore;

    #[tokio::test]
    async fn stats_without_snapshot() {
        let snapshots = SnapshotStore::new(seeded_store(&[]).await, 2);
        let stats = storage_stats(&snapshots, 2).await.unwrap();
        assert!(!stats.exists);
        assert_eq!(stats.chunk_count, 0);
    }

    #[tokio::test]
    async fn stats_report_chunks_and_orphans() {
        let store = seeded_store(&[]).await;
        let snapshots = SnapshotStore::new(store.clone(), 2);
        let mut snap = IndexSnapshot::from_records(
            ["a", "b", "c", "d", "e"].iter().map(|id| record(id, &[])),
        );
        snapshots.commit(&mut snap, None).await.unwrap();
        store
            .put(&chunk_key(0, "stale", 0), Bytes::from_static(b"[]"), None)
            .await
            .unwrap();

        let stats = storage_stats(&snapshots, 2).await.unwrap();
        assert!(stats.exists);
        assert_eq!(stats.chunk_count, 3);
        assert_eq!(stats.total_records, 5);
        assert_eq!(stats.chunks.iter().map(|c| c.records).sum::<usize>(), 5);
        assert!(stats.meta_bytes > 0);
        assert_eq!(
            stats.total_bytes,
            stats.meta_bytes + stats.chunks.iter().map(|c| c.bytes).sum::<usize>()
        );
        assert_eq!(stats.orphaned_chunks, 1);
    }

    #[tokio::test]
    async fn info_reports_freshness_backlog_and_guard() {
        let store = seeded_store(&[]).await;
        let snapshots = SnapshotStore::new(store.clone(), 2);
        let oplog = OperationLog::new(store.clone(), 2);
        let guard = MaintenanceGuard::new(store.clone(), 60);

        let empty = index_info(&snapshots, &oplog, &guard).await.unwrap();
        assert!(!empty.exists);
        assert_eq!(empty.last_updated, None);

        let mut snap = IndexSnapshot::from_records([record("d/a.txt", &[]), record("b.txt", &[])]);
        snapshots.commit(&mut snap, None).await.unwrap();
        oplog.log_delete("b.txt").await.unwrap();
        let lease = guard.acquire(MaintenanceKind::Merge).await.unwrap();

        let info = index_info(&snapshots, &oplog, &guard).await.unwrap();
        assert!(info.exists && info.readable);
        assert_eq!(info.version, 1);
        assert_eq!(info.total_count, 2);
        assert_eq!(info.directory_count, 1);
        assert_eq!(info.pending_operations, 1);
        assert_eq!(info.last_updated, Some(snap.last_updated));
        assert_eq!(info.maintenance.map(|g| g.task), Some(MaintenanceKind::Merge));
        guard.release(lease).await.unwrap();
    }

    #[tokio::test]
    async fn info_flags_unreadable_meta() {
        let store = seeded_store(&[]).await;
        store.put(META_KEY, Bytes::from_static(b"nope"), None).await.unwrap();
        let info = index_info(
            &SnapshotStore::new(store.clone(), 2),
            &OperationLog::new(store.clone(), 2),
            &MaintenanceGuard::new(store, 60),
        )
        .await
        .unwrap();
        assert!(info.exists);
        assert!(!info.readable);
    }
}
