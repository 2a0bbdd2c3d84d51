//! Persisted snapshot layout.
//!
//! A snapshot lives in the object store as one meta record plus N chunk
//! records:
//!
//! ```text
//! manage@index@meta                 -> IndexMeta (JSON)
//! manage@index@chunk_<version>_<tag>_<n>  -> [FileRecord] (JSON), at most chunk_size each
//! ```
//!
//! Chunks are written under keys qualified by version and a per-commit tag,
//! so two commits never share a chunk key. Writing the meta record is the
//! commit point; just before it the meta record is re-read and the commit
//! aborts if another one landed in between. Chunks of the superseded version
//! are deleted afterwards, and a reader that loses that race re-reads the
//! meta record once and loads the newer version. Every chunk's CRC32 is
//! recorded in the meta record so a torn or foreign chunk is detected.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bytes::Bytes;
use fidx_store::KvStore;
use fidx_types::{FileRecord, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{IndexError, IndexResult};
use crate::snapshot::IndexSnapshot;

/// Key of the snapshot meta record.
pub const META_KEY: &str = "manage@index@meta";

/// Prefix shared by every snapshot chunk key.
pub const CHUNK_KEY_PREFIX: &str = "manage@index@chunk_";

/// Key of chunk `n` written by commit `tag` of snapshot `version`.
pub fn chunk_key(version: u64, tag: &str, n: usize) -> String {
    format!("{CHUNK_KEY_PREFIX}{version}_{tag}_{n}")
}

fn commit_tag() -> String {
    // The low bits of a v7 id are random; the high bits are the clock.
    let id = Uuid::now_v7().simple().to_string();
    id[id.len() - 12..].to_string()
}

/// Description of one persisted chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub key: String,
    pub records: usize,
    pub bytes: usize,
    pub crc32: u32,
}

/// The commit record of a persisted snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub version: u64,
    pub last_updated: Timestamp,
    pub total_count: usize,
    pub chunk_size: usize,
    pub directories: BTreeSet<String>,
    pub chunks: Vec<ChunkMeta>,
}

impl IndexMeta {
    /// Total bytes across all chunks.
    pub fn chunk_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.bytes).sum()
    }
}

/// Reads and commits snapshots in the chunked layout.
#[derive(Clone)]
pub struct SnapshotStore {
    store: Arc<dyn KvStore>,
    chunk_size: usize,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn KvStore>, chunk_size: usize) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Read the current meta record, with its encoded size in bytes.
    pub async fn read_meta_sized(&self) -> IndexResult<Option<(IndexMeta, usize)>> {
        let Some(stored) = self.store.get(META_KEY).await? else {
            return Ok(None);
        };
        let meta: IndexMeta = serde_json::from_slice(&stored.value)
            .map_err(|e| IndexError::CorruptSnapshot(format!("meta record: {e}")))?;
        Ok(Some((meta, stored.value.len())))
    }

    /// Read the current meta record.
    pub async fn read_meta(&self) -> IndexResult<Option<IndexMeta>> {
        Ok(self.read_meta_sized().await?.map(|(meta, _)| meta))
    }

    /// Load the committed snapshot, `Ok(None)` if none was ever committed.
    pub async fn load(&self) -> IndexResult<Option<IndexSnapshot>> {
        Ok(self.load_with_meta().await?.map(|(snapshot, _)| snapshot))
    }

    /// Load the committed snapshot together with the meta record it was
    /// read through, for callers that go on to commit a successor.
    ///
    /// If the chunks vanish under a concurrent commit, the meta record is
    /// read again and the newer version loaded instead.
    pub async fn load_with_meta(&self) -> IndexResult<Option<(IndexSnapshot, IndexMeta)>> {
        let Some(meta) = self.read_meta().await? else {
            return Ok(None);
        };
        match self.load_version(&meta).await {
            Ok(snapshot) => Ok(Some((snapshot, meta))),
            Err(IndexError::CorruptSnapshot(reason)) => match self.read_meta().await? {
                Some(latest) if latest.version != meta.version => {
                    debug!(
                        stale = meta.version,
                        latest = latest.version,
                        %reason,
                        "snapshot replaced while loading, retrying"
                    );
                    let snapshot = self.load_version(&latest).await?;
                    Ok(Some((snapshot, latest)))
                }
                _ => Err(IndexError::CorruptSnapshot(reason)),
            },
            Err(e) => Err(e),
        }
    }

    async fn load_version(&self, meta: &IndexMeta) -> IndexResult<IndexSnapshot> {
        let mut records = BTreeMap::new();
        for chunk in &meta.chunks {
            let stored = self.store.get(&chunk.key).await?.ok_or_else(|| {
                IndexError::CorruptSnapshot(format!("missing chunk {}", chunk.key))
            })?;
            let actual = crc32fast::hash(&stored.value);
            if actual != chunk.crc32 {
                return Err(IndexError::CorruptSnapshot(format!(
                    "checksum mismatch in {}: expected {:#010x}, got {actual:#010x}",
                    chunk.key, chunk.crc32
                )));
            }
            let decoded: Vec<FileRecord> = serde_json::from_slice(&stored.value)
                .map_err(|e| IndexError::CorruptSnapshot(format!("chunk {}: {e}", chunk.key)))?;
            records.extend(decoded.into_iter().map(|r| (r.id.clone(), r)));
        }

        if records.len() != meta.total_count {
            return Err(IndexError::CorruptSnapshot(format!(
                "meta reports {} records, chunks hold {}",
                meta.total_count,
                records.len()
            )));
        }

        debug!(version = meta.version, records = records.len(), "snapshot loaded");
        Ok(IndexSnapshot {
            records,
            directories: meta.directories.clone(),
            total_count: meta.total_count,
            last_updated: meta.last_updated,
            version: meta.version,
        })
    }

    /// Version named by the live meta record, `0` if there is none or it is
    /// unreadable.
    async fn live_version(&self) -> IndexResult<u64> {
        match self.read_meta().await {
            Ok(meta) => Ok(meta.map_or(0, |m| m.version)),
            Err(IndexError::CorruptSnapshot(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Persist `snapshot` as the next version after `previous` and make it
    /// the live snapshot.
    ///
    /// Updates the snapshot's derived fields, `version` and `last_updated` in
    /// place. If any write before the meta record fails, the previous version
    /// stays live and the error is returned. If the live version is no longer
    /// `previous` when the meta record is about to be written, the commit is
    /// abandoned with [`IndexError::Superseded`] and its chunks removed.
    pub async fn commit(
        &self,
        snapshot: &mut IndexSnapshot,
        previous: Option<&IndexMeta>,
    ) -> IndexResult<IndexMeta> {
        snapshot.refresh_derived();
        snapshot.version = previous.map_or(1, |p| p.version + 1);
        snapshot.last_updated =
            Timestamp::now_after(previous.map_or(Timestamp::zero(), |p| p.last_updated));

        let tag = commit_tag();
        let records: Vec<&FileRecord> = snapshot.records.values().collect();
        let mut chunks = Vec::new();
        for (n, group) in records.chunks(self.chunk_size).enumerate() {
            let key = chunk_key(snapshot.version, &tag, n);
            let encoded = serde_json::to_vec(group)?;
            let meta = ChunkMeta {
                key: key.clone(),
                records: group.len(),
                bytes: encoded.len(),
                crc32: crc32fast::hash(&encoded),
            };
            self.store.put(&key, Bytes::from(encoded), None).await?;
            chunks.push(meta);
        }

        let expected = previous.map_or(0, |p| p.version);
        let found = self.live_version().await?;
        if found != expected {
            warn!(expected, found, "snapshot changed under commit, abandoning");
            self.discard_chunks(&chunks).await;
            return Err(IndexError::Superseded { expected, found });
        }

        let meta = IndexMeta {
            version: snapshot.version,
            last_updated: snapshot.last_updated,
            total_count: snapshot.total_count,
            chunk_size: self.chunk_size,
            directories: snapshot.directories.clone(),
            chunks,
        };
        self.store
            .put(META_KEY, Bytes::from(serde_json::to_vec(&meta)?), None)
            .await?;

        if let Some(previous) = previous {
            self.discard_chunks(&previous.chunks).await;
        }

        debug!(
            version = meta.version,
            records = meta.total_count,
            chunks = meta.chunks.len(),
            "snapshot committed"
        );
        Ok(meta)
    }

    /// Delete chunks no meta record will reference again. Failures leave
    /// orphaned chunks behind but never affect the live snapshot.
    async fn discard_chunks(&self, chunks: &[ChunkMeta]) {
        for chunk in chunks {
            if let Err(e) = self.store.delete(&chunk.key).await {
                warn!(key = %chunk.key, error = %e, "failed to delete superseded chunk");
            }
        }
    }
}
