//! The operation log: pending mutations not yet folded into the snapshot.
//!
//! Each entry is its own store record under [`OPERATION_KEY_PREFIX`], keyed
//! by the entry's UUID v7 so that key order follows append order. Entries are
//! only ever appended by write handlers and deleted by merge, rebuild, or an
//! explicit purge.

use std::sync::Arc;

use bytes::Bytes;
use fidx_store::KvStore;
use fidx_types::{FileRecord, OperationLogEntry};
use tracing::{debug, info, warn};

use crate::error::IndexResult;

/// Prefix shared by every operation log key.
pub const OPERATION_KEY_PREFIX: &str = "manage@index@operation_";

/// Key under which `entry` is stored.
pub fn operation_key(entry: &OperationLogEntry) -> String {
    format!("{OPERATION_KEY_PREFIX}{}", entry.op_id)
}

/// A decoded log entry together with its store key.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingOperation {
    pub key: String,
    pub entry: OperationLogEntry,
}

/// Everything currently in the log.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PendingBatch {
    /// Decodable entries in application order.
    pub operations: Vec<PendingOperation>,
    /// Keys whose values could not be decoded; consumed alongside the batch.
    pub unreadable: Vec<String>,
}

impl PendingBatch {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.unreadable.is_empty()
    }

    /// Every key covered by this batch.
    pub fn keys(&self) -> Vec<String> {
        self.operations
            .iter()
            .map(|op| op.key.clone())
            .chain(self.unreadable.iter().cloned())
            .collect()
    }
}

/// Append/read/consume access to the operation log.
#[derive(Clone)]
pub struct OperationLog {
    store: Arc<dyn KvStore>,
    page_size: usize,
}

impl OperationLog {
    pub fn new(store: Arc<dyn KvStore>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// Append one entry. Returns the key it was stored under.
    pub async fn append(&self, entry: &OperationLogEntry) -> IndexResult<String> {
        let key = operation_key(entry);
        let encoded = serde_json::to_vec(entry)?;
        self.store.put(&key, Bytes::from(encoded), None).await?;
        debug!(%key, kind = %entry.kind, id = %entry.id, "operation logged");
        Ok(key)
    }

    /// Append several entries in order.
    pub async fn append_batch(&self, entries: &[OperationLogEntry]) -> IndexResult<Vec<String>> {
        let mut keys = Vec::with_capacity(entries.len());
        for entry in entries {
            keys.push(self.append(entry).await?);
        }
        Ok(keys)
    }

    pub async fn log_add(&self, record: FileRecord) -> IndexResult<String> {
        self.append(&OperationLogEntry::add(record)).await
    }

    pub async fn log_delete(&self, id: impl Into<String>) -> IndexResult<String> {
        self.append(&OperationLogEntry::delete(id)).await
    }

    pub async fn log_move(&self, from: impl Into<String>, record: FileRecord) -> IndexResult<String> {
        self.append(&OperationLogEntry::moved(from, record)).await
    }

    /// Keys of all pending entries, in key order.
    pub async fn pending_keys(&self) -> IndexResult<Vec<String>> {
        let keys = self
            .store
            .list_all(OPERATION_KEY_PREFIX, self.page_size)
            .await?;
        Ok(keys.into_iter().map(|k| k.name).collect())
    }

    /// Number of pending entries.
    pub async fn pending_count(&self) -> IndexResult<usize> {
        Ok(self.pending_keys().await?.len())
    }

    /// Read every pending entry, ordered by `(logged_at, key)`.
    ///
    /// Entries for the same id therefore apply last-arrival-wins. A key that
    /// vanished between listing and reading is ignored.
    pub async fn pending(&self) -> IndexResult<PendingBatch> {
        let mut batch = PendingBatch::default();
        for key in self.pending_keys().await? {
            let Some(stored) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_slice::<OperationLogEntry>(&stored.value) {
                Ok(entry) => batch.operations.push(PendingOperation { key, entry }),
                Err(e) => {
                    warn!(%key, error = %e, "unreadable operation log entry");
                    batch.unreadable.push(key);
                }
            }
        }
        batch
            .operations
            .sort_by(|a, b| a.entry.logged_at.cmp(&b.entry.logged_at).then(a.key.cmp(&b.key)));
        Ok(batch)
    }

    /// Delete the given entries. Deleting an absent key is not an error, so
    /// a retried consume is harmless.
    pub async fn consume(&self, keys: &[String]) -> IndexResult<usize> {
        let mut removed = 0;
        for key in keys {
            if self.store.delete(key).await? {
                removed += 1;
            }
        }
        debug!(requested = keys.len(), removed, "operations consumed");
        Ok(removed)
    }

    /// Delete every pending entry, discarding unmerged writes.
    pub async fn clear(&self) -> IndexResult<usize> {
        let keys = self.pending_keys().await?;
        let removed = self.consume(&keys).await?;
        info!(removed, "operation log cleared");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::record;
    use fidx_store::InMemoryKvStore;
    use fidx_types::{OpKind, Timestamp};

    fn new_log() -> (Arc<InMemoryKvStore>, OperationLog) {
        let store = Arc::new(InMemoryKvStore::new());
        (store.clone(), OperationLog::new(store, 2))
    }

    #[tokio::test]
    async fn append_and_read_back_in_order() {
        let (_, log) = new_log();
        log.log_add(record("a.txt", &[])).await.unwrap();
        log.log_delete("b.txt").await.unwrap();
        log.log_move("c.txt", record("d/c.txt", &[])).await.unwrap();

        let batch = log.pending().await.unwrap();
        let kinds: Vec<OpKind> = batch.operations.iter().map(|op| op.entry.kind).collect();
        assert_eq!(kinds, vec![OpKind::Add, OpKind::Delete, OpKind::Move]);
        assert_eq!(log.pending_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn pending_orders_by_logged_at_before_key() {
        let (_, log) = new_log();
        let mut late = OperationLogEntry::delete("x");
        let mut early = OperationLogEntry::delete("y");
        late.logged_at = Timestamp::from_millis(200);
        early.logged_at = Timestamp::from_millis(100);
        log.append_batch(&[late, early]).await.unwrap();

        let batch = log.pending().await.unwrap();
        let ids: Vec<&str> = batch.operations.iter().map(|op| op.entry.id.as_str()).collect();
        assert_eq!(ids, vec!["y", "x"]);
    }

    #[tokio::test]
    async fn unreadable_entries_are_reported() {
        let (store, log) = new_log();
        log.log_delete("a").await.unwrap();
        store
            .put(&format!("{OPERATION_KEY_PREFIX}zzz"), Bytes::from_static(b"??"), None)
            .await
            .unwrap();

        let batch = log.pending().await.unwrap();
        assert_eq!(batch.operations.len(), 1);
        assert_eq!(batch.unreadable.len(), 1);
        assert_eq!(batch.keys().len(), 2);
    }

    #[tokio::test]
    async fn consume_is_retry_safe() {
        let (_, log) = new_log();
        let key = log.log_delete("a").await.unwrap();
        assert_eq!(log.consume(&[key.clone()]).await.unwrap(), 1);
        assert_eq!(log.consume(&[key]).await.unwrap(), 0);
        assert_eq!(log.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clear_removes_everything_and_nothing_else() {
        let (store, log) = new_log();
        store.put("docs/a.txt", Bytes::new(), None).await.unwrap();
        for id in ["a", "b", "c"] {
            log.log_delete(id).await.unwrap();
        }
        assert_eq!(log.clear().await.unwrap(), 3);
        assert_eq!(store.keys(), vec!["docs/a.txt".to_string()]);
    }
}
