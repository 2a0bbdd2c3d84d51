use async_trait::async_trait;
use bytes::Bytes;
use fidx_types::FileMetadata;

use crate::entry::{KeyEntry, ListOptions, ListPage, StoredValue};
use crate::error::StoreResult;

/// Key-value object store with per-key metadata.
///
/// All implementations must satisfy these invariants:
/// - `list` yields keys in ascending lexicographic order, and paging with the
///   returned cursor visits every matching key exactly once.
/// - `put` replaces both value and metadata of an existing key.
/// - The store never interprets values or metadata.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    async fn get(&self, key: &str) -> StoreResult<Option<StoredValue>>;

    /// Write a value, replacing any existing value and metadata.
    async fn put(&self, key: &str, value: Bytes, metadata: Option<FileMetadata>) -> StoreResult<()>;

    /// Delete a key. Returns `true` if the key existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// List one page of keys matching `options.prefix`.
    async fn list(&self, options: ListOptions) -> StoreResult<ListPage>;

    /// List every key under `prefix` by following cursors to the end.
    ///
    /// Only suitable for small key ranges such as the operation log; full
    /// scans should page explicitly so they can yield between pages.
    async fn list_all(&self, prefix: &str, page_size: usize) -> StoreResult<Vec<KeyEntry>> {
        let mut keys = Vec::new();
        let mut cursor = None;
        loop {
            let page = self
                .list(ListOptions::new(prefix, page_size).with_cursor(cursor))
                .await?;
            keys.extend(page.keys);
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(keys)
    }
}
