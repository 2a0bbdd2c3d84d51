use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use fidx_types::FileMetadata;

use crate::entry::{KeyEntry, ListOptions, ListPage, StoredValue};
use crate::error::StoreResult;
use crate::traits::KvStore;

/// In-memory, `BTreeMap`-based key-value store.
///
/// Intended for tests and embedding. Entries live behind a `RwLock`; values
/// are cheap to clone (`Bytes`). The cursor of a page is the last key it
/// returned.
pub struct InMemoryKvStore {
    entries: RwLock<BTreeMap<String, StoredValue>>,
}

impl InMemoryKvStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }

    /// All keys in ascending order.
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Remove all keys from the store.
    pub fn clear(&self) {
        self.entries.write().expect("lock poisoned").clear();
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredValue>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Bytes, metadata: Option<FileMetadata>) -> StoreResult<()> {
        let mut map = self.entries.write().expect("lock poisoned");
        map.insert(key.to_string(), StoredValue { value, metadata });
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut map = self.entries.write().expect("lock poisoned");
        Ok(map.remove(key).is_some())
    }

    async fn list(&self, options: ListOptions) -> StoreResult<ListPage> {
        let map = self.entries.read().expect("lock poisoned");
        let limit = options.limit.max(1);

        let lower = match options.cursor {
            Some(cursor) if cursor >= options.prefix => Bound::Excluded(cursor),
            _ => Bound::Included(options.prefix.clone()),
        };

        let mut matching = map
            .range::<String, _>((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(&options.prefix));

        let keys: Vec<KeyEntry> = matching
            .by_ref()
            .take(limit)
            .map(|(name, stored)| KeyEntry {
                name: name.clone(),
                metadata: stored.metadata.clone(),
            })
            .collect();

        let cursor = if matching.next().is_some() {
            keys.last().map(|k| k.name.clone())
        } else {
            None
        };

        Ok(ListPage { keys, cursor })
    }
}

impl std::fmt::Debug for InMemoryKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryKvStore")
            .field("key_count", &self.len())
            .finish()
    }
}
