//! Shared fixtures for the index tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use fidx_store::{
    InMemoryKvStore, KvStore, ListOptions, ListPage, StoreError, StoreResult, StoredValue,
};
use fidx_types::{FileMetadata, FileRecord, Timestamp};

/// A timestamped record carrying `tags`.
pub(crate) fn record(id: &str, tags: &[&str]) -> FileRecord {
    FileRecord::new(
        id,
        FileMetadata::new(Timestamp::from_millis(1_700_000_000_000)).with_tags(tags.iter().copied()),
    )
    .unwrap()
}

/// Put `record` into `store` the way an upload handler would.
pub(crate) async fn put_record(store: &dyn KvStore, record: &FileRecord) {
    store
        .put(
            &record.id,
            Bytes::from(format!("contents of {}", record.id)),
            Some(record.metadata.clone()),
        )
        .await
        .unwrap();
}

/// An in-memory store holding one timestamped record per `(id, tags)`.
pub(crate) async fn seeded_store(entries: &[(&str, &[&str])]) -> Arc<InMemoryKvStore> {
    let store = Arc::new(InMemoryKvStore::new());
    for (id, tags) in entries {
        put_record(store.as_ref(), &record(id, tags)).await;
    }
    store
}

/// `docs/a.txt` tagged `x`, `docs/b.txt` tagged `y`, and `img/c.png`.
pub(crate) async fn docs_and_img() -> Arc<InMemoryKvStore> {
    seeded_store(&[
        ("docs/a.txt", &["x"]),
        ("docs/b.txt", &["y"]),
        ("img/c.png", &[]),
    ])
    .await
}

/// Wraps an in-memory store and injects failures on demand.
pub(crate) struct FlakyStore {
    inner: Arc<InMemoryKvStore>,
    /// `list` fails once this many pages have been served.
    list_budget: AtomicUsize,
    /// `put` fails for keys starting with this prefix.
    failing_put_prefix: Mutex<Option<String>>,
}

impl FlakyStore {
    pub(crate) fn new(inner: Arc<InMemoryKvStore>) -> Self {
        Self {
            inner,
            list_budget: AtomicUsize::new(usize::MAX),
            failing_put_prefix: Mutex::new(None),
        }
    }

    pub(crate) fn fail_list_after(&self, pages: usize) {
        self.list_budget.store(pages, Ordering::SeqCst);
    }

    pub(crate) fn fail_puts_under(&self, prefix: &str) {
        *self.failing_put_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    pub(crate) fn heal(&self) {
        self.list_budget.store(usize::MAX, Ordering::SeqCst);
        *self.failing_put_prefix.lock().unwrap() = None;
    }
}

#[async_trait]
impl KvStore for FlakyStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredValue>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Bytes, metadata: Option<FileMetadata>) -> StoreResult<()> {
        let failing = self.failing_put_prefix.lock().unwrap().clone();
        if failing.is_some_and(|prefix| key.starts_with(&prefix)) {
            return Err(StoreError::Backend(format!("injected put failure for {key}")));
        }
        self.inner.put(key, value, metadata).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.inner.delete(key).await
    }

    async fn list(&self, options: ListOptions) -> StoreResult<ListPage> {
        let remaining = self.list_budget.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(StoreError::Backend("injected list failure".into()));
        }
        if remaining != usize::MAX {
            self.list_budget.store(remaining - 1, Ordering::SeqCst);
        }
        self.inner.list(options).await
    }
}
