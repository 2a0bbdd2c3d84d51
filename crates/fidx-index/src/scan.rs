//! Paginated object store scan shared by rebuild and the fallback path.

use std::sync::Arc;
use std::time::Duration;

use fidx_store::{KeyEntry, KvStore, ListOptions};
use fidx_types::FileRecord;
use tracing::{debug, trace};

use crate::error::IndexResult;

/// Records gathered by one scan plus bookkeeping about what was left out.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanReport {
    pub records: Vec<FileRecord>,
    /// Keys listed, indexable or not.
    pub processed: usize,
    /// Reserved keys and records without usable metadata.
    pub skipped: usize,
    pub pages: usize,
}

/// Walks a key range page by page, pausing between pages so a long scan
/// does not monopolize the runtime.
#[derive(Clone)]
pub struct Scanner {
    store: Arc<dyn KvStore>,
    page_size: usize,
    pause: Duration,
}

impl Scanner {
    pub fn new(store: Arc<dyn KvStore>, page_size: usize, pause: Duration) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
            pause,
        }
    }

    /// Scan every key under `prefix`, calling `on_page` with the running
    /// processed count after each page. Any store error aborts the scan.
    pub async fn scan<F>(&self, prefix: &str, mut on_page: F) -> IndexResult<ScanReport>
    where
        F: FnMut(usize) + Send,
    {
        let mut report = ScanReport::default();
        let mut cursor = None;
        loop {
            let page = self
                .store
                .list(ListOptions::new(prefix, self.page_size).with_cursor(cursor))
                .await?;
            report.pages += 1;
            report.processed += page.keys.len();
            for entry in page.keys {
                match indexable(entry) {
                    Some(record) => report.records.push(record),
                    None => report.skipped += 1,
                }
            }
            on_page(report.processed);

            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
            if !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
        }

        debug!(
            prefix,
            pages = report.pages,
            processed = report.processed,
            skipped = report.skipped,
            "scan finished"
        );
        Ok(report)
    }
}

fn indexable(entry: KeyEntry) -> Option<FileRecord> {
    let metadata = entry.metadata?;
    match FileRecord::new(entry.name, metadata) {
        Ok(record) if record.is_indexable() => Some(record),
        Ok(record) => {
            trace!(id = %record.id, "not indexable");
            None
        }
        Err(e) => {
            trace!(error = %e, "invalid record key");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seeded_store, FlakyStore};
    use crate::IndexError;
    use bytes::Bytes;
    use fidx_types::FileMetadata;

    #[tokio::test]
    async fn skips_reserved_and_unstamped_keys() {
        let store = seeded_store(&[("docs/a.txt", &[]), ("img/c.png", &[])]).await;
        store.put("manage@sysConfig", Bytes::new(), None).await.unwrap();
        store
            .put("chunk_0001", Bytes::new(), Some(FileMetadata::default()))
            .await
            .unwrap();
        store
            .put("docs/raw.bin", Bytes::new(), Some(FileMetadata::default()))
            .await
            .unwrap();
        store.put("docs/bare.txt", Bytes::new(), None).await.unwrap();

        let scanner = Scanner::new(store, 2, Duration::ZERO);
        let report = scanner.scan("", |_| {}).await.unwrap();
        let ids: Vec<&str> = report.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["docs/a.txt", "img/c.png"]);
        assert_eq!(report.processed, 6);
        assert_eq!(report.skipped, 4);
    }

    #[tokio::test]
    async fn progress_reports_running_count_per_page() {
        let store = seeded_store(&[("a", &[]), ("b", &[]), ("c", &[]), ("d", &[]), ("e", &[])]).await;
        let scanner = Scanner::new(store, 2, Duration::ZERO);
        let mut seen = Vec::new();
        scanner.scan("", |n| seen.push(n)).await.unwrap();
        assert_eq!(seen, vec![2, 4, 5]);
    }

    #[tokio::test]
    async fn prefix_limits_the_scan() {
        let store = seeded_store(&[("docs/a.txt", &[]), ("docs/s/b.txt", &[]), ("img/c.png", &[])]).await;
        let scanner = Scanner::new(store, 10, Duration::ZERO);
        let report = scanner.scan("docs/", |_| {}).await.unwrap();
        assert_eq!(report.records.len(), 2);
    }

    #[tokio::test]
    async fn list_failure_aborts() {
        let inner = seeded_store(&[("a", &[]), ("b", &[]), ("c", &[])]).await;
        let flaky = Arc::new(FlakyStore::new(inner));
        flaky.fail_list_after(1);
        let scanner = Scanner::new(flaky, 1, Duration::ZERO);
        assert!(matches!(scanner.scan("", |_| {}).await, Err(IndexError::Store(_))));
    }
}
