//! The query engine: filtered, paginated reads over one snapshot.
//!
//! [`run_query`] is pure. The indexed path feeds it the committed snapshot;
//! the fallback path feeds it a snapshot assembled from a live scan, so both
//! paths agree on matching, ordering and pagination by construction.

use std::collections::BTreeSet;
use std::ops::Bound;

use fidx_types::keys::immediate_subdirectory;
use fidx_types::{FileRecord, Timestamp};
use serde::Serialize;

use crate::filter::QueryFilter;
use crate::snapshot::IndexSnapshot;

/// Answer to a listing query.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// `false` when the snapshot is missing or unreadable; the caller should
    /// retry through the fallback scanner.
    pub success: bool,
    pub files: Vec<FileRecord>,
    /// Immediate subdirectories of the queried directory, as full paths.
    pub directories: Vec<String>,
    /// Number of records matching the filter, before pagination.
    pub total_count: usize,
    pub returned_count: usize,
    pub index_last_updated: Option<Timestamp>,
    /// `false` for answers produced by a live scan.
    #[serde(rename = "isIndexedResponse")]
    pub is_indexed: bool,
}

impl QueryResult {
    /// The result signalling that the index cannot be used.
    pub fn unavailable() -> Self {
        Self {
            success: false,
            files: Vec::new(),
            directories: Vec::new(),
            total_count: 0,
            returned_count: 0,
            index_last_updated: None,
            is_indexed: true,
        }
    }
}

/// Evaluate `filter` against `snapshot`.
///
/// Records are visited in id order, so a page is a contiguous slice of a
/// deterministic sequence and adjacent pages concatenate to the larger page.
pub fn run_query(snapshot: &IndexSnapshot, filter: &QueryFilter) -> QueryResult {
    let mut files = Vec::new();
    let mut directories = BTreeSet::new();
    let mut total_count = 0;

    let subtree = snapshot
        .records
        .range::<str, _>((Bound::Included(filter.directory.as_str()), Bound::Unbounded))
        .map(|(_, record)| record)
        .take_while(|record| record.id.starts_with(&filter.directory));

    for record in subtree {
        if !filter.matches(record) {
            continue;
        }
        if !filter.count_only {
            if let Some(dir) = immediate_subdirectory(&record.id, &filter.directory) {
                directories.insert(dir);
            }
        }
        if !filter.in_scope(&record.id) {
            continue;
        }

        total_count += 1;
        if filter.count_only || total_count <= filter.start {
            continue;
        }
        if filter.count.map_or(true, |count| files.len() < count) {
            files.push(record.clone());
        }
    }

    QueryResult {
        success: true,
        returned_count: files.len(),
        files,
        directories: directories.into_iter().collect(),
        total_count,
        index_last_updated: Some(snapshot.last_updated),
        is_indexed: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::record;
    use proptest::prelude::*;

    fn snapshot() -> IndexSnapshot {
        IndexSnapshot::from_records([
            record("docs/a.txt", &["x"]),
            record("docs/b.txt", &["y"]),
            record("docs/sub/c.txt", &["x", "y"]),
            record("docs/sub/deep/d.txt", &[]),
            record("img/c.png", &[]),
            record("readme.md", &["x"]),
        ])
    }

    fn ids(result: &QueryResult) -> Vec<&str> {
        result.files.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn direct_children_only() {
        let result = run_query(&snapshot(), &QueryFilter::default().in_directory("docs"));
        assert_eq!(ids(&result), vec!["docs/a.txt", "docs/b.txt"]);
        assert_eq!(result.directories, vec!["docs/sub"]);
        assert_eq!(result.total_count, 2);
        assert!(result.success && result.is_indexed);
    }

    #[test]
    fn recursive_covers_the_subtree() {
        let result = run_query(
            &snapshot(),
            &QueryFilter::default().in_directory("docs").recursive(true),
        );
        assert_eq!(result.total_count, 4);
        assert!(result.files.iter().all(|r| r.id.starts_with("docs/")));
    }

    #[test]
    fn root_listing() {
        let snap = snapshot();
        let result = run_query(&snap, &QueryFilter::default());
        assert_eq!(ids(&result), vec!["readme.md"]);
        assert_eq!(result.directories, vec!["docs", "img"]);
        assert_eq!(result.index_last_updated, Some(snap.last_updated));
    }

    #[test]
    fn count_only_returns_no_entries() {
        let result = run_query(&snapshot(), &QueryFilter::default().recursive(true).counting());
        assert_eq!(result.total_count, 6);
        assert_eq!(result.returned_count, 0);
        assert!(result.files.is_empty());
        assert!(result.directories.is_empty());
    }

    #[test]
    fn unbounded_count_returns_everything_from_start() {
        let filter = QueryFilter::default().recursive(true).page(2, None);
        let result = run_query(&snapshot(), &filter);
        assert_eq!(result.returned_count, 4);
        assert_eq!(result.total_count, 6);
    }

    #[test]
    fn start_past_the_end_is_empty() {
        let filter = QueryFilter::default().recursive(true).page(100, Some(10));
        let result = run_query(&snapshot(), &filter);
        assert!(result.files.is_empty());
        assert_eq!(result.total_count, 6);
    }

    #[test]
    fn tags_filter_files_and_directories() {
        let filter = QueryFilter::default().in_directory("docs").exclude_tags(["y"]);
        let result = run_query(&snapshot(), &filter);
        assert_eq!(ids(&result), vec!["docs/a.txt"]);
        // docs/sub still holds an untagged record deeper down.
        assert_eq!(result.directories, vec!["docs/sub"]);

        let filter = QueryFilter::default().in_directory("docs").include_tags(["x"]);
        let result = run_query(&snapshot(), &filter);
        assert_eq!(ids(&result), vec!["docs/a.txt"]);
        assert_eq!(result.directories, vec!["docs/sub"]);
    }

    #[test]
    fn search_narrows_directories() {
        let filter = QueryFilter::default().with_search("PNG");
        let result = run_query(&snapshot(), &filter);
        assert!(result.files.is_empty());
        assert_eq!(result.directories, vec!["img"]);
    }

    #[test]
    fn sibling_prefix_is_not_in_scope() {
        let snap = IndexSnapshot::from_records([record("doc/a.txt", &[]), record("docs/b.txt", &[])]);
        let result = run_query(&snap, &QueryFilter::default().in_directory("doc").recursive(true));
        assert_eq!(ids(&result), vec!["doc/a.txt"]);
    }

    #[test]
    fn empty_snapshot_is_a_successful_empty_answer() {
        let result = run_query(&IndexSnapshot::empty(), &QueryFilter::default());
        assert!(result.success);
        assert_eq!(result.total_count, 0);
    }

    fn arb_ids() -> impl Strategy<Value = BTreeSet<String>> {
        prop::collection::btree_set("[a-c]{1,2}(/[a-c]{1,2}){0,2}\\.txt", 0..40)
    }

    proptest! {
        #[test]
        fn adjacent_pages_concatenate(
            ids in arb_ids(),
            first in 0usize..15,
            second in 1usize..15,
            recursive in any::<bool>(),
        ) {
            let snap = IndexSnapshot::from_records(ids.iter().map(|id| record(id, &[])));
            let base = QueryFilter::default().recursive(recursive);

            let a = run_query(&snap, &base.clone().page(0, Some(first.max(1))));
            let b = run_query(&snap, &base.clone().page(first.max(1), Some(second)));
            let whole = run_query(&snap, &base.page(0, Some(first.max(1) + second)));

            let mut joined = a.files.clone();
            joined.extend(b.files.clone());
            prop_assert_eq!(joined, whole.files);
            prop_assert_eq!(a.total_count, whole.total_count);
        }

        #[test]
        fn direct_results_sit_in_the_directory(
            ids in arb_ids(),
            dir in prop::sample::select(vec!["", "a", "b/a", "c"]),
        ) {
            let snap = IndexSnapshot::from_records(ids.iter().map(|id| record(id, &[])));
            let filter = QueryFilter::default().in_directory(dir).page(0, None);
            let result = run_query(&snap, &filter);
            for file in &result.files {
                prop_assert_eq!(fidx_types::keys::parent_directory(&file.id), dir);
            }

            let recursive = run_query(&snap, &filter.clone().recursive(true));
            for file in &recursive.files {
                prop_assert!(file.id.starts_with(&filter.directory));
            }
            prop_assert!(recursive.total_count >= result.total_count);
        }
    }
}
