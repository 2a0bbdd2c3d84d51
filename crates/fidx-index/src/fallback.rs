//! Answering queries straight from the object store.
//!
//! Used when the snapshot is missing or unreadable. The scan is limited to
//! the queried directory's key range and its records are run through the
//! same [`run_query`] as the indexed path.

use fidx_types::Timestamp;
use tracing::debug;

use crate::error::IndexResult;
use crate::filter::QueryFilter;
use crate::query::{run_query, QueryResult};
use crate::scan::Scanner;
use crate::snapshot::IndexSnapshot;

/// Run `filter` against a live scan. The result is marked non-indexed and
/// stamped with the current time.
pub async fn fallback_list(scanner: &Scanner, filter: &QueryFilter) -> IndexResult<QueryResult> {
    let report = scanner.scan(&filter.directory, |_| {}).await?;
    let staging = IndexSnapshot::from_records(report.records);

    let mut result = run_query(&staging, filter);
    result.is_indexed = false;
    result.index_last_updated = Some(Timestamp::now());
    debug!(
        directory = %filter.directory,
        scanned = report.processed,
        total = result.total_count,
        "fallback listing served"
    );
    Ok(result)
}
