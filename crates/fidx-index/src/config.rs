//! Index engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for the index engine.
///
/// Loaded once (usually from the `[index]` table of the server config) and
/// owned by the [`IndexManager`](crate::IndexManager); every operation reads
/// it from there rather than from process-wide state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Maximum number of records per persisted snapshot chunk.
    pub chunk_size: usize,
    /// Keys requested per page when scanning the object store.
    pub scan_page_size: usize,
    /// Cooperative pause between scan pages, in milliseconds.
    pub scan_pause_ms: u64,
    /// Lifetime of the maintenance guard before it may be taken over.
    pub lock_ttl_secs: u64,
    /// Page size substituted for missing or malformed `count` values.
    pub default_count: usize,
    /// Capacity of the maintenance task queue.
    pub queue_capacity: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10_000,
            scan_page_size: 1_000,
            scan_pause_ms: 10,
            lock_ttl_secs: 300,
            default_count: 50,
            queue_capacity: 64,
        }
    }
}

impl IndexConfig {
    /// A configuration for tests: tiny chunks and pages, no pauses.
    pub fn small() -> Self {
        Self {
            chunk_size: 2,
            scan_page_size: 2,
            scan_pause_ms: 0,
            ..Default::default()
        }
    }

    pub fn scan_pause(&self) -> Duration {
        Duration::from_millis(self.scan_pause_ms)
    }

    pub fn lock_ttl_secs(&self) -> i64 {
        i64::try_from(self.lock_ttl_secs).unwrap_or(i64::MAX)
    }
}
