//! # fidx-index
//!
//! Secondary index over the file records of a key-value object store.
//!
//! The index is a materialized [`IndexSnapshot`] persisted in the store
//! itself, kept loosely in step with the records through an
//! [`OperationLog`]:
//!
//! - write handlers append add/delete/move entries to the log;
//! - **merge** folds pending entries into the snapshot;
//! - **rebuild** replaces the snapshot with one assembled from a full scan;
//! - **queries** read the last committed snapshot and report
//!   `success == false` when it is unusable, in which case the caller falls
//!   back to a direct scan.
//!
//! Merge and rebuild are serialized across processes by a persisted
//! [`MaintenanceGuard`] and run in the background via [`MaintenanceQueue`].
//! Readers only ever observe fully committed snapshot versions.

pub mod config;
pub mod error;
pub mod fallback;
pub mod filter;
pub mod guard;
pub mod manager;
pub mod merge;
pub mod oplog;
pub mod persist;
pub mod query;
pub mod queue;
pub mod rebuild;
pub mod scan;
pub mod snapshot;
pub mod stats;

#[cfg(test)]
mod testutil;

pub use config::IndexConfig;
pub use error::{IndexError, IndexResult};
pub use filter::{FilterParams, QueryFilter, Substitution, Validated};
pub use guard::{GuardRecord, MaintenanceGuard};
pub use manager::IndexManager;
pub use merge::MergeOutcome;
pub use oplog::OperationLog;
pub use query::QueryResult;
pub use queue::{MaintenanceKind, MaintenanceQueue, TaskHandle, TaskReport, TaskState};
pub use rebuild::RebuildOutcome;
pub use snapshot::IndexSnapshot;
pub use stats::{ChunkStats, IndexInfo, IndexStorageStats};
