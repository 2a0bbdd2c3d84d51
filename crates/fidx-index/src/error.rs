//! Error types for the index crate.

use fidx_types::Timestamp;

use crate::queue::MaintenanceKind;

/// Errors that can occur during index maintenance and persistence.
///
/// Query-path problems are not errors: an unreadable snapshot surfaces as
/// `QueryResult::success == false` instead.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] fidx_store::StoreError),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The persisted snapshot is present but cannot be trusted.
    #[error("corrupt index snapshot: {0}")]
    CorruptSnapshot(String),

    /// No snapshot has been committed yet; a rebuild is required.
    #[error("index snapshot unavailable; run a rebuild first")]
    SnapshotUnavailable,

    /// Another maintenance task holds the guard.
    #[error("maintenance guard held by {task} until {expires_at}")]
    MaintenanceBusy {
        task: MaintenanceKind,
        expires_at: Timestamp,
    },

    /// The guard was taken over while the task was still running, so its
    /// result must not be committed.
    #[error("maintenance guard for {task} was taken over before commit")]
    LeaseLost { task: MaintenanceKind },

    /// Another commit landed after this one read its base version. Versions
    /// are reported with `0` meaning no readable snapshot.
    #[error("snapshot moved from version {expected} to {found} during commit")]
    Superseded { expected: u64, found: u64 },

    /// The maintenance queue has no free slot.
    #[error("maintenance queue full")]
    QueueFull,

    /// The maintenance worker has shut down.
    #[error("maintenance queue closed")]
    QueueClosed,
}

impl From<serde_json::Error> for IndexError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
