//! Persisted mutual exclusion between merge and rebuild.
//!
//! The guard is a single store record. The object store offers no
//! compare-and-swap, so acquisition writes the record and then reads it back
//! to confirm ownership; the expiry lets a crashed holder's guard be taken
//! over instead of blocking maintenance forever.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use fidx_store::KvStore;
use fidx_types::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{IndexError, IndexResult};
use crate::queue::MaintenanceKind;

/// Key of the guard record.
pub const LOCK_KEY: &str = "manage@index@lock";

/// Contents of the guard record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardRecord {
    pub holder: Uuid,
    pub task: MaintenanceKind,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
}

impl GuardRecord {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

/// Proof of holding the guard. Hand it back to [`MaintenanceGuard::release`].
#[derive(Debug)]
#[must_use = "a lease must be released"]
pub struct Lease {
    record: GuardRecord,
}

impl Lease {
    pub fn record(&self) -> &GuardRecord {
        &self.record
    }
}

#[derive(Clone)]
pub struct MaintenanceGuard {
    store: Arc<dyn KvStore>,
    ttl_secs: i64,
}

impl MaintenanceGuard {
    pub fn new(store: Arc<dyn KvStore>, ttl_secs: i64) -> Self {
        Self { store, ttl_secs }
    }

    /// The guard record as stored, expired or not. An unreadable record is
    /// reported as absent.
    pub async fn current(&self) -> IndexResult<Option<GuardRecord>> {
        let Some(stored) = self.store.get(LOCK_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&stored.value) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(error = %e, "unreadable maintenance guard record");
                Ok(None)
            }
        }
    }

    /// The guard record if it is still in force.
    pub async fn active(&self) -> IndexResult<Option<GuardRecord>> {
        let now = Timestamp::now();
        Ok(self.current().await?.filter(|r| !r.is_expired(now)))
    }

    /// Take the guard for `task`, failing with [`IndexError::MaintenanceBusy`]
    /// while another unexpired holder owns it.
    pub async fn acquire(&self, task: MaintenanceKind) -> IndexResult<Lease> {
        let now = Timestamp::now();
        if let Some(existing) = self.current().await? {
            if !existing.is_expired(now) {
                return Err(IndexError::MaintenanceBusy {
                    task: existing.task,
                    expires_at: existing.expires_at,
                });
            }
            warn!(
                holder = %existing.holder,
                task = %existing.task,
                expired_at = %existing.expires_at,
                "taking over expired maintenance guard"
            );
        }

        let record = GuardRecord {
            holder: Uuid::now_v7(),
            task,
            acquired_at: now,
            expires_at: now.plus_secs(self.ttl_secs),
        };
        self.store
            .put(LOCK_KEY, Bytes::from(serde_json::to_vec(&record)?), None)
            .await?;

        match self.current().await? {
            Some(stored) if stored.holder == record.holder => {
                debug!(holder = %record.holder, %task, "maintenance guard acquired");
                Ok(Lease { record })
            }
            Some(stored) => Err(IndexError::MaintenanceBusy {
                task: stored.task,
                expires_at: stored.expires_at,
            }),
            None => Err(IndexError::MaintenanceBusy {
                task,
                expires_at: record.expires_at,
            }),
        }
    }

    /// Give the guard back. Returns `false` if it had already been taken
    /// over or cleared.
    pub async fn release(&self, lease: Lease) -> IndexResult<bool> {
        match self.current().await? {
            Some(stored) if stored.holder == lease.record.holder => {
                self.store.delete(LOCK_KEY).await?;
                debug!(holder = %lease.record.holder, "maintenance guard released");
                Ok(true)
            }
            _ => {
                warn!(holder = %lease.record.holder, "maintenance guard lost before release");
                Ok(false)
            }
        }
    }

    /// Check that `holder` still owns the guard. An expired guard nobody has
    /// taken over still counts as owned.
    pub async fn confirm(&self, holder: Uuid, task: MaintenanceKind) -> IndexResult<()> {
        match self.current().await? {
            Some(stored) if stored.holder == holder => Ok(()),
            other => {
                warn!(
                    %holder,
                    %task,
                    current = ?other.map(|r| r.holder),
                    "maintenance guard taken over"
                );
                Err(IndexError::LeaseLost { task })
            }
        }
    }

    /// Remove the guard regardless of holder (manual intervention).
    pub async fn force_clear(&self) -> IndexResult<bool> {
        Ok(self.store.delete(LOCK_KEY).await?)
    }

    /// Run `work` while holding the guard for `task`; the guard is released
    /// whether `work` succeeds or fails. `work` receives the holder id so it
    /// can [`confirm`](Self::confirm) ownership before committing.
    pub async fn run_guarded<T, F, Fut>(&self, task: MaintenanceKind, work: F) -> IndexResult<T>
    where
        F: FnOnce(Uuid) -> Fut,
        Fut: Future<Output = IndexResult<T>>,
    {
        let lease = self.acquire(task).await?;
        let result = work(lease.record.holder).await;
        if let Err(e) = self.release(lease).await {
            warn!(%task, error = %e, "failed to release maintenance guard");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fidx_store::InMemoryKvStore;

    fn guard(ttl: i64) -> (Arc<InMemoryKvStore>, MaintenanceGuard) {
        let store = Arc::new(InMemoryKvStore::new());
        (store.clone(), MaintenanceGuard::new(store, ttl))
    }

    #[tokio::test]
    async fn acquire_and_release() {
        let (store, guard) = guard(60);
        let lease = guard.acquire(MaintenanceKind::Merge).await.unwrap();
        assert_eq!(lease.record().task, MaintenanceKind::Merge);
        assert!(guard.active().await.unwrap().is_some());

        assert!(guard.release(lease).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn second_acquire_is_busy() {
        let (_, guard) = guard(60);
        let lease = guard.acquire(MaintenanceKind::Rebuild).await.unwrap();
        let err = guard.acquire(MaintenanceKind::Merge).await.unwrap_err();
        assert!(matches!(
            err,
            IndexError::MaintenanceBusy { task: MaintenanceKind::Rebuild, .. }
        ));
        guard.release(lease).await.unwrap();
        let again = guard.acquire(MaintenanceKind::Merge).await.unwrap();
        guard.release(again).await.unwrap();
    }

    #[tokio::test]
    async fn expired_guard_is_taken_over() {
        let (_, guard) = guard(-1);
        let stale = guard.acquire(MaintenanceKind::Rebuild).await.unwrap();
        let fresh = guard.acquire(MaintenanceKind::Merge).await.unwrap();
        assert_ne!(stale.record().holder, fresh.record().holder);

        // The stale holder must not clear the new holder's guard.
        assert!(!guard.release(stale).await.unwrap());
        assert_eq!(guard.current().await.unwrap().unwrap().holder, fresh.record().holder);
    }

    #[tokio::test]
    async fn run_guarded_releases_on_error() {
        let (_, guard) = guard(60);
        let result: IndexResult<()> = guard
            .run_guarded(MaintenanceKind::Merge, |_| async {
                Err(IndexError::SnapshotUnavailable)
            })
            .await;
        assert!(matches!(result, Err(IndexError::SnapshotUnavailable)));
        assert!(guard.current().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn confirm_fails_once_taken_over() {
        let (_, guard) = guard(0);
        let stale = guard.acquire(MaintenanceKind::Rebuild).await.unwrap();
        // Expired but unclaimed: still ours.
        guard.confirm(stale.record().holder, MaintenanceKind::Rebuild).await.unwrap();

        let fresh = guard.acquire(MaintenanceKind::Merge).await.unwrap();
        let err = guard
            .confirm(stale.record().holder, MaintenanceKind::Rebuild)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::LeaseLost { task: MaintenanceKind::Rebuild }));

        guard.release(fresh).await.unwrap();
        assert!(guard
            .confirm(stale.record().holder, MaintenanceKind::Rebuild)
            .await
            .is_err());
        assert!(!guard.release(stale).await.unwrap());
    }

    #[tokio::test]
    async fn garbage_record_does_not_block() {
        let (store, guard) = guard(60);
        store.put(LOCK_KEY, Bytes::from_static(b"junk"), None).await.unwrap();
        let lease = guard.acquire(MaintenanceKind::Merge).await.unwrap();
        guard.release(lease).await.unwrap();
    }
}
