//! Background execution of maintenance tasks.
//!
//! Submitting a task returns a [`TaskHandle`] immediately; a single worker
//! drains the queue in submission order. HTTP callers discard the handle and
//! poll `info`/`index-storage-stats` for the outcome, while the CLI and tests
//! can [`wait`](TaskHandle::wait) on it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{IndexError, IndexResult};
use crate::merge::MergeOutcome;
use crate::rebuild::RebuildOutcome;

/// The maintenance tasks, named after their request actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaintenanceKind {
    #[serde(rename = "rebuild")]
    Rebuild,
    #[serde(rename = "merge-operations")]
    Merge,
    #[serde(rename = "delete-operations")]
    PurgeOperations,
}

impl MaintenanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rebuild => "rebuild",
            Self::Merge => "merge-operations",
            Self::PurgeOperations => "delete-operations",
        }
    }

    /// Parse a request `action` value.
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "rebuild" => Some(Self::Rebuild),
            "merge-operations" => Some(Self::Merge),
            "delete-operations" => Some(Self::PurgeOperations),
            _ => None,
        }
    }
}

impl fmt::Display for MaintenanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a finished task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskReport {
    Rebuilt(RebuildOutcome),
    Merged(MergeOutcome),
    Purged { removed: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Succeeded(TaskReport),
    Failed(String),
}

impl TaskState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Failed(_))
    }
}

/// Executes one maintenance task to completion.
#[async_trait]
pub trait MaintenanceRunner: Send + Sync {
    async fn run_task(&self, kind: MaintenanceKind) -> IndexResult<TaskReport>;
}

/// A submitted task.
#[derive(Debug)]
pub struct TaskHandle {
    pub id: Uuid,
    pub kind: MaintenanceKind,
    state: watch::Receiver<TaskState>,
}

impl TaskHandle {
    pub fn state(&self) -> TaskState {
        self.state.borrow().clone()
    }

    /// Wait until the task has finished.
    pub async fn wait(mut self) -> TaskState {
        loop {
            let current = self.state.borrow_and_update().clone();
            if current.is_finished() {
                return current;
            }
            if self.state.changed().await.is_err() {
                let last = self.state.borrow().clone();
                if last.is_finished() {
                    return last;
                }
                return TaskState::Failed("maintenance worker stopped".into());
            }
        }
    }
}

struct Job {
    id: Uuid,
    kind: MaintenanceKind,
    state: watch::Sender<TaskState>,
}

/// Sender side of the maintenance queue. Clones share one worker.
#[derive(Clone)]
pub struct MaintenanceQueue {
    tx: mpsc::Sender<Job>,
}

impl MaintenanceQueue {
    /// Spawn the worker on the current tokio runtime. It exits once every
    /// clone of the returned queue has been dropped.
    pub fn spawn(runner: Arc<dyn MaintenanceRunner>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                run_job(runner.as_ref(), job).await;
            }
            debug!("maintenance worker stopped");
        });
        Self { tx }
    }

    /// Queue `kind` for execution, waiting for a free slot.
    pub async fn submit(&self, kind: MaintenanceKind) -> IndexResult<TaskHandle> {
        let (job, handle) = new_job(kind);
        self.tx.send(job).await.map_err(|_| IndexError::QueueClosed)?;
        info!(task_id = %handle.id, %kind, "maintenance task queued");
        Ok(handle)
    }

    /// Queue `kind` without waiting; fails with [`IndexError::QueueFull`]
    /// when every slot is taken.
    pub fn try_submit(&self, kind: MaintenanceKind) -> IndexResult<TaskHandle> {
        let (job, handle) = new_job(kind);
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => IndexError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => IndexError::QueueClosed,
        })?;
        info!(task_id = %handle.id, %kind, "maintenance task queued");
        Ok(handle)
    }
}

fn new_job(kind: MaintenanceKind) -> (Job, TaskHandle) {
    let id = Uuid::now_v7();
    let (state_tx, state_rx) = watch::channel(TaskState::Queued);
    let job = Job {
        id,
        kind,
        state: state_tx,
    };
    let handle = TaskHandle {
        id,
        kind,
        state: state_rx,
    };
    (job, handle)
}

async fn run_job(runner: &dyn MaintenanceRunner, job: Job) {
    job.state.send_replace(TaskState::Running);
    info!(task_id = %job.id, kind = %job.kind, "maintenance task started");
    let finished = match runner.run_task(job.kind).await {
        Ok(report) => {
            info!(task_id = %job.id, kind = %job.kind, "maintenance task succeeded");
            TaskState::Succeeded(report)
        }
        Err(e) => {
            error!(task_id = %job.id, kind = %job.kind, error = %e, "maintenance task failed");
            TaskState::Failed(e.to_string())
        }
    };
    job.state.send_replace(finished);
}
