//! Pending mutations recorded by write handlers and folded in by merge.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;
use crate::record::{FileMetadata, FileRecord};
use crate::temporal::Timestamp;

/// Kind of a logged mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// Upsert `id` with `payload`.
    Add,
    /// Remove `id` if present.
    Delete,
    /// Remove `from`, then upsert `id` with `payload`.
    Move,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Move => "move",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the operation log.
///
/// `op_id` is a UUID v7, so ids sort in creation order; together with
/// `logged_at` it defines the order in which merge applies entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub op_id: Uuid,
    pub kind: OpKind,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<FileMetadata>,
    /// Source id of a move.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub logged_at: Timestamp,
}

impl OperationLogEntry {
    fn build(kind: OpKind, id: String, payload: Option<FileMetadata>, from: Option<String>) -> Self {
        Self {
            op_id: Uuid::now_v7(),
            kind,
            id,
            payload,
            from,
            logged_at: Timestamp::now(),
        }
    }

    pub fn add(record: FileRecord) -> Self {
        Self::build(OpKind::Add, record.id, Some(record.metadata), None)
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Self::build(OpKind::Delete, id.into(), None, None)
    }

    /// A rename of `from` to `record.id`.
    pub fn moved(from: impl Into<String>, record: FileRecord) -> Self {
        Self::build(OpKind::Move, record.id, Some(record.metadata), Some(from.into()))
    }

    /// The record this entry upserts, for `add` and `move`.
    pub fn record(&self) -> Result<Option<FileRecord>, TypeError> {
        match self.kind {
            OpKind::Delete => Ok(None),
            OpKind::Add | OpKind::Move => {
                let metadata = self
                    .payload
                    .clone()
                    .ok_or(TypeError::MissingPayload { kind: self.kind.as_str() })?;
                FileRecord::new(self.id.clone(), metadata).map(Some)
            }
        }
    }
}
