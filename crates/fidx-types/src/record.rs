//! File records and their metadata.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TypeError;
use crate::keys::is_reserved_key;
use crate::temporal::Timestamp;

/// Metadata attached to every file key in the object store.
///
/// Field names follow the store's existing PascalCase convention
/// (`TimeStamp`, `FileType`, ...). Fields the index does not filter on are
/// preserved verbatim in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileMetadata {
    /// Upload time. Records without one are not indexed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_type: Option<String>,
    /// Opaque fields carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FileMetadata {
    /// Metadata stamped with the given upload time.
    pub fn new(time_stamp: Timestamp) -> Self {
        Self {
            time_stamp: Some(time_stamp),
            ..Default::default()
        }
    }

    pub fn with_file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = Some(file_type.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_list_type(mut self, list_type: impl Into<String>) -> Self {
        self.list_type = Some(list_type.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A file entry: the store key plus its metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path-like store key, unique across the store.
    pub id: String,
    pub metadata: FileMetadata,
}

impl FileRecord {
    /// Create a record, rejecting ids that cannot name a file.
    pub fn new(id: impl Into<String>, metadata: FileMetadata) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::EmptyId);
        }
        if id.ends_with('/') {
            return Err(TypeError::DirectoryId(id));
        }
        Ok(Self { id, metadata })
    }

    /// Whether this record belongs in the index: not a reserved key and
    /// carrying an upload timestamp.
    pub fn is_indexable(&self) -> bool {
        !is_reserved_key(&self.id) && self.metadata.time_stamp.is_some()
    }

    /// Final path segment of the id.
    pub fn file_name(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.metadata.tags.contains(tag)
    }
}
