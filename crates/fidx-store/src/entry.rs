use bytes::Bytes;
use fidx_types::FileMetadata;

/// A value read back from the store together with its key metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredValue {
    pub value: Bytes,
    pub metadata: Option<FileMetadata>,
}

/// One key returned by a listing.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyEntry {
    pub name: String,
    pub metadata: Option<FileMetadata>,
}

/// Parameters of a paginated listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListOptions {
    /// Only keys starting with this prefix are returned.
    pub prefix: String,
    /// Maximum number of keys per page.
    pub limit: usize,
    /// Cursor returned by the previous page, `None` for the first page.
    pub cursor: Option<String>,
}

impl ListOptions {
    pub fn new(prefix: impl Into<String>, limit: usize) -> Self {
        Self {
            prefix: prefix.into(),
            limit,
            cursor: None,
        }
    }

    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }
}

/// A page of listed keys.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListPage {
    pub keys: Vec<KeyEntry>,
    /// Cursor for the next page; `None` once the listing is exhausted.
    pub cursor: Option<String>,
}

impl ListPage {
    pub fn is_complete(&self) -> bool {
        self.cursor.is_none()
    }
}
