//! Foundation types for fidx.
//!
//! This crate provides the record, operation, and key-naming types shared by
//! every other fidx crate. It performs no I/O.
//!
//! # Key Types
//!
//! - [`FileRecord`]: A file entry as held by the object store and mirrored by the index
//! - [`FileMetadata`]: Per-key metadata the index filters on (timestamp, tags, channel, ...)
//! - [`OperationLogEntry`]: A pending add/delete/move mutation awaiting merge
//! - [`Timestamp`]: Wall-clock milliseconds since the UNIX epoch
//!
//! Key and path helpers live in [`keys`].

pub mod error;
pub mod keys;
pub mod operation;
pub mod record;
pub mod temporal;

pub use error::TypeError;
pub use keys::{is_reserved_key, normalize_directory, CHUNK_PREFIX, MANAGE_PREFIX};
pub use operation::{OpKind, OperationLogEntry};
pub use record::{FileMetadata, FileRecord};
pub use temporal::Timestamp;
