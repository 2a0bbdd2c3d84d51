//! Key-value object store adapters for fidx.
//!
//! The object store is the authoritative home of every file record: one key
//! per file, with the file's metadata attached to the key so that listing
//! does not require reading values. The index crate only ever talks to the
//! store through the [`KvStore`] trait.
//!
//! # Backends
//!
//! - [`InMemoryKvStore`] -- `BTreeMap`-based store for tests and embedding
//! - [`DirKvStore`] -- one file pair per key under a root directory
//!
//! # Design Rules
//!
//! 1. `list` returns keys in ascending lexicographic order.
//! 2. Cursors are opaque to callers; `None` means the listing is complete.
//! 3. The store never interprets values or metadata.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod dir;
pub mod entry;
pub mod error;
pub mod memory;
pub mod traits;

pub use dir::DirKvStore;
pub use entry::{KeyEntry, ListOptions, ListPage, StoredValue};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryKvStore;
pub use traits::KvStore;
