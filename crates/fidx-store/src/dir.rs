//! Directory-backed key-value store.
//!
//! Each key is stored as a pair of files named after the hex encoding of the
//! key: `<hex>.val` holds the raw value and `<hex>.meta` the JSON metadata.
//! Hex names keep arbitrary keys (slashes, `@`) filesystem-safe. Keys whose
//! hex form would overflow a file name use a digest stem instead, with the
//! real key in a `<stem>.key` sidecar. Writes go through a temporary file and
//! a rename so a crash never leaves a torn value.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use fidx_types::FileMetadata;
use tokio::fs;
use tracing::debug;

use crate::entry::{KeyEntry, ListOptions, ListPage, StoredValue};
use crate::error::{StoreError, StoreResult};
use crate::traits::KvStore;

const VALUE_EXT: &str = "val";
const META_EXT: &str = "meta";
const KEY_EXT: &str = "key";

/// Longest hex stem used as is. Leaves room for extensions and the temporary
/// suffix under the common 255-byte file name limit.
const MAX_HEX_STEM: usize = 200;
/// Hex characters of the key kept in a digest stem, for readable listings.
const DIGEST_PREFIX: usize = 64;

/// File stem for `key`, and whether it is a digest stem.
fn stem_for(key: &str) -> (String, bool) {
    let hex = hex::encode(key.as_bytes());
    if hex.len() <= MAX_HEX_STEM {
        return (hex, false);
    }
    let digest = format!(
        "{}-{:08x}-{:x}",
        &hex[..DIGEST_PREFIX],
        crc32fast::hash(key.as_bytes()),
        key.len()
    );
    (digest, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotOwner {
    Key,
    Other,
    Vacant,
}

/// Key-value store persisted under a single directory.
///
/// Listing reads the whole directory on every page, which is fine for the
/// local and test deployments this backend targets.
#[derive(Debug, Clone)]
pub struct DirKvStore {
    root: PathBuf,
}

impl DirKvStore {
    /// Open (or create) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str, ext: &str) -> StoreResult<PathBuf> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{}.{ext}", stem_for(key).0)))
    }

    /// Whether the files for `key` belong to it. Only digest stems can be
    /// shared, so only they are checked against their key sidecar.
    async fn owns_slot(&self, key: &str) -> StoreResult<SlotOwner> {
        if !stem_for(key).1 {
            return Ok(SlotOwner::Key);
        }
        match fs::read(self.path_for(key, KEY_EXT)?).await {
            Ok(raw) if raw == key.as_bytes() => Ok(SlotOwner::Key),
            Ok(_) => Ok(SlotOwner::Other),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(SlotOwner::Vacant),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_atomic(path: &Path, data: &[u8]) -> StoreResult<()> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_metadata(path: &Path) -> StoreResult<Option<FileMetadata>> {
        match fs::read(path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_if_present(path: &Path) -> StoreResult<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// All keys currently on disk, sorted.
    async fn all_keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(VALUE_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let decoded = match hex::decode(stem) {
                Ok(raw) => String::from_utf8(raw).ok(),
                Err(_) => match fs::read(path.with_extension(KEY_EXT)).await {
                    Ok(raw) => String::from_utf8(raw).ok(),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                    Err(e) => return Err(e.into()),
                },
            };
            match decoded {
                Some(key) => keys.push(key),
                None => debug!(path = %path.display(), "skipping foreign file in store root"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl KvStore for DirKvStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredValue>> {
        if self.owns_slot(key).await? == SlotOwner::Other {
            return Ok(None);
        }
        let value_path = self.path_for(key, VALUE_EXT)?;
        let value = match fs::read(&value_path).await {
            Ok(raw) => Bytes::from(raw),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let metadata = Self::read_metadata(&self.path_for(key, META_EXT)?).await?;
        Ok(Some(StoredValue { value, metadata }))
    }

    async fn put(&self, key: &str, value: Bytes, metadata: Option<FileMetadata>) -> StoreResult<()> {
        match self.owns_slot(key).await? {
            SlotOwner::Key => {}
            SlotOwner::Vacant => {
                Self::write_atomic(&self.path_for(key, KEY_EXT)?, key.as_bytes()).await?
            }
            SlotOwner::Other => {
                return Err(StoreError::Backend(format!("file name collision for key {key}")));
            }
        }
        let meta_path = self.path_for(key, META_EXT)?;
        match metadata {
            Some(meta) => Self::write_atomic(&meta_path, &serde_json::to_vec(&meta)?).await?,
            None => {
                Self::remove_if_present(&meta_path).await?;
            }
        }
        Self::write_atomic(&self.path_for(key, VALUE_EXT)?, &value).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        if self.owns_slot(key).await? == SlotOwner::Other {
            return Ok(false);
        }
        let existed = Self::remove_if_present(&self.path_for(key, VALUE_EXT)?).await?;
        Self::remove_if_present(&self.path_for(key, META_EXT)?).await?;
        Self::remove_if_present(&self.path_for(key, KEY_EXT)?).await?;
        Ok(existed)
    }

    async fn list(&self, options: ListOptions) -> StoreResult<ListPage> {
        let limit = options.limit.max(1);
        let mut matching = self.all_keys().await?.into_iter().filter(|key| {
            key.starts_with(&options.prefix)
                && options.cursor.as_ref().map_or(true, |cursor| key > cursor)
        });

        let names: Vec<String> = matching.by_ref().take(limit).collect();
        let more = matching.next().is_some();

        let mut keys = Vec::with_capacity(names.len());
        for name in names {
            let metadata = Self::read_metadata(&self.path_for(&name, META_EXT)?).await?;
            keys.push(KeyEntry { name, metadata });
        }

        let cursor = if more {
            keys.last().map(|k| k.name.clone())
        } else {
            None
        };
        Ok(ListPage { keys, cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fidx_types::Timestamp;

    fn meta(ms: i64) -> Option<FileMetadata> {
        Some(FileMetadata::new(Timestamp::from_millis(ms)).with_tags(["x"]))
    }

    #[tokio::test]
    async fn put_get_roundtrip_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirKvStore::open(dir.path()).await.unwrap();
        store.put("docs/a.txt", Bytes::from_static(b"body"), meta(3)).await.unwrap();

        let read_back = store.get("docs/a.txt").await.unwrap().unwrap();
        assert_eq!(read_back.value, Bytes::from_static(b"body"));
        assert_eq!(read_back.metadata, meta(3));
    }

    #[tokio::test]
    async fn reopen_sees_existing_keys() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = DirKvStore::open(dir.path()).await.unwrap();
            store.put("manage@index@meta", Bytes::from_static(b"{}"), None).await.unwrap();
        }
        let store = DirKvStore::open(dir.path()).await.unwrap();
        let read_back = store.get("manage@index@meta").await.unwrap().unwrap();
        assert!(read_back.metadata.is_none());
    }

    #[tokio::test]
    async fn clearing_metadata_removes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirKvStore::open(dir.path()).await.unwrap();
        store.put("k", Bytes::from_static(b"1"), meta(1)).await.unwrap();
        store.put("k", Bytes::from_static(b"2"), None).await.unwrap();
        assert!(store.get("k").await.unwrap().unwrap().metadata.is_none());
    }

    #[tokio::test]
    async fn delete_removes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirKvStore::open(dir.path()).await.unwrap();
        store.put("k", Bytes::from_static(b"1"), meta(1)).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn list_pages_in_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirKvStore::open(dir.path()).await.unwrap();
        for key in ["img/c.png", "docs/b.txt", "docs/a.txt"] {
            store.put(key, Bytes::new(), meta(1)).await.unwrap();
        }

        let first = store.list(ListOptions::new("", 2)).await.unwrap();
        let names: Vec<&str> = first.keys.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["docs/a.txt", "docs/b.txt"]);
        assert_eq!(first.keys[0].metadata, meta(1));

        let second = store
            .list(ListOptions::new("", 2).with_cursor(first.cursor))
            .await
            .unwrap();
        assert_eq!(second.keys.len(), 1);
        assert_eq!(second.keys[0].name, "img/c.png");
        assert!(second.is_complete());
    }

    #[tokio::test]
    async fn long_keys_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirKvStore::open(dir.path()).await.unwrap();
        let long = format!("photos/2024/{}.jpg", "风景".repeat(20));
        let other = format!("photos/2024/{}.jpg", "风景".repeat(21));
        store.put(&long, Bytes::from_static(b"a"), meta(1)).await.unwrap();
        store.put(&other, Bytes::from_static(b"b"), None).await.unwrap();
        store.put("short", Bytes::new(), None).await.unwrap();

        for entry in std::fs::read_dir(dir.path()).unwrap() {
            assert!(entry.unwrap().file_name().len() < 255);
        }

        let read_back = store.get(&long).await.unwrap().unwrap();
        assert_eq!(read_back.value, Bytes::from_static(b"a"));
        assert_eq!(read_back.metadata, meta(1));

        let page = store.list(ListOptions::new("photos/", 10)).await.unwrap();
        let names: Vec<&str> = page.keys.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec![long.as_str(), other.as_str()]);

        assert!(store.delete(&long).await.unwrap());
        assert!(store.get(&long).await.unwrap().is_none());
        assert!(store.delete(&other).await.unwrap());
        assert!(store.delete("short").await.unwrap());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirKvStore::open(dir.path()).await.unwrap();
        let err = store.put("", Bytes::new(), None).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }
}
