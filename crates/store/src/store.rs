//! The content-addressable object store.

use std::path::Path;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::name::{Kind, ObjectName};
use crate::storage::{Storage, StorageConfig};

/// Append-only store mapping content hashes to immutable encrypted blobs.
///
/// `put` names each object by the BLAKE3 hash of its bytes and is idempotent:
/// writing content that already exists is a successful no-op, which also makes
/// concurrent identical writes safe without a global lock. `get` re-hashes on
/// every read and refuses to return bytes that do not match their name.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    storage: Storage,
}

impl ObjectStore {
    /// Create a store from a backend configuration.
    pub async fn new(config: StorageConfig) -> Result<Self> {
        let storage = Storage::new(config).await?;
        Ok(Self { storage })
    }

    /// Create a store backed by a local directory.
    pub async fn local(path: &Path) -> Result<Self> {
        Self::new(StorageConfig::Local {
            path: path.to_path_buf(),
        })
        .await
    }

    /// Create a fully ephemeral in-memory store. Useful for testing.
    pub async fn memory() -> Result<Self> {
        Self::new(StorageConfig::Memory).await
    }

    /// Store an object and return its content-derived name.
    ///
    /// If an object with the same content already exists the call succeeds
    /// without writing anything.
    pub async fn put(&self, kind: Kind, bytes: Vec<u8>) -> Result<ObjectName> {
        let name = ObjectName::of(&bytes);
        let size = bytes.len();

        if self.storage.has(kind, &name).await? {
            debug!(kind = ?kind, name = %name, "object already present, skipping write");
            return Ok(name);
        }

        self.storage.put(kind, &name, Bytes::from(bytes)).await?;
        debug!(kind = ?kind, name = %name, size = size, "object stored");
        Ok(name)
    }

    /// Retrieve an object, verifying its content hash.
    pub async fn get(&self, kind: Kind, name: &ObjectName) -> Result<Vec<u8>> {
        let bytes = self
            .storage
            .get(kind, name)
            .await?
            .ok_or(StoreError::NotFound(*name))?;

        let computed = ObjectName::of(&bytes);
        if computed != *name {
            return Err(StoreError::Corrupt {
                name: *name,
                computed,
            });
        }

        Ok(bytes.to_vec())
    }

    /// Check whether an object is present.
    pub async fn has(&self, kind: Kind, name: &ObjectName) -> Result<bool> {
        self.storage.has(kind, name).await
    }

    /// Enumerate all objects currently present in a namespace.
    ///
    /// File names that do not parse as content hashes are skipped with a
    /// warning; foreign files on the sync medium must not halt enumeration.
    pub async fn list(&self, kind: Kind) -> Result<Vec<ObjectName>> {
        let raw = self.storage.list_names(kind).await?;
        let mut names = Vec::with_capacity(raw.len());

        for s in raw {
            match s.parse::<ObjectName>() {
                Ok(name) => names.push(name),
                Err(_) => {
                    warn!(kind = ?kind, file = %s, "file name is not a content hash, skipping");
                }
            }
        }

        Ok(names)
    }

    /// Remove an object. Deleting a non-existent object is a no-op.
    pub async fn delete(&self, kind: Kind, name: &ObjectName) -> Result<()> {
        self.storage.delete(kind, name).await?;
        debug!(kind = ?kind, name = %name, "object deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = ObjectStore::memory().await.unwrap();

        let data = b"encrypted object bytes".to_vec();
        let name = store.put(Kind::Data, data.clone()).await.unwrap();

        assert_eq!(name, ObjectName::of(&data));
        let retrieved = store.get(Kind::Data, &name).await.unwrap();
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let store = ObjectStore::memory().await.unwrap();

        let data = b"same content twice".to_vec();
        let first = store.put(Kind::Data, data.clone()).await.unwrap();
        let second = store.put(Kind::Data, data).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.list(Kind::Data).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = ObjectStore::memory().await.unwrap();
        let name = ObjectName::of(b"never stored");

        let err = store.get(Kind::Data, &name).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(n) if n == name));
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let store = ObjectStore::memory().await.unwrap();
        let name = ObjectName::of(b"never stored");

        store.delete(Kind::Data, &name).await.unwrap();
    }

    #[tokio::test]
    async fn test_namespaces_are_independent() {
        let store = ObjectStore::memory().await.unwrap();

        let data = b"shared bytes".to_vec();
        let name = store.put(Kind::Data, data.clone()).await.unwrap();

        assert!(store.get(Kind::Header, &name).await.is_err());
        assert_eq!(store.list(Kind::Header).await.unwrap().len(), 0);

        let header_name = store.put(Kind::Header, data).await.unwrap();
        assert_eq!(header_name, name);
        store.delete(Kind::Header, &name).await.unwrap();
        assert!(store.get(Kind::Data, &name).await.is_ok());
    }

    #[tokio::test]
    async fn test_local_store_layout() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::local(temp_dir.path()).await.unwrap();

        let data = b"on disk".to_vec();
        let name = store.put(Kind::Data, data.clone()).await.unwrap();

        let file_path = temp_dir.path().join("data").join(name.to_string());
        assert!(file_path.exists());

        let retrieved = store.get(Kind::Data, &name).await.unwrap();
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn test_out_of_band_corruption_detected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::local(temp_dir.path()).await.unwrap();

        let name = store.put(Kind::Data, b"original".to_vec()).await.unwrap();

        let file_path = temp_dir.path().join("data").join(name.to_string());
        tokio::fs::write(&file_path, b"tampered").await.unwrap();

        let err = store.get(Kind::Data, &name).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { name: n, .. } if n == name));
    }

    #[tokio::test]
    async fn test_list_skips_foreign_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::local(temp_dir.path()).await.unwrap();

        let name = store.put(Kind::Data, b"real object".to_vec()).await.unwrap();

        // a sync tool's stray metadata file
        tokio::fs::write(temp_dir.path().join("data").join(".sync-conflict"), b"x")
            .await
            .unwrap();

        let names = store.list(Kind::Data).await.unwrap();
        assert_eq!(names, vec![name]);
    }
}
