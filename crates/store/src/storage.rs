//! Object storage backend abstraction (local filesystem/memory).

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore as Backend;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::name::{Kind, ObjectName};

/// Configuration for the object storage backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// In-memory storage (for testing)
    #[default]
    Memory,

    /// Local filesystem storage, typically a directory watched by a sync tool
    Local {
        /// Path to the storage directory
        path: PathBuf,
    },
}

/// Wrapper around the object storage backend.
#[derive(Debug, Clone)]
pub(crate) struct Storage {
    inner: Arc<dyn Backend>,
}

impl Storage {
    /// Create a new storage backend from configuration.
    pub async fn new(config: StorageConfig) -> Result<Self> {
        let inner: Arc<dyn Backend> = match &config {
            StorageConfig::Memory => Arc::new(InMemory::new()),

            StorageConfig::Local { path } => {
                // Ensure directory exists
                tokio::fs::create_dir_all(path).await?;
                Arc::new(
                    LocalFileSystem::new_with_prefix(path)
                        .map_err(|e| StoreError::InvalidConfig(e.to_string()))?,
                )
            }
        };

        Ok(Self { inner })
    }

    /// Build the object path for a named object in a namespace.
    fn object_path(kind: Kind, name: &ObjectName) -> ObjectPath {
        ObjectPath::from(format!("{}/{}", kind.prefix(), name))
    }

    /// Put object bytes into storage.
    pub async fn put(&self, kind: Kind, name: &ObjectName, data: Bytes) -> Result<()> {
        let path = Self::object_path(kind, name);
        self.inner.put(&path, data.into()).await?;
        Ok(())
    }

    /// Get object bytes from storage.
    pub async fn get(&self, kind: Kind, name: &ObjectName) -> Result<Option<Bytes>> {
        let path = Self::object_path(kind, name);
        match self.inner.get(&path).await {
            Ok(result) => {
                let bytes = result.bytes().await?;
                Ok(Some(bytes))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Check whether an object exists without reading it.
    pub async fn has(&self, kind: Kind, name: &ObjectName) -> Result<bool> {
        let path = Self::object_path(kind, name);
        match self.inner.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete an object from storage.
    pub async fn delete(&self, kind: Kind, name: &ObjectName) -> Result<()> {
        let path = Self::object_path(kind, name);
        // Ignore NotFound errors - the object may already be deleted
        match self.inner.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// List all object file names in a namespace.
    pub async fn list_names(&self, kind: Kind) -> Result<Vec<String>> {
        use futures::TryStreamExt;

        let prefix = ObjectPath::from(format!("{}/", kind.prefix()));
        let stream = self.inner.list(Some(&prefix));

        let items: Vec<_> = stream.try_collect().await?;

        let names = items
            .into_iter()
            .filter_map(|meta| {
                let path = meta.location.as_ref();
                path.rsplit('/').next().map(|s| s.to_string())
            })
            .collect();

        Ok(names)
    }
}
