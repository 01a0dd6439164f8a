//! Object storage collaborator.
//!
//! The core only needs two operations: fetch the bytes of an object, and
//! write bytes under a key. Key filtering and key derivation are pure string
//! transforms in [`crate::naming`], not a backend concern.
//!
//! Two backends ship with the crate:
//! - [`MemoryObjectStore`] — a map in memory, for tests and embedding
//! - [`LocalObjectStore`]  — one directory per container on the local disk

use crate::error::StorageError;
use crate::naming::StorageObjectRef;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Read/write access to blobs in object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the bytes of an object.
    async fn get(&self, object: &StorageObjectRef) -> Result<Vec<u8>, StorageError>;

    /// Create or replace an object.
    async fn put(
        &self,
        object: &StorageObjectRef,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;
}

/// A stored blob plus the content type it was written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// In-memory object store.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<StorageObjectRef, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without going through the async API.
    pub fn insert(&self, object: StorageObjectRef, bytes: Vec<u8>, content_type: &str) {
        self.lock().insert(
            object,
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
    }

    /// A copy of the object, if present.
    pub fn object(&self, object: &StorageObjectRef) -> Option<StoredObject> {
        self.lock().get(object).cloned()
    }

    /// All keys currently stored, sorted.
    pub fn keys(&self) -> Vec<StorageObjectRef> {
        let mut keys: Vec<_> = self.lock().keys().cloned().collect();
        keys.sort_by(|a, b| (&a.container, &a.key).cmp(&(&b.container, &b.key)));
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<StorageObjectRef, StoredObject>> {
        // A poisoned map is still structurally valid; keep serving it.
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, object: &StorageObjectRef) -> Result<Vec<u8>, StorageError> {
        self.lock()
            .get(object)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StorageError::NotFound {
                container: object.container.clone(),
                key: object.key.clone(),
            })
    }

    async fn put(
        &self,
        object: &StorageObjectRef,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.insert(object.clone(), bytes, content_type);
        Ok(())
    }
}

/// Object store rooted at a local directory: `<root>/<container>/<key>`.
///
/// Writes are atomic (temp file + rename) so a reader never sees a partially
/// written image. The content type is not recorded; the file extension
/// carries it.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an object reference to a path, refusing anything that would
    /// escape the root.
    pub fn path_for(&self, object: &StorageObjectRef) -> Result<PathBuf, StorageError> {
        let mut path = self.root.clone();
        for (part, label) in [(&object.container, "container"), (&object.key, "key")] {
            let rel = Path::new(part.as_str());
            if part.is_empty() {
                return Err(invalid_key(object, &format!("empty {label}")));
            }
            for component in rel.components() {
                match component {
                    Component::Normal(seg) => path.push(seg),
                    _ => {
                        return Err(invalid_key(
                            object,
                            &format!("{label} must be a relative path without '..'"),
                        ))
                    }
                }
            }
        }
        Ok(path)
    }
}

fn invalid_key(object: &StorageObjectRef, reason: &str) -> StorageError {
    StorageError::InvalidKey {
        key: object.to_string(),
        reason: reason.to_string(),
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, object: &StorageObjectRef) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(object)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                container: object.container.clone(),
                key: object.key.clone(),
            }),
            Err(e) => Err(StorageError::Io { path, source: e }),
        }
    }

    async fn put(
        &self,
        object: &StorageObjectRef,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let path = self.path_for(object)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        // Atomic write: unique temp file in the target directory, then rename.
        // Distinct sources can map to the same output key, so the temp name
        // must not be derived from the key.
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        let target = path.clone();
        let size = bytes.len();
        tokio::task::spawn_blocking(move || write_atomic(&dir, &target, &bytes))
            .await
            .map_err(|e| StorageError::Backend(format!("write task failed: {e}")))??;

        debug!(
            "Stored {} ({} bytes, {})",
            path.display(),
            size,
            content_type
        );
        Ok(())
    }
}

fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let io_error = |path: &Path, source: std::io::Error| StorageError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
    tmp.write_all(bytes).map_err(|e| io_error(tmp.path(), e))?;
    tmp.persist(target).map_err(|e| io_error(target, e.error))?;
    Ok(())
}
