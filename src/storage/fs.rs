use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::{ObjectData, ObjectMeta, ObjectPage, ObjectStore, ObjectSummary, PutOptions, StorageError};

/// Filesystem-backed object store.
///
/// Payloads live under `objects/<key>` and the HTTP metadata recorded at
/// `put` time lives in a JSON sidecar under `meta/<key>.json`. Both are
/// written atomically (tempfile + rename) so a crash never leaves a
/// half-written object visible.
pub struct FsStore {
    base_path: PathBuf,
}

/// Sidecar contents. Size and mtime come from the filesystem instead.
#[derive(Debug, Serialize, Deserialize, Default)]
struct Sidecar {
    content_type: Option<String>,
    cache_control: Option<String>,
}

impl FsStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Initialize directory structure
    pub async fn init(&self) -> Result<(), StorageError> {
        fs::create_dir_all(self.base_path.join("objects")).await?;
        fs::create_dir_all(self.base_path.join("meta")).await?;
        Ok(())
    }

    /// Validate a key's path segments and resolve it under `root`.
    /// Keys are `/`-separated; dot segments would escape the store root
    /// and are rejected outright.
    fn resolve(&self, root: &str, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        let mut path = self.base_path.join(root);
        for part in key.split('/') {
            if part.is_empty() || part == "." || part == ".." {
                return Err(StorageError::InvalidKey(format!(
                    "unsafe path segment in {key:?}"
                )));
            }
            path.push(part);
        }
        Ok(path)
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        self.resolve("objects", key)
    }

    fn sidecar_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let mut path = self.resolve("meta", key)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.set_file_name(format!("{name}.json"));
        Ok(path)
    }

    /// Atomic write: write to tempfile, then rename
    async fn atomic_write(&self, path: &Path, data: &[u8]) -> std::io::Result<()> {
        let parent = path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
        })?;
        fs::create_dir_all(parent).await?;

        let temp = tempfile::NamedTempFile::new_in(parent)?;
        fs::write(temp.path(), data).await?;
        temp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    async fn read_sidecar(&self, key: &str) -> Result<Sidecar, StorageError> {
        let path = self.sidecar_path(key)?;
        match fs::read(&path).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw).unwrap_or_default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Sidecar::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Every key under `objects/`, sorted ascending.
    async fn walk_keys(&self) -> Result<Vec<String>, StorageError> {
        let root = self.base_path.join("objects");
        let mut keys = Vec::new();
        let mut stack = vec![root.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // An uninitialized store lists as empty.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound && dir == root => {
                    return Ok(keys);
                }
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(entry.path());
                } else if file_type.is_file()
                    && let Ok(rel) = entry.path().strip_prefix(&root)
                {
                    let key = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn meta_for(&self, key: &str, path: &Path) -> Result<ObjectMeta, StorageError> {
        let metadata = fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound
            } else {
                StorageError::Io(e)
            }
        })?;
        let sidecar = self.read_sidecar(key).await?;

        Ok(ObjectMeta {
            size: metadata.len(),
            content_type: sidecar.content_type,
            cache_control: sidecar.cache_control,
            last_modified: metadata
                .modified()
                .ok()
                .and_then(|t| Timestamp::try_from(t).ok()),
        })
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn get(&self, key: &str) -> Result<ObjectData, StorageError> {
        let path = self.object_path(key)?;
        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound
            } else {
                StorageError::Io(e)
            }
        })?;
        let meta = self.meta_for(key, &path).await?;
        Ok(ObjectData {
            data: Bytes::from(data),
            meta,
        })
    }

    async fn put(&self, key: &str, data: Bytes, opts: PutOptions) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        self.atomic_write(&path, &data).await?;

        let sidecar = Sidecar {
            content_type: opts.content_type,
            cache_control: opts.cache_control,
        };
        let encoded = serde_json::to_vec(&sidecar)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.atomic_write(&self.sidecar_path(key)?, &encoded).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        // Sidecar removal is best-effort; an orphaned sidecar is invisible
        // once the payload is gone.
        let _ = fs::remove_file(self.sidecar_path(key)?).await;
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, StorageError> {
        let path = self.object_path(key)?;
        self.meta_for(key, &path).await
    }

    async fn list(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ObjectPage, StorageError> {
        let keys = self.walk_keys().await?;
        let mut matching = keys
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .skip_while(|k| match cursor {
                Some(c) => k.as_str() <= c,
                None => false,
            });

        let page_keys: Vec<String> = matching.by_ref().take(limit).collect();
        let more = matching.next().is_some();

        let mut objects = Vec::with_capacity(page_keys.len());
        for key in page_keys {
            let path = self.object_path(&key)?;
            let meta = self.meta_for(&key, &path).await?;
            objects.push(ObjectSummary {
                key,
                size: meta.size,
                last_modified: meta.last_modified,
            });
        }

        let cursor = if more {
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };
        Ok(ObjectPage { objects, cursor })
    }
}
