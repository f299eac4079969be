use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use jiff::Timestamp;

use super::{ObjectData, ObjectMeta, ObjectPage, ObjectStore, ObjectSummary, PutOptions, StorageError};

/// In-memory object store.
///
/// Intended for tests and embedding. Objects live in a `BTreeMap` behind a
/// `RwLock`, which makes listings naturally sorted; payloads are `Bytes`
/// so reads are cheap clones.
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    cache_control: Option<String>,
    last_modified: Timestamp,
}

impl StoredObject {
    fn meta(&self) -> ObjectMeta {
        ObjectMeta {
            size: self.data.len() as u64,
            content_type: self.content_type.clone(),
            cache_control: self.cache_control.clone(),
            last_modified: Some(self.last_modified),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("object_count", &self.len())
            .finish()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<ObjectData, StorageError> {
        let map = self.objects.read().expect("lock poisoned");
        let obj = map.get(key).ok_or(StorageError::NotFound)?;
        Ok(ObjectData {
            data: obj.data.clone(),
            meta: obj.meta(),
        })
    }

    async fn put(&self, key: &str, data: Bytes, opts: PutOptions) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        let mut map = self.objects.write().expect("lock poisoned");
        map.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: opts.content_type,
                cache_control: opts.cache_control,
                last_modified: Timestamp::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut map = self.objects.write().expect("lock poisoned");
        map.remove(key);
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, StorageError> {
        let map = self.objects.read().expect("lock poisoned");
        map.get(key).map(StoredObject::meta).ok_or(StorageError::NotFound)
    }

    async fn list(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ObjectPage, StorageError> {
        let map = self.objects.read().expect("lock poisoned");
        let lower = match cursor {
            Some(c) => Bound::Excluded(c.to_string()),
            None => Bound::Unbounded,
        };

        let mut matching = map
            .range((lower, Bound::Unbounded))
            .filter(|(k, _)| k.starts_with(prefix));

        let mut objects = Vec::new();
        for (key, obj) in matching.by_ref().take(limit) {
            objects.push(ObjectSummary {
                key: key.clone(),
                size: obj.data.len() as u64,
                last_modified: Some(obj.last_modified),
            });
        }
        let cursor = if matching.next().is_some() {
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };
        Ok(ObjectPage { objects, cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_overwrites_in_place() {
        let store = MemoryStore::new();
        store
            .put("a.png", Bytes::from_static(b"v1"), PutOptions::default())
            .await
            .unwrap();
        store
            .put("a.png", Bytes::from_static(b"v2"), PutOptions::default())
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(&store.get("a.png").await.unwrap().data[..], b"v2");
    }

    #[tokio::test]
    async fn list_pagination_walks_all_keys() {
        let store = MemoryStore::new();
        for i in 0..7 {
            store
                .put(
                    &format!("k{i}.png"),
                    Bytes::from_static(b"x"),
                    PutOptions::default(),
                )
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = store.list("", cursor.as_deref(), 3).await.unwrap();
            seen.extend(page.objects.into_iter().map(|o| o.key));
            match page.cursor {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        assert_eq!(seen.len(), 7);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }
}
