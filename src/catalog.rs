//! The derived icon manifest.
//!
//! The manifest is a single JSON object persisted at a reserved key in the
//! same store it indexes. It is never patched: after every successful
//! mutation the whole key space is re-listed and the manifest regenerated,
//! so whatever gets saved always reflects a real snapshot of the store.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::{Result, ServiceError};
use crate::key;
use crate::storage::{ObjectStore, PutOptions};

/// One catalog line: a stored key and its derived public URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub url: String,
}

/// The persisted manifest. Field names are the wire format consumed by
/// clients; `icons` is sorted ascending by name and `count` always equals
/// its length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub title: String,
    #[serde(rename = "desc")]
    pub description: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: Timestamp,
    pub count: usize,
    pub icons: Vec<CatalogEntry>,
}

/// Rebuild the catalog from the ground truth of the store.
///
/// Lists the entire key space page by page, keeps the keys with allowed
/// image extensions (the manifest's own key never qualifies), and sorts
/// byte-lexicographically. The page loop is bounded by
/// `config.max_list_pages`: a store too large to scan fails loudly instead
/// of yielding a partial manifest.
pub async fn rebuild<S: ObjectStore>(store: &S, config: &Config) -> Result<Catalog> {
    let mut icons = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        if pages >= config.max_list_pages {
            return Err(ServiceError::ListOverflow(config.max_list_pages));
        }
        let page = store
            .list("", cursor.as_deref(), config.list_page_size)
            .await?;
        pages += 1;

        for obj in page.objects {
            if key::is_image_key(&obj.key, config) {
                icons.push(CatalogEntry {
                    url: config.public_url(&obj.key),
                    name: obj.key,
                });
            }
        }

        match page.cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    icons.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(count = icons.len(), pages, "rebuilt catalog");

    Ok(Catalog {
        title: config.title.clone(),
        description: config.description.clone(),
        updated_at: Timestamp::now(),
        count: icons.len(),
        icons,
    })
}

/// Persist the catalog at the reserved manifest key.
///
/// The manifest is the consistency anchor for clients, so it is stored
/// with a `no-store` directive: no cache layer may serve it stale. Writes
/// are last-writer-wins; two concurrent rebuild+save pairs may race and
/// the later save supersedes the earlier with no conflict detection.
pub async fn save<S: ObjectStore>(store: &S, config: &Config, catalog: &Catalog) -> Result<()> {
    let body = serde_json::to_vec_pretty(catalog)?;
    store
        .put(
            &config.manifest_key,
            body.into(),
            PutOptions {
                content_type: Some("application/json; charset=utf-8".to_string()),
                cache_control: Some("no-store".to_string()),
            },
        )
        .await?;
    debug!(key = %config.manifest_key, count = catalog.count, "saved manifest");
    Ok(())
}

/// Read back the persisted manifest.
pub async fn load<S: ObjectStore>(store: &S, config: &Config) -> Result<Catalog> {
    let object = store.get(&config.manifest_key).await.map_err(|e| match e {
        crate::storage::StorageError::NotFound => {
            ServiceError::not_found(format!("{} has not been built yet", config.manifest_key))
        }
        other => other.into(),
    })?;
    Ok(serde_json::from_slice(&object.data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use bytes::Bytes;

    fn config() -> Config {
        Config {
            public_base: "https://img.test".to_string(),
            ..Config::default()
        }
    }

    async fn seed(store: &MemoryStore, keys: &[&str]) {
        for k in keys {
            store
                .put(k, Bytes::from_static(b"x"), PutOptions::default())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn rebuild_filters_sorts_and_counts() {
        let store = MemoryStore::new();
        let config = config();
        seed(
            &store,
            &["b.png", "a.webp", "notes.txt", "icons.json", "z/nested.GIF"],
        )
        .await;

        let catalog = rebuild(&store, &config).await.unwrap();
        let names: Vec<_> = catalog.icons.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a.webp", "b.png", "z/nested.GIF"]);
        assert_eq!(catalog.count, catalog.icons.len());
        assert_eq!(catalog.icons[0].url, "https://img.test/a.webp");
    }

    #[tokio::test]
    async fn rebuild_walks_every_page() {
        let store = MemoryStore::new();
        let config = Config {
            list_page_size: 2,
            ..config()
        };
        seed(&store, &["a.png", "b.png", "c.png", "d.png", "e.png"]).await;

        let catalog = rebuild(&store, &config).await.unwrap();
        assert_eq!(catalog.count, 5);
    }

    #[tokio::test]
    async fn rebuild_refuses_unbounded_scans() {
        let store = MemoryStore::new();
        let config = Config {
            list_page_size: 1,
            max_list_pages: 2,
            ..config()
        };
        seed(&store, &["a.png", "b.png", "c.png"]).await;

        assert!(matches!(
            rebuild(&store, &config).await,
            Err(ServiceError::ListOverflow(2))
        ));
    }

    #[tokio::test]
    async fn save_then_load_roundtrips_with_no_store_directive() {
        let store = MemoryStore::new();
        let config = config();
        seed(&store, &["a.png"]).await;

        let catalog = rebuild(&store, &config).await.unwrap();
        save(&store, &config, &catalog).await.unwrap();

        let meta = store.head(&config.manifest_key).await.unwrap();
        assert_eq!(meta.cache_control.as_deref(), Some("no-store"));
        assert_eq!(
            meta.content_type.as_deref(),
            Some("application/json; charset=utf-8")
        );

        let loaded = load(&store, &config).await.unwrap();
        assert_eq!(loaded.count, 1);
        assert_eq!(loaded.icons, catalog.icons);
    }

    #[tokio::test]
    async fn manifest_never_lists_itself() {
        let store = MemoryStore::new();
        let config = config();
        seed(&store, &["a.png"]).await;

        let catalog = rebuild(&store, &config).await.unwrap();
        save(&store, &config, &catalog).await.unwrap();
        let again = rebuild(&store, &config).await.unwrap();
        assert!(again.icons.iter().all(|e| e.name != config.manifest_key));
        assert_eq!(again.count, 1);
    }
}
