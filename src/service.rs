//! Mutation orchestration: upload, rename, delete, refresh.
//!
//! Each operation is a short saga over a store with no transactions: an
//! object-level step followed by a full catalog rebuild+save. The catalog
//! step runs only after the object step succeeded; if the object step
//! fails the catalog is never touched. A rebuild/save failure after a
//! successful object mutation is surfaced to the caller and *not* rolled
//! back: the object change stands, and `refresh` is the manual
//! reconciliation path.

use std::sync::Arc;

use bytes::Bytes;
use rand::distr::{Alphanumeric, SampleString};
use tracing::{info, warn};

use crate::catalog;
use crate::config::Config;
use crate::error::{Result, ServiceError};
use crate::key;
use crate::storage::{ObjectStore, PutOptions, StorageError};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// An upload as handed over by the gateway.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Explicit target key, if the client chose one.
    pub key: Option<String>,
    /// Client-side filename, used as the target when no key was given.
    pub filename: Option<String>,
    pub data: Bytes,
    pub content_type: Option<String>,
    /// When `false`, an occupied key is never overwritten; a disambiguated
    /// key is synthesized instead.
    pub overwrite: bool,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// The key actually written, which differs from the requested one when
    /// overwrite protection kicked in.
    pub key_used: String,
    pub url: String,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct RenameOutcome {
    pub from: String,
    pub to: String,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    pub deleted: String,
    pub remaining: usize,
}

/// The mutation service. Stateless across requests; every instance is just
/// a handle on the store plus configuration.
pub struct IconService<S> {
    store: Arc<S>,
    config: Config,
}

impl<S: ObjectStore> IconService<S> {
    pub fn new(store: Arc<S>, config: Config) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Store an image and refresh the catalog.
    pub async fn upload(&self, req: UploadRequest) -> Result<UploadOutcome> {
        let raw = req
            .key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .or(req.filename.as_deref())
            .ok_or_else(|| ServiceError::validation("missing file name or key"))?;
        let mut target = key::normalize(raw);
        if target.is_empty() {
            return Err(ServiceError::validation("bad key"));
        }
        if !key::is_image_key(&target, &self.config) {
            let allowed: Vec<&str> = self
                .config
                .allowed_extensions
                .iter()
                .map(String::as_str)
                .collect();
            return Err(ServiceError::validation(format!(
                "unsupported file type (allow: {})",
                allowed.join(", ")
            )));
        }

        if !req.overwrite {
            match self.store.head(&target).await {
                Ok(_) => {
                    let disambiguated = disambiguate(&target);
                    info!(requested = %target, used = %disambiguated, "key occupied, disambiguating");
                    target = disambiguated;
                }
                Err(StorageError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.store
            .put(
                &target,
                req.data,
                PutOptions {
                    content_type: Some(
                        req.content_type
                            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string()),
                    ),
                    cache_control: None,
                },
            )
            .await?;

        let total = self.refresh().await?;
        info!(key = %target, total, "uploaded icon");
        Ok(UploadOutcome {
            url: self.config.public_url(&target),
            key_used: target,
            total,
        })
    }

    /// Move an object to a new key and refresh the catalog.
    ///
    /// The store has no atomic move, so this is copy-then-delete. A
    /// failure between the halves leaves both keys present; the next
    /// rebuild lists both and no automatic reconciliation is attempted.
    pub async fn rename(&self, old_raw: &str, new_raw: &str) -> Result<RenameOutcome> {
        let old = key::normalize(old_raw);
        let new = key::normalize(new_raw);
        if old.is_empty() || new.is_empty() {
            return Err(ServiceError::validation("missing oldKey/key"));
        }
        if old == self.config.manifest_key || new == self.config.manifest_key {
            return Err(ServiceError::validation(format!(
                "{} cannot be renamed",
                self.config.manifest_key
            )));
        }

        let source = self.store.get(&old).await.map_err(|e| match e {
            StorageError::NotFound => ServiceError::not_found(format!("file not found: {old}")),
            other => other.into(),
        })?;

        self.store
            .put(
                &new,
                source.data,
                PutOptions {
                    content_type: Some(
                        source
                            .meta
                            .content_type
                            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string()),
                    ),
                    cache_control: source.meta.cache_control,
                },
            )
            .await?;
        if let Err(e) = self.store.delete(&old).await {
            // The copy landed; both keys now exist until the next rebuild.
            warn!(from = %old, to = %new, error = %e, "rename delete step failed");
            return Err(e.into());
        }

        let count = self.refresh().await?;
        info!(from = %old, to = %new, count, "renamed icon");
        Ok(RenameOutcome {
            from: old,
            to: new,
            count,
        })
    }

    /// Delete an object and refresh the catalog.
    pub async fn delete(&self, raw: &str) -> Result<DeleteOutcome> {
        let target = key::normalize(raw);
        if target.is_empty() {
            return Err(ServiceError::validation("missing key"));
        }
        if target == self.config.manifest_key {
            return Err(ServiceError::validation(format!(
                "{} cannot be deleted",
                self.config.manifest_key
            )));
        }

        // Probe first so "already absent" and "deletion failed" stay
        // distinguishable.
        match self.store.head(&target).await {
            Ok(_) => {}
            Err(StorageError::NotFound) => {
                return Err(ServiceError::not_found(format!("file not found: {target}")));
            }
            Err(e) => return Err(e.into()),
        }

        self.store.delete(&target).await?;
        let remaining = self.refresh().await?;
        info!(key = %target, remaining, "deleted icon");
        Ok(DeleteOutcome {
            deleted: target,
            remaining,
        })
    }

    /// Rebuild and persist the catalog without mutating any object.
    /// Exposed as an operation of its own so operators can reconcile after
    /// a partial failure or an out-of-band store change.
    pub async fn refresh(&self) -> Result<usize> {
        let catalog = catalog::rebuild(self.store.as_ref(), &self.config).await?;
        catalog::save(self.store.as_ref(), &self.config, &catalog).await?;
        Ok(catalog.count)
    }
}

/// Insert a short random suffix before the extension: `a.png` becomes
/// `a_x3k9q.png`.
fn disambiguate(key: &str) -> String {
    let suffix = Alphanumeric
        .sample_string(&mut rand::rng(), 5)
        .to_ascii_lowercase();
    match key.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}_{suffix}.{ext}"),
        None => format!("{key}_{suffix}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn service() -> IconService<MemoryStore> {
        let config = Config {
            public_base: "https://img.test".to_string(),
            ..Config::default()
        };
        IconService::new(Arc::new(MemoryStore::new()), config)
    }

    fn upload_req(key: &str, data: &'static [u8]) -> UploadRequest {
        UploadRequest {
            key: Some(key.to_string()),
            filename: None,
            data: Bytes::from_static(data),
            content_type: Some("image/png".to_string()),
            overwrite: true,
        }
    }

    async fn manifest(service: &IconService<MemoryStore>) -> catalog::Catalog {
        catalog::load(service.store.as_ref(), &service.config)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn upload_writes_object_and_manifest() {
        let service = service();
        let outcome = service.upload(upload_req("icon.png", b"png")).await.unwrap();

        assert_eq!(outcome.key_used, "icon.png");
        assert_eq!(outcome.url, "https://img.test/icon.png");
        assert_eq!(outcome.total, 1);

        let manifest = manifest(&service).await;
        assert_eq!(manifest.count, 1);
        assert_eq!(manifest.icons[0].name, "icon.png");
        assert_eq!(manifest.icons[0].url, "https://img.test/icon.png");
    }

    #[tokio::test]
    async fn upload_falls_back_to_filename() {
        let service = service();
        let outcome = service
            .upload(UploadRequest {
                key: None,
                filename: Some("from-disk.png".to_string()),
                data: Bytes::from_static(b"png"),
                content_type: Some("image/png".to_string()),
                overwrite: true,
            })
            .await
            .unwrap();
        assert_eq!(outcome.key_used, "from-disk.png");
    }

    #[tokio::test]
    async fn upload_rejects_disallowed_extension() {
        let service = service();
        let err = service
            .upload(upload_req("notes.txt", b"hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(service.store.is_empty());
    }

    #[tokio::test]
    async fn upload_rejects_manifest_key() {
        let service = service();
        let err = service
            .upload(upload_req("icons.json", b"{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn upload_without_overwrite_never_clobbers() {
        let service = service();
        service.upload(upload_req("icon.png", b"first")).await.unwrap();

        let mut second = upload_req("icon.png", b"second");
        second.overwrite = false;
        let outcome = service.upload(second).await.unwrap();

        assert_ne!(outcome.key_used, "icon.png");
        assert!(outcome.key_used.starts_with("icon_"));
        assert!(outcome.key_used.ends_with(".png"));

        // Original object is untouched, and both are cataloged.
        let original = service.store.get("icon.png").await.unwrap();
        assert_eq!(&original.data[..], b"first");
        assert_eq!(outcome.total, 2);
    }

    #[tokio::test]
    async fn rename_moves_bytes_and_content_type() {
        let service = service();
        service.upload(upload_req("old/a.png", b"payload")).await.unwrap();

        let outcome = service.rename("old/a.png", "new/a.png").await.unwrap();
        assert_eq!(outcome.from, "old/a.png");
        assert_eq!(outcome.to, "new/a.png");
        assert_eq!(outcome.count, 1);

        assert!(matches!(
            service.store.get("old/a.png").await,
            Err(StorageError::NotFound)
        ));
        let moved = service.store.get("new/a.png").await.unwrap();
        assert_eq!(&moved.data[..], b"payload");
        assert_eq!(moved.meta.content_type.as_deref(), Some("image/png"));

        let manifest = manifest(&service).await;
        assert_eq!(manifest.icons[0].name, "new/a.png");
    }

    #[tokio::test]
    async fn rename_missing_source_is_not_found() {
        let service = service();
        let err = service.rename("ghost.png", "b.png").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn rename_refuses_manifest_key() {
        let service = service();
        for (old, new) in [("icons.json", "a.png"), ("a.png", "icons.json")] {
            let err = service.rename(old, new).await.unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn delete_removes_object_and_manifest_entry() {
        let service = service();
        service.upload(upload_req("a.png", b"x")).await.unwrap();
        service.upload(upload_req("b.png", b"y")).await.unwrap();

        let outcome = service.delete("a.png").await.unwrap();
        assert_eq!(outcome.deleted, "a.png");
        assert_eq!(outcome.remaining, 1);

        let manifest = manifest(&service).await;
        assert_eq!(manifest.count, 1);
        assert_eq!(manifest.icons[0].name, "b.png");
    }

    #[tokio::test]
    async fn delete_absent_key_is_not_found() {
        let service = service();
        let err = service.delete("ghost.png").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_manifest_key_always_rejected() {
        let service = service();
        // Regardless of whether the manifest object exists yet.
        let err = service.delete("icons.json").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        service.upload(upload_req("a.png", b"x")).await.unwrap();
        let err = service.delete("icons.json").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(service.store.head("icons.json").await.is_ok());
    }

    #[tokio::test]
    async fn refresh_reconciles_out_of_band_writes() {
        let service = service();
        service.upload(upload_req("a.png", b"x")).await.unwrap();

        // A writer that bypassed the service entirely.
        service
            .store
            .put(
                "stray.png",
                Bytes::from_static(b"s"),
                PutOptions::default(),
            )
            .await
            .unwrap();

        let count = service.refresh().await.unwrap();
        assert_eq!(count, 2);
        let manifest = manifest(&service).await;
        let names: Vec<_> = manifest.icons.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a.png", "stray.png"]);
    }

    #[tokio::test]
    async fn normalized_keys_flow_through_mutations() {
        let service = service();
        let outcome = service
            .upload(upload_req("https://img.test//dir//icon.png", b"x"))
            .await
            .unwrap();
        assert_eq!(outcome.key_used, "dir/icon.png");

        let renamed = service
            .rename("/dir/icon.png", r"dir\renamed.png")
            .await
            .unwrap();
        assert_eq!(renamed.to, "dir/renamed.png");
    }

    #[test]
    fn disambiguate_keeps_extension() {
        let key = disambiguate("dir/icon.png");
        assert!(key.starts_with("dir/icon_"));
        assert!(key.ends_with(".png"));
        assert_eq!(key.len(), "dir/icon_.png".len() + 5);

        let bare = disambiguate("noext");
        assert!(bare.starts_with("noext_"));
    }
}
