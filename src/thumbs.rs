//! On-demand thumbnail rendering behind an edge cache.
//!
//! Variants are derived artifacts: they live only in the cache, keyed by
//! the full request identity (path + query), and carry a cache tag bound
//! to the source key so every variant of one object can be purged at once.
//! The resize engine itself is a capability this crate consumes, not
//! implements.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use moka::future::Cache;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{Result, ServiceError};
use crate::storage::{ObjectStore, StorageError};

pub const THUMB_CACHE_CONTROL: &str = "public, max-age=86400, stale-while-revalidate=3600";

const DEFAULT_WIDTH: u32 = 200;
const DEFAULT_QUALITY: u8 = 80;

#[derive(Debug, Error)]
pub enum ResizeError {
    #[error("unsupported source image")]
    Unsupported,

    #[error("resize engine failure: {0}")]
    Engine(String),
}

/// Image resize capability: `resize(bytes, options) -> bytes`.
#[async_trait]
pub trait Resizer: Send + Sync + 'static {
    async fn resize(&self, source: Bytes, opts: &ResizeOptions) -> std::result::Result<Bytes, ResizeError>;
}

/// Resizer for deployments without a transform engine attached: serves the
/// source bytes unchanged, so thumbnail URLs still resolve.
pub struct PassthroughResizer;

#[async_trait]
impl Resizer for PassthroughResizer {
    async fn resize(&self, source: Bytes, _opts: &ResizeOptions) -> std::result::Result<Bytes, ResizeError> {
        Ok(source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeFit {
    Cover,
    Contain,
    ScaleDown,
    Crop,
    Pad,
}

impl FromStr for ResizeFit {
    type Err = ServiceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cover" => Ok(Self::Cover),
            "contain" => Ok(Self::Contain),
            "scale-down" => Ok(Self::ScaleDown),
            "crop" => Ok(Self::Crop),
            "pad" => Ok(Self::Pad),
            other => Err(ServiceError::validation(format!("unknown fit: {other}"))),
        }
    }
}

impl std::fmt::Display for ResizeFit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Cover => "cover",
            Self::Contain => "contain",
            Self::ScaleDown => "scale-down",
            Self::Crop => "crop",
            Self::Pad => "pad",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Webp,
    Png,
    Jpeg,
    Gif,
    Avif,
}

impl ImageFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Webp => "image/webp",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Avif => "image/avif",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = ServiceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            // "auto" means "let the service pick"; webp is the pick.
            "auto" | "webp" => Ok(Self::Webp),
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "gif" => Ok(Self::Gif),
            "avif" => Ok(Self::Avif),
            other => Err(ServiceError::validation(format!("unknown format: {other}"))),
        }
    }
}

/// Parameters handed to the resize capability. Part of the variant
/// identity together with the source key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeOptions {
    pub width: u32,
    pub height: u32,
    pub fit: ResizeFit,
    pub quality: u8,
    pub format: ImageFormat,
}

impl ResizeOptions {
    /// Parse raw query values. Width defaults to 200, height to the
    /// width, fit to cover, quality to 80 (clamped to 10..=100), format
    /// to webp. Unparseable values are rejected rather than coerced.
    pub fn from_params(
        width: Option<&str>,
        height: Option<&str>,
        fit: Option<&str>,
        quality: Option<&str>,
        format: Option<&str>,
    ) -> Result<Self> {
        let width = match width {
            Some(raw) => parse_dimension("width", raw)?,
            None => DEFAULT_WIDTH,
        };
        let height = match height {
            Some(raw) => parse_dimension("height", raw)?,
            None => width,
        };
        let quality = match quality {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| ServiceError::validation(format!("invalid quality: {raw}")))?
                .clamp(10, 100) as u8,
            None => DEFAULT_QUALITY,
        };
        let fit = fit.map(ResizeFit::from_str).transpose()?.unwrap_or(ResizeFit::Cover);
        let format = format
            .map(ImageFormat::from_str)
            .transpose()?
            .unwrap_or(ImageFormat::Webp);

        Ok(Self {
            width,
            height,
            fit,
            quality,
            format,
        })
    }
}

fn parse_dimension(name: &str, raw: &str) -> Result<u32> {
    let value: u32 = raw
        .parse()
        .map_err(|_| ServiceError::validation(format!("invalid {name}: {raw}")))?;
    if value == 0 {
        return Err(ServiceError::validation(format!("invalid {name}: 0")));
    }
    Ok(value)
}

/// A rendered variant as held in the edge cache and returned to clients.
#[derive(Debug, Clone)]
pub struct RenderedThumb {
    pub body: Bytes,
    pub content_type: &'static str,
    pub cache_tag: String,
}

/// Edge-cache-backed resize proxy.
pub struct Thumbnailer<S> {
    store: Arc<S>,
    resizer: Arc<dyn Resizer>,
    cache: Cache<String, RenderedThumb>,
}

impl<S: ObjectStore> Thumbnailer<S> {
    pub fn new(store: Arc<S>, resizer: Arc<dyn Resizer>, max_cache_bytes: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_cache_bytes)
            .weigher(|_identity: &String, thumb: &RenderedThumb| {
                thumb.body.len().try_into().unwrap_or(u32::MAX)
            })
            .support_invalidation_closures()
            .build();
        Self {
            store,
            resizer,
            cache,
        }
    }

    /// Serve a variant from the cache, rendering it on miss.
    ///
    /// `identity` is the full request path+query: every parameter is part
    /// of the variant's cache key. On a miss the source is fetched (404 if
    /// absent; the catalog is not consulted), resized, and returned
    /// immediately. The cache insert happens on a detached task so it
    /// never delays the response, while the runtime still drives it to
    /// completion after the response is flushed.
    pub async fn get_or_render(
        &self,
        source_key: &str,
        identity: &str,
        opts: &ResizeOptions,
    ) -> Result<RenderedThumb> {
        if let Some(hit) = self.cache.get(identity).await {
            debug!(identity, "thumbnail cache hit");
            return Ok(hit);
        }

        let source = self.store.get(source_key).await.map_err(|e| match e {
            StorageError::NotFound => {
                ServiceError::not_found(format!("file not found: {source_key}"))
            }
            other => other.into(),
        })?;

        let rendered = self.resizer.resize(source.data, opts).await?;
        debug!(identity, bytes = rendered.len(), "rendered thumbnail");
        let thumb = RenderedThumb {
            body: rendered,
            content_type: opts.format.content_type(),
            cache_tag: source_tag(source_key),
        };

        let cache = self.cache.clone();
        let identity = identity.to_string();
        let stored = thumb.clone();
        tokio::spawn(async move {
            cache.insert(identity, stored).await;
        });

        Ok(thumb)
    }

    /// Drop every cached variant derived from one source key. This is the
    /// purge half of the cache-tag contract; invalidation is eventual.
    pub fn purge_source(&self, source_key: &str) {
        let tag = source_tag(source_key);
        debug!(%tag, "purging cached variants");
        if let Err(e) = self
            .cache
            .invalidate_entries_if(move |_identity, thumb| thumb.cache_tag == tag)
        {
            warn!(error = %e, "cache purge predicate rejected");
        }
    }

    #[cfg(test)]
    async fn cached(&self, identity: &str) -> Option<RenderedThumb> {
        self.cache.run_pending_tasks().await;
        self.cache.get(identity).await
    }
}

/// Cache tag for a source key: namespaced, with every non-alphanumeric
/// character replaced so the tag survives header transport.
pub fn source_tag(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("source::{sanitized}")
}
