//! iconvault: an icon blob store with a derived JSON catalog and an
//! edge-cached thumbnail proxy.
//!
//! Objects live in an [`storage::ObjectStore`], a plain key→bytes
//! capability with no transactions. Consistency comes from derivation
//! rather than coordination: after every successful mutation the whole
//! key space is re-listed and the `icons.json` manifest regenerated from
//! that snapshot. Thumbnails are rendered on demand through a pluggable
//! [`thumbs::Resizer`] and cached by full request identity, with a cache
//! tag per source key for bulk invalidation.

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod key;
pub mod service;
pub mod storage;
pub mod thumbs;

pub use api::router;
pub use catalog::{Catalog, CatalogEntry};
pub use config::Config;
pub use error::ServiceError;
pub use service::IconService;
pub use storage::{FsStore, MemoryStore, ObjectStore, StorageError};
pub use thumbs::{PassthroughResizer, Resizer, Thumbnailer};
