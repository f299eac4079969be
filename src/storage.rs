//! Object storage capability.
//!
//! The store is a plain key→bytes namespace with per-object HTTP metadata
//! and paginated listing. It offers no transactions and no locks; every
//! consistency property the rest of the crate provides is built on top of
//! these five operations.

use async_trait::async_trait;
use bytes::Bytes;
use jiff::Timestamp;
use thiserror::Error;

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object not found")]
    NotFound,

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// HTTP metadata recorded alongside an object at `put` time.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
}

/// Metadata about a stored object, as returned by `head`.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub size: u64,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub last_modified: Option<Timestamp>,
}

/// A fetched object: the full payload plus its metadata.
#[derive(Debug, Clone)]
pub struct ObjectData {
    pub data: Bytes,
    pub meta: ObjectMeta,
}

/// One listed object. Payloads are not included in listings.
#[derive(Debug, Clone)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<Timestamp>,
}

/// One page of a listing. `cursor` is opaque; `None` means the scan is
/// complete, anything else is fed back into the next `list` call.
#[derive(Debug, Clone)]
pub struct ObjectPage {
    pub objects: Vec<ObjectSummary>,
    pub cursor: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Fetch an object's payload and metadata.
    async fn get(&self, key: &str) -> Result<ObjectData, StorageError>;

    /// Store an object, replacing any previous object at the key.
    async fn put(&self, key: &str, data: Bytes, opts: PutOptions) -> Result<(), StorageError>;

    /// Delete an object. Deleting an absent key is not an error; callers
    /// that need to distinguish probe with `head` first.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Fetch metadata without the payload. `NotFound` if the key is absent.
    async fn head(&self, key: &str) -> Result<ObjectMeta, StorageError>;

    /// List up to `limit` keys starting with `prefix`, in ascending key
    /// order, resuming after `cursor` when given.
    async fn list(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ObjectPage, StorageError>;
}
