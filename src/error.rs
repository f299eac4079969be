use thiserror::Error;

use crate::storage::StorageError;
use crate::thumbs::ResizeError;

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors surfaced by the mutation, catalog, and thumbnail services.
///
/// The HTTP mapping lives in `api::error`: `Validation` is a 400,
/// `NotFound` (and storage-level not-found) a 404, and everything else a
/// 500 with the upstream message in the body.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("resize error: {0}")]
    Resize(#[from] ResizeError),

    #[error("manifest serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("object listing exceeded {0} pages; refusing to build a partial manifest")]
    ListOverflow(usize),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}
