//! Pass-through object front door.
//!
//! Serves stored objects verbatim: the manifest at the root, everything
//! else by key. A missing key falls back to the designated placeholder
//! image before 404ing, so broken links in client pages still render
//! something.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::api::AppState;
use crate::error::ServiceError;
use crate::key;
use crate::storage::{ObjectStore, StorageError};

/// Served in place of a missing object, when present in the store.
const PLACEHOLDER_KEY: &str = "not-found.png";

/// Long-lived caching for immutable image objects; the manifest carries
/// its own `no-store` directive instead.
const DEFAULT_CACHE_CONTROL: &str = "public, max-age=31536000";

/// GET / - the manifest, the natural root document of the service.
pub async fn serve_root<S: ObjectStore>(
    State(state): State<AppState<S>>,
) -> Result<Response, ServiceError> {
    let manifest_key = state.config.manifest_key.clone();
    serve_key(&state, &manifest_key).await
}

/// GET /{*key} - raw object bytes with their stored metadata.
pub async fn serve<S: ObjectStore>(
    State(state): State<AppState<S>>,
    Path(raw): Path<String>,
) -> Result<Response, ServiceError> {
    let target = key::normalize(&raw);
    if target.is_empty() {
        return Err(ServiceError::not_found("file not found"));
    }
    serve_key(&state, &target).await
}

async fn serve_key<S: ObjectStore>(
    state: &AppState<S>,
    target: &str,
) -> Result<Response, ServiceError> {
    let (served_key, object) = match state.store.get(target).await {
        Ok(object) => (target, object),
        Err(StorageError::NotFound) => match state.store.get(PLACEHOLDER_KEY).await {
            Ok(placeholder) => (PLACEHOLDER_KEY, placeholder),
            Err(StorageError::NotFound) => {
                return Err(ServiceError::not_found(format!("file not found: {target}")));
            }
            Err(e) => return Err(e.into()),
        },
        Err(e) => return Err(e.into()),
    };

    let content_type = object
        .meta
        .content_type
        .unwrap_or_else(|| detect_content_type(served_key).to_string());
    let cache_control = object
        .meta
        .cache_control
        .unwrap_or_else(|| DEFAULT_CACHE_CONTROL.to_string());

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, cache_control),
        ],
        object.data,
    )
        .into_response())
}

/// Content type by extension, for objects stored without one.
fn detect_content_type(target: &str) -> &'static str {
    match key::extension(target).as_deref() {
        Some("json") => "application/json; charset=utf-8",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_types() {
        assert_eq!(detect_content_type("a.PNG"), "image/png");
        assert_eq!(detect_content_type("icons.json"), "application/json; charset=utf-8");
        assert_eq!(detect_content_type("vector.svg"), "image/svg+xml");
        assert_eq!(detect_content_type("mystery"), "application/octet-stream");
    }
}
