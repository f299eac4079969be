//! Thumbnail endpoint.

use axum::extract::{Query, State};
use axum::http::{HeaderName, Uri, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::api::AppState;
use crate::error::ServiceError;
use crate::key;
use crate::storage::ObjectStore;
use crate::thumbs::{ResizeOptions, THUMB_CACHE_CONTROL};

#[derive(Debug, Deserialize)]
pub struct ThumbParams {
    file: Option<String>,
    w: Option<String>,
    width: Option<String>,
    h: Option<String>,
    height: Option<String>,
    fit: Option<String>,
    quality: Option<String>,
    format: Option<String>,
    f: Option<String>,
}

/// GET /thumb?file=…&w=…&h=…&fit=…&quality=…&format=… - serve a resized
/// variant of a stored image.
///
/// The short and long parameter spellings are aliases, short one wins.
/// The full path+query is the cache identity, so any spelling difference
/// is a distinct cached variant by design.
pub async fn render<S: ObjectStore>(
    State(state): State<AppState<S>>,
    uri: Uri,
    Query(params): Query<ThumbParams>,
) -> Result<Response, ServiceError> {
    let source_key = key::normalize(params.file.as_deref().unwrap_or_default());
    if source_key.is_empty() {
        return Err(ServiceError::validation("missing file param"));
    }

    let opts = ResizeOptions::from_params(
        params.w.as_deref().or(params.width.as_deref()),
        params.h.as_deref().or(params.height.as_deref()),
        params.fit.as_deref(),
        params.quality.as_deref(),
        params.f.as_deref().or(params.format.as_deref()),
    )?;

    let identity = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    let thumb = state
        .thumbs
        .get_or_render(&source_key, &identity, &opts)
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, thumb.content_type.to_string()),
            (header::CACHE_CONTROL, THUMB_CACHE_CONTROL.to_string()),
            (
                HeaderName::from_static("cache-tag"),
                thumb.cache_tag.clone(),
            ),
        ],
        thumb.body,
    )
        .into_response())
}
