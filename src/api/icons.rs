//! Icon mutation handlers.
//!
//! One POST endpoint carries both the multipart upload and the
//! form-encoded actions (`rename`, `refresh-icons`); the body's
//! content-type decides which. Deletion is its own verb with the key in
//! the query string.

use std::collections::BTreeMap;

use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::AppState;
use crate::error::ServiceError;
use crate::service::UploadRequest;
use crate::storage::ObjectStore;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub ok: bool,
    #[serde(rename = "keyUsed")]
    pub key_used: String,
    pub url: String,
    #[serde(rename = "totalIcons")]
    pub total_icons: usize,
}

#[derive(Debug, Serialize)]
pub struct RenameResponse {
    pub ok: bool,
    pub renamed: RenamedKeys,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct RenamedKeys {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub ok: bool,
    pub refreshed: bool,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub ok: bool,
    pub deleted: String,
    pub remaining: usize,
}

/// POST /api/icons - multipart body uploads a file; a urlencoded body
/// carries an `action`.
pub async fn mutate<S: ObjectStore>(
    State(state): State<AppState<S>>,
    req: Request,
) -> Result<Response, ServiceError> {
    let content_type = req
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| ServiceError::validation(format!("invalid multipart body: {e}")))?;
        upload(state, multipart).await
    } else {
        let Form(fields) = Form::<BTreeMap<String, String>>::from_request(req, &())
            .await
            .map_err(|e| ServiceError::validation(format!("invalid form body: {e}")))?;
        action(state, fields).await
    }
}

async fn upload<S: ObjectStore>(
    state: AppState<S>,
    mut multipart: Multipart,
) -> Result<Response, ServiceError> {
    let mut file: Option<(Option<String>, Option<String>, Bytes)> = None;
    let mut key_hint: Option<String> = None;
    let mut overwrite = true;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::validation(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServiceError::validation(format!("unreadable file field: {e}")))?;
                file = Some((filename, content_type, data));
            }
            Some("key") => {
                key_hint = Some(read_text(field).await?);
            }
            Some("overwrite") => {
                overwrite = read_text(field).await? == "true";
            }
            other => {
                debug!(field = ?other, "ignoring multipart field");
            }
        }
    }

    let Some((filename, content_type, data)) = file else {
        return Err(ServiceError::validation("missing file"));
    };

    let outcome = state
        .service
        .upload(UploadRequest {
            key: key_hint,
            filename,
            data,
            content_type,
            overwrite,
        })
        .await?;

    // The key may have been overwritten in place; stale variants of it
    // must not outlive the new bytes.
    state.thumbs.purge_source(&outcome.key_used);

    Ok(Json(UploadResponse {
        ok: true,
        key_used: outcome.key_used,
        url: outcome.url,
        total_icons: outcome.total,
    })
    .into_response())
}

async fn action<S: ObjectStore>(
    state: AppState<S>,
    fields: BTreeMap<String, String>,
) -> Result<Response, ServiceError> {
    match fields.get("action").map(String::as_str) {
        Some("refresh-icons") => {
            let count = state.service.refresh().await?;
            Ok(Json(RefreshResponse {
                ok: true,
                refreshed: true,
                count,
            })
            .into_response())
        }
        Some("rename") => {
            let old_key = fields.get("oldKey").map(String::as_str).unwrap_or_default();
            let new_key = fields.get("key").map(String::as_str).unwrap_or_default();
            let outcome = state.service.rename(old_key, new_key).await?;
            state.thumbs.purge_source(&outcome.from);

            Ok(Json(RenameResponse {
                ok: true,
                renamed: RenamedKeys {
                    from: outcome.from,
                    to: outcome.to,
                },
                count: outcome.count,
            })
            .into_response())
        }
        _ => Err(ServiceError::validation("unknown POST action")),
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    key: Option<String>,
}

/// DELETE /api/icons?key=… - remove one object and refresh the catalog.
pub async fn delete_icon<S: ObjectStore>(
    State(state): State<AppState<S>>,
    Query(params): Query<DeleteParams>,
) -> Result<Response, ServiceError> {
    let key = params
        .key
        .ok_or_else(|| ServiceError::validation("missing key"))?;
    let outcome = state.service.delete(&key).await?;
    state.thumbs.purge_source(&outcome.deleted);

    Ok(Json(DeleteResponse {
        ok: true,
        deleted: outcome.deleted,
        remaining: outcome.remaining,
    })
    .into_response())
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ServiceError> {
    field
        .text()
        .await
        .map_err(|e| ServiceError::validation(format!("unreadable form field: {e}")))
}
