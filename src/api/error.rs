use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::error::ServiceError;
use crate::storage::StorageError;

/// Error wire shape shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) | ServiceError::Storage(StorageError::NotFound) => {
                StatusCode::NOT_FOUND
            }
            // Upstream failures surface their message in the body: this is
            // an operator-facing tool and verbose errors beat opaque ones.
            ServiceError::Storage(_)
            | ServiceError::Resize(_)
            | ServiceError::Serialize(_)
            | ServiceError::ListOverflow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            ok: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
