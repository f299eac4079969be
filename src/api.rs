//! HTTP surface.
//!
//! A thin gateway: routes bind verbs and paths to the mutation service,
//! the thumbnailer, and the pass-through object front door. Every
//! response (success, error, and bare `OPTIONS`) carries permissive
//! CORS headers; the API is consumed cross-origin by static pages.

use std::sync::Arc;

use axum::Router;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::service::IconService;
use crate::storage::ObjectStore;
use crate::thumbs::{Resizer, Thumbnailer};

mod error;
mod files;
mod icons;
mod thumbs;

pub use error::ErrorBody;

pub struct AppState<S: ObjectStore> {
    pub service: Arc<IconService<S>>,
    pub thumbs: Arc<Thumbnailer<S>>,
    pub store: Arc<S>,
    pub config: Arc<Config>,
}

impl<S: ObjectStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            thumbs: Arc::clone(&self.thumbs),
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

pub fn router<S: ObjectStore>(store: S, resizer: Arc<dyn Resizer>, config: Config) -> Router {
    let store = Arc::new(store);
    let state = AppState {
        service: Arc::new(IconService::new(Arc::clone(&store), config.clone())),
        thumbs: Arc::new(Thumbnailer::new(
            Arc::clone(&store),
            resizer,
            config.thumb_cache_bytes,
        )),
        store,
        config: Arc::new(config),
    };

    Router::new()
        .route(
            "/api/icons",
            axum::routing::post(icons::mutate).delete(icons::delete_icon),
        )
        .route("/thumb", get(thumbs::render))
        .route("/", get(files::serve_root))
        .route("/{*key}", get(files::serve))
        .layer(middleware::from_fn(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Answer bare `OPTIONS` with 204 and stamp CORS headers on everything
/// else that passes through.
async fn cors(req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors(response.headers_mut());
        return response;
    }
    let mut response = next.run(req).await;
    apply_cors(response.headers_mut());
    response
}

fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET,POST,DELETE,OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
}
