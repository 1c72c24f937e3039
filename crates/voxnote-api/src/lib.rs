//! # voxnote-api
//!
//! HTTP surface of the voxnote remote store.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | `/health` | liveness |
//! | GET, POST | `/api/v1/categories` | list, create |
//! | GET, PATCH, DELETE | `/api/v1/categories/:id` | fetch, update, delete |
//! | GET, POST | `/api/v1/entries` | list, ingest |
//! | GET, PATCH, DELETE | `/api/v1/entries/:id` | fetch, update, delete |
//! | POST | `/api/v1/audio` | upload a recording |
//!
//! Every `/api/v1` request carries the acting user in `X-User-Id`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod retention;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use config::ApiConfig;
pub use error::ApiError;
pub use retention::{spawn_retention_sweep, sweep_once, SweepHandle, SweepReport};
pub use state::{AppState, UserId, USER_HEADER};

use handlers::{audio, categories, entries};

/// Upload limit; recordings are short dictations.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/categories/:id",
            get(categories::get_category)
                .patch(categories::update_category)
                .delete(categories::delete_category),
        )
        .route(
            "/entries",
            get(entries::list_entries).post(entries::ingest_entry),
        )
        .route(
            "/entries/:id",
            get(entries::get_entry)
                .patch(entries::update_entry)
                .delete(entries::delete_entry),
        )
        .route("/audio", post(audio::upload_audio));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(USER_HEADER),
        ]);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::new())
                .layer(cors)
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .with_state(state)
}
