//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `STATIC_DIR` (default `./static`) with index fallback
/// - CORS (allow any origin/method/headers) – adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "./static".to_string());
    let index = format!("{static_dir}/index.html");
    let static_service = ServeDir::new(&static_dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(&index));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/levels", get(http::http_get_levels))
        .route("/api/v1/levels/:id", get(http::http_get_level))
        .route("/api/v1/session", post(http::http_post_session))
        .route(
            "/api/v1/session/:id",
            get(http::http_get_session).delete(http::http_delete_session),
        )
        .route("/api/v1/session/:id/level", post(http::http_post_level))
        .route("/api/v1/session/:id/step/next", post(http::http_post_next_step))
        .route("/api/v1/session/:id/step/prev", post(http::http_post_prev_step))
        .route("/api/v1/session/:id/micro", post(http::http_post_micro))
        .route("/api/v1/session/:id/hint/:micro", get(http::http_get_hint))
        .route("/api/v1/session/:id/export", get(http::http_get_export))
        .route("/api/v1/session/:id/import", post(http::http_post_import))
        .route("/api/v1/session/:id/save", post(http::http_post_save))
        .route("/api/v1/validate", post(http::http_post_validate))
        .route("/api/v1/micro/:id", get(http::http_get_micro))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
