//! Router assembly: API endpoints, static frontend, branding assets, body
//! limit, rate limiting, CORS and HTTP tracing.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::header,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::ratelimit;
use crate::state::AppState;

pub mod http;


/// Build the application router:
/// - `POST /analyze`, `POST /generate`, `GET /health`
/// - `/assets/*` from `ASSETS_DIR`, `/` and everything else from `STATIC_DIR`
/// - per-client rate limit on every route
/// - CORS (any origin) exposing `Content-Disposition` so the download name is readable
pub fn build_router(state: Arc<AppState>) -> Router {
    let settings = &state.settings;
    let index = settings.static_dir.join("index.html");
    let static_service = ServeDir::new(&settings.static_dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(&index));

    Router::new()
        .route("/health", get(http::http_health))
        .route("/analyze", post(http::http_analyze))
        .route("/generate", post(http::http_generate))
        .route_service("/", ServeFile::new(&index))
        .nest_service("/assets", ServeDir::new(&settings.assets_dir))
        .fallback_service(static_service)
        .layer(DefaultBodyLimit::max(settings.body_limit()))
        .layer(middleware::from_fn_with_state(state.limiter.clone(), ratelimit::enforce))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers([header::CONTENT_DISPOSITION]),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
