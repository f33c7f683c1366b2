//! HTTP endpoint handlers. Thin wrappers over the pipelines in `logic`.

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::logic::{analyze, generate};
use crate::protocol::{AnalyzeOut, HealthOut};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthOut { ok: true, version: env!("CARGO_PKG_VERSION"), test_mode: state.settings.test_mode })
}

#[instrument(level = "info", skip_all)]
pub async fn http_analyze(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<AnalyzeOut>, ApiError> {
    let out = analyze(&state, multipart).await?;
    info!(target: "exam_forge", placeholder = out.error.is_some(), "HTTP analyze served");
    Ok(Json(out))
}

#[instrument(level = "info", skip_all)]
pub async fn http_generate(State(state): State<Arc<AppState>>, multipart: Multipart) -> Result<Response, ApiError> {
    let delivery = generate(&state, multipart).await?;
    let disposition = format!("attachment; filename=\"{}\"", delivery.filename);
    Ok((
        [(header::CONTENT_TYPE, "application/pdf".to_string()), (header::CONTENT_DISPOSITION, disposition)],
        delivery.bytes,
    )
        .into_response())
}
