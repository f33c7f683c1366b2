//! Error taxonomy shared by both pipelines and its HTTP mapping.
//!
//! Client-caused errors carry a specific message. Upstream and rendering
//! failures are logged with their detail and answered with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::protocol::ErrorOut;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("validation: {0}")]
  Validation(String),
  #[error("security: {0}")]
  Security(String),
  #[error("rate limit exceeded")]
  TooManyRequests,
  #[error("model call timed out")]
  UpstreamTimeout,
  #[error("model call failed: {0}")]
  Upstream(String),
  #[error("malformed model output: {0}")]
  MalformedModelOutput(String),
  #[error("rendering failed: {0}")]
  Rendering(String),
  #[error("internal: {0}")]
  Internal(String),
}

impl ApiError {
  /// Log the underlying error with context and return an `Internal` variant.
  pub fn internal(err: impl std::fmt::Display, context: &str) -> Self {
    tracing::error!(target: "exam_forge", error = %err, "{context}");
    Self::Internal(context.to_string())
  }

  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Validation(_) | ApiError::Security(_) => StatusCode::BAD_REQUEST,
      ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
      ApiError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
      ApiError::Upstream(_) | ApiError::MalformedModelOutput(_) => StatusCode::BAD_GATEWAY,
      ApiError::Rendering(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// Message safe to show to the end user.
  pub fn public_message(&self) -> String {
    match self {
      ApiError::Validation(m) | ApiError::Security(m) => m.clone(),
      ApiError::TooManyRequests => "Zu viele Anfragen. Bitte später erneut versuchen.".into(),
      ApiError::UpstreamTimeout => "Die KI hat nicht rechtzeitig geantwortet. Bitte erneut versuchen.".into(),
      ApiError::Upstream(_) => "Die KI ist derzeit nicht erreichbar.".into(),
      ApiError::MalformedModelOutput(_) => "Die KI lieferte eine ungültige Antwort.".into(),
      ApiError::Rendering(_) => "PDF-Erstellung fehlgeschlagen.".into(),
      ApiError::Internal(_) => "Interner Serverfehler.".into(),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(target: "exam_forge", error = %self, "Request failed");
    } else {
      tracing::warn!(target: "exam_forge", error = %self, "Request rejected");
    }
    let body = ErrorOut { status: status.as_u16(), detail: self.public_message() };
    (status, Json(body)).into_response()
  }
}
