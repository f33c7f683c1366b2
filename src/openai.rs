//! Vision model adapter.
//!
//! `VisionModel` is the seam to the external generative model: images + text in,
//! raw text out. `OpenAI` implements it against any chat.completions-compatible
//! endpoint, sending photos as base64 data URLs and optionally requesting a
//! strict JSON object. `AiClient` races every call against a deadline.
//!
//! NOTE: We never log the API key or model output beyond a short truncation.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::config::Settings;
use crate::error::ApiError;
use crate::upload::UploadedImage;

#[derive(Debug, Error)]
pub enum AiError {
  #[error("model call exceeded {0:?}")]
  Timeout(Duration),
  #[error("model HTTP {status}: {message}")]
  Http { status: u16, message: String },
  #[error("transport: {0}")]
  Transport(String),
  #[error("model returned no content")]
  Empty,
  #[error("could not read image: {0}")]
  Image(String),
}

impl From<AiError> for ApiError {
  fn from(e: AiError) -> Self {
    match e {
      AiError::Timeout(_) => ApiError::UpstreamTimeout,
      other => ApiError::Upstream(other.to_string()),
    }
  }
}

/// One photo, base64-encoded, ready for the model.
#[derive(Clone, Debug)]
pub struct EncodedImage {
  pub mime: &'static str,
  pub base64: String,
}

impl EncodedImage {
  pub fn data_url(&self) -> String {
    format!("data:{};base64,{}", self.mime, self.base64)
  }
}

/// Read each uploaded file once and base64-encode it.
pub async fn encode_images(images: &[UploadedImage]) -> Result<Vec<EncodedImage>, AiError> {
  let mut out = Vec::with_capacity(images.len());
  for img in images {
    if img.declared_mime.as_deref() != Some(img.format.mime()) {
      debug!(declared = ?img.declared_mime, detected = img.format.mime(), size = img.size, "Declared image type differs from content");
    }
    let bytes = tokio::fs::read(&img.path).await.map_err(|e| AiError::Image(e.to_string()))?;
    out.push(EncodedImage { mime: img.format.mime(), base64: STANDARD.encode(bytes) });
  }
  Ok(out)
}

#[derive(Clone, Debug)]
pub struct VisionRequest {
  pub system: Option<String>,
  pub prompt: String,
  pub images: Vec<EncodedImage>,
  /// Ask the model for a strict JSON object.
  pub json_mode: bool,
}

#[async_trait]
pub trait VisionModel: Send + Sync {
  fn model_name(&self) -> &str;
  async fn complete(&self, request: &VisionRequest) -> Result<String, AiError>;
}

/// Deadline-bounded front for a `VisionModel`.
#[derive(Clone)]
pub struct AiClient {
  model: Arc<dyn VisionModel>,
  timeout: Duration,
}

impl AiClient {
  pub fn new(model: Arc<dyn VisionModel>, timeout: Duration) -> Self {
    Self { model, timeout }
  }

  /// Invoke the model; a slow model surfaces as `AiError::Timeout` instead of hanging.
  #[instrument(level = "info", skip(self, request), fields(model = %self.model.model_name(), images = request.images.len(), json = request.json_mode))]
  pub async fn ask(&self, request: &VisionRequest) -> Result<String, AiError> {
    let start = std::time::Instant::now();
    let result = tokio::select! {
      r = self.model.complete(request) => r,
      _ = tokio::time::sleep(self.timeout) => Err(AiError::Timeout(self.timeout)),
    };
    let elapsed = start.elapsed();
    match &result {
      Ok(text) => info!(?elapsed, response_len = text.len(), "Model response received"),
      Err(e) => error!(?elapsed, error = %e, "Model call failed"),
    }
    result
  }
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

impl OpenAI {
  /// Construct the client if OPENAI_API_KEY is configured; otherwise return None.
  pub fn from_settings(settings: &Settings) -> Option<Self> {
    let api_key = settings.openai_api_key.clone()?;
    // Transport-level ceiling; the tighter deadline is enforced by `AiClient`.
    let client = reqwest::Client::builder()
      .timeout(settings.ai_timeout + Duration::from_secs(30))
      .build()
      .ok()?;
    Some(Self {
      client,
      api_key,
      base_url: settings.openai_base_url.clone(),
      model: settings.openai_model.clone(),
    })
  }
}

#[async_trait]
impl VisionModel for OpenAI {
  fn model_name(&self) -> &str { &self.model }

  async fn complete(&self, request: &VisionRequest) -> Result<String, AiError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = build_request(&self.model, request);

    let res = self.client.post(&url)
      .header(USER_AGENT, concat!("exam-forge/", env!("CARGO_PKG_VERSION")))
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| AiError::Transport(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      return Err(AiError::Http { status, message });
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| AiError::Transport(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .filter(|t| !t.trim().is_empty())
      .ok_or(AiError::Empty)
  }
}

fn build_request(model: &str, request: &VisionRequest) -> ChatCompletionRequest {
  let mut messages = Vec::with_capacity(2);
  if let Some(system) = &request.system {
    messages.push(ChatMessageReq { role: "system".into(), content: vec![ContentPart::Text { text: system.clone() }] });
  }
  let mut parts = vec![ContentPart::Text { text: request.prompt.clone() }];
  parts.extend(request.images.iter().map(|img| ContentPart::ImageUrl { image_url: ImageUrl { url: img.data_url() } }));
  messages.push(ChatMessageReq { role: "user".into(), content: parts });

  ChatCompletionRequest {
    model: model.to_string(),
    messages,
    temperature: 0.4,
    response_format: request.json_mode.then(|| ResponseFormat { r#type: "json_object".into() }),
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: Vec<ContentPart> }
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
  Text { text: String },
  ImageUrl { image_url: ImageUrl },
}
#[derive(Serialize)]
struct ImageUrl { url: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
