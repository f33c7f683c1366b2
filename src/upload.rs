//! Multipart ingestion for notebook photos.
//!
//! Image parts are streamed chunk by chunk into the run workspace with a
//! per-file cap, then checked against the JPEG/PNG signatures. Text fields are
//! collected alongside. Nothing here deletes files: the caller's
//! `RunWorkspace` owns everything written.

use std::{collections::HashMap, path::PathBuf};

use axum::extract::Multipart;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use crate::error::ApiError;
use crate::workspace::RunWorkspace;

/// Form field carrying the photos.
pub const IMAGE_FIELD: &str = "hefteintrag";

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
  Jpeg,
  Png,
}

impl ImageFormat {
  pub fn mime(self) -> &'static str {
    match self {
      ImageFormat::Jpeg => "image/jpeg",
      ImageFormat::Png => "image/png",
    }
  }
}

/// Identify an image by its leading bytes. Declared MIME types are not trusted.
pub fn sniff_image(head: &[u8]) -> Option<ImageFormat> {
  if head.starts_with(JPEG_MAGIC) {
    Some(ImageFormat::Jpeg)
  } else if head.starts_with(PNG_MAGIC) {
    Some(ImageFormat::Png)
  } else {
    None
  }
}

/// One accepted photo, stored in the run workspace.
#[derive(Debug)]
pub struct UploadedImage {
  pub path: PathBuf,
  pub declared_mime: Option<String>,
  pub format: ImageFormat,
  pub size: u64,
}

#[derive(Debug, Default)]
pub struct UploadForm {
  pub images: Vec<UploadedImage>,
  pub fields: HashMap<String, String>,
}

impl UploadForm {
  /// Trimmed, non-empty text field.
  pub fn text(&self, name: &str) -> Option<&str> {
    self.fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
  }
}

/// Upload limits for one endpoint.
#[derive(Clone, Copy, Debug)]
pub struct UploadLimits {
  pub max_images: usize,
  pub max_bytes: u64,
}

#[instrument(level = "info", skip(multipart, ws), fields(run_id = %ws.run_id()))]
pub async fn ingest(
  multipart: &mut Multipart,
  ws: &RunWorkspace,
  limits: UploadLimits,
) -> Result<UploadForm, ApiError> {
  let mut form = UploadForm::default();

  while let Some(mut field) = multipart
    .next_field()
    .await
    .map_err(|e| ApiError::Validation(format!("Ungültige Formulardaten: {e}")))?
  {
    let name = field.name().unwrap_or("").to_string();
    if name != IMAGE_FIELD {
      let text = field
        .text()
        .await
        .map_err(|_| ApiError::Validation(format!("Feld '{name}' konnte nicht gelesen werden.")))?;
      form.fields.insert(name, text);
      continue;
    }

    if form.images.len() >= limits.max_images {
      return Err(ApiError::Validation(format!("Maximal {} Bilder erlaubt.", limits.max_images)));
    }

    let path = ws.upload_path(form.images.len());
    let declared_mime = field.content_type().map(|s| s.to_string());
    let mut file = tokio::fs::File::create(&path)
      .await
      .map_err(|e| ApiError::internal(e, "Failed to create upload file"))?;
    let mut head: Vec<u8> = Vec::with_capacity(PNG_MAGIC.len());
    let mut size: u64 = 0;

    while let Some(chunk) = field
      .chunk()
      .await
      .map_err(|_| ApiError::Validation("Datei konnte nicht gelesen werden.".into()))?
    {
      size += chunk.len() as u64;
      if size > limits.max_bytes {
        return Err(ApiError::Validation(format!(
          "Datei überschreitet das Limit von {} MB.",
          limits.max_bytes / (1024 * 1024)
        )));
      }
      if head.len() < PNG_MAGIC.len() {
        let take = (PNG_MAGIC.len() - head.len()).min(chunk.len());
        head.extend_from_slice(&chunk[..take]);
      }
      file
        .write_all(&chunk)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to write upload file"))?;
    }
    file.flush().await.map_err(|e| ApiError::internal(e, "Failed to flush upload file"))?;

    if size == 0 {
      return Err(ApiError::Validation("Leere Datei hochgeladen.".into()));
    }
    let Some(format) = sniff_image(&head) else {
      warn!(target: "exam_forge", run_id = %ws.run_id(), ?declared_mime, size, "Upload failed signature check");
      return Err(ApiError::Security("Datei ist kein gültiges JPEG- oder PNG-Bild.".into()));
    };

    form.images.push(UploadedImage { path, declared_mime, format, size });
  }

  info!(target: "exam_forge", run_id = %ws.run_id(), images = form.images.len(), fields = form.fields.len(), "Upload ingested");
  Ok(form)
}

/// Reject a form without any photo.
pub fn require_images(form: &UploadForm) -> Result<(), ApiError> {
  if form.images.is_empty() {
    Err(ApiError::Validation("Kein Bild hochgeladen.".into()))
  } else {
    Ok(())
  }
}
