//! The two request pipelines behind the HTTP handlers.
//!
//! generate: RECEIVED -> VALIDATED -> ANALYZED -> NORMALIZED -> RENDERED ->
//! COMPILED -> DELIVERED, with FAILED reachable from every stage. CLEANED is
//! always last: the `RunWorkspace` owning every temp file is dropped on every
//! path out of these functions.

use std::fmt;

use axum::extract::Multipart;
use time::{macros::format_description, OffsetDateTime};
use tracing::{debug, info, instrument, warn};

use crate::domain::{ExamDraft, ExamKind, ExamRequestParams};
use crate::error::ApiError;
use crate::grading::GradeScale;
use crate::latex::{render, RenderContext};
use crate::normalize::{parse_exam_draft, parse_subject_guess};
use crate::openai::{encode_images, VisionRequest};
use crate::protocol::AnalyzeOut;
use crate::seeds::{canned_draft, canned_guess};
use crate::state::AppState;
use crate::upload::{ingest, require_images, UploadForm, UploadLimits};
use crate::util::fill_template;
use crate::workspace::RunWorkspace;

const LOGO_FILE: &str = "logo.png";
const DEFAULT_GRADE_LABEL: &str = "9";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
  Received,
  Validated,
  Analyzed,
  Normalized,
  Rendered,
  Compiled,
  Delivered,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Stage::Received => "received",
      Stage::Validated => "validated",
      Stage::Analyzed => "analyzed",
      Stage::Normalized => "normalized",
      Stage::Rendered => "rendered",
      Stage::Compiled => "compiled",
      Stage::Delivered => "delivered",
    };
    f.write_str(s)
  }
}

fn enter(ws: &RunWorkspace, stage: Stage) {
  debug!(target: "exam_forge", run_id = %ws.run_id(), %stage, "Pipeline stage");
}

/// A finished PDF, already read into memory; its files are gone.
#[derive(Debug)]
pub struct Delivery {
  pub filename: String,
  pub bytes: Vec<u8>,
}

/// `/analyze`: best-effort subject/grade/topic guess. Only upload validation
/// errors propagate; model failures become a placeholder object.
#[instrument(level = "info", skip_all)]
pub async fn analyze(state: &AppState, mut multipart: Multipart) -> Result<AnalyzeOut, ApiError> {
  let ws = open_workspace(state).await?;
  enter(&ws, Stage::Received);
  let limits = UploadLimits { max_images: state.settings.max_analyze_images, max_bytes: state.settings.max_upload_bytes };
  let form = ingest(&mut multipart, &ws, limits).await?;
  require_images(&form)?;
  enter(&ws, Stage::Validated);

  if state.settings.test_mode {
    return Ok(AnalyzeOut::from_guess(canned_guess()));
  }

  let Some(ai) = &state.ai else {
    warn!(target: "exam_forge", "Analyze requested without a configured model");
    return Ok(AnalyzeOut::placeholder("KI nicht verfügbar."));
  };

  let images = match encode_images(&form.images).await {
    Ok(images) => images,
    Err(e) => {
      warn!(target: "exam_forge", error = %e, "Could not encode images for analysis");
      return Ok(AnalyzeOut::placeholder("Bilder konnten nicht gelesen werden."));
    }
  };
  let request = VisionRequest { system: None, prompt: state.prompts.analyze.clone(), images, json_mode: true };
  let raw = match ai.ask(&request).await {
    Ok(raw) => raw,
    Err(e) => {
      let message = ApiError::from(e).public_message();
      return Ok(AnalyzeOut::placeholder(message));
    }
  };
  enter(&ws, Stage::Analyzed);

  match parse_subject_guess(&raw) {
    Ok(guess) => {
      info!(target: "exam_forge", fach = %guess.fach, klasse = %guess.klasse, "Analysis complete");
      Ok(AnalyzeOut::from_guess(guess))
    }
    Err(e) => {
      warn!(target: "exam_forge", error = %e, "Analysis output unusable; returning placeholder");
      Ok(AnalyzeOut::placeholder(ApiError::from(e).public_message()))
    }
  }
}

/// `/generate`: photos + form fields -> compiled exam PDF.
#[instrument(level = "info", skip_all)]
pub async fn generate(state: &AppState, mut multipart: Multipart) -> Result<Delivery, ApiError> {
  let settings = &state.settings;
  let ws = open_workspace(state).await?;
  enter(&ws, Stage::Received);

  let limits = UploadLimits { max_images: settings.max_generate_images, max_bytes: settings.max_upload_bytes };
  let form = ingest(&mut multipart, &ws, limits).await?;
  require_images(&form)?;
  let params = request_params(&form)?;
  enter(&ws, Stage::Validated);
  info!(target: "exam_forge", run_id = %ws.run_id(), subject = %params.subject, kind = ?params.kind, images = form.images.len(), "Generating exam");

  let draft = if settings.test_mode {
    canned_draft(&params.topic)
  } else {
    let raw = ask_for_exam(state, &form, &params).await?;
    enter(&ws, Stage::Analyzed);
    parse_exam_draft(&raw)?
  };
  enter(&ws, Stage::Normalized);

  let scale = GradeScale::compute(draft.total_points(), settings.grade_thresholds);
  let source = render_source(state, &ws, &draft, &scale, &params).await;
  let source_path = ws.source_path();
  tokio::fs::write(&source_path, source)
    .await
    .map_err(|e| ApiError::internal(e, "Failed to write document source"))?;
  enter(&ws, Stage::Rendered);

  let pdf = state.compiler.compile(&source_path, ws.dir()).await?;
  enter(&ws, Stage::Compiled);

  let number = state
    .counter
    .next()
    .await
    .map_err(|e| ApiError::internal(e, "Failed to advance download counter"))?;
  let bytes = tokio::fs::read(&pdf).await.map_err(|e| ApiError::internal(e, "Failed to read PDF"))?;
  let filename = download_filename(&settings.brand_name, params.kind, number);
  enter(&ws, Stage::Delivered);
  info!(target: "exam_forge", run_id = %ws.run_id(), %filename, size = bytes.len(), "Exam ready");

  drop(ws);
  Ok(Delivery { filename, bytes })
}

async fn open_workspace(state: &AppState) -> Result<RunWorkspace, ApiError> {
  RunWorkspace::create(&state.settings.work_dir)
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create run workspace"))
}

fn request_params(form: &UploadForm) -> Result<ExamRequestParams, ApiError> {
  let subject = form
    .text("userFach")
    .ok_or_else(|| ApiError::Validation("Bitte ein Fach angeben.".into()))?;
  Ok(ExamRequestParams {
    subject: subject.to_string(),
    grade_label: form.text("userKlasse").unwrap_or(DEFAULT_GRADE_LABEL).to_string(),
    topic: form.text("userThema").unwrap_or_default().to_string(),
    kind: ExamKind::from_form(form.text("examType")),
  })
}

/// Build the exam prompt and call the model.
async fn ask_for_exam(state: &AppState, form: &UploadForm, params: &ExamRequestParams) -> Result<String, ApiError> {
  let ai = state
    .ai
    .as_ref()
    .ok_or_else(|| ApiError::Upstream("no model configured".into()))?;
  let images = encode_images(&form.images).await?;
  let request = VisionRequest {
    system: Some(state.prompts.exam_system.clone()),
    prompt: exam_prompt(state, params),
    images,
    json_mode: true,
  };
  Ok(ai.ask(&request).await?)
}

fn exam_prompt(state: &AppState, params: &ExamRequestParams) -> String {
  let policy = params.kind.policy();
  let minutes = policy.minutes.to_string();
  let tasks = format!("{} bis {}", policy.min_tasks, policy.max_tasks);
  fill_template(
    &state.prompts.exam_context_template,
    &[
      ("fach", &params.subject),
      ("klasse", &params.grade_label),
      ("thema", &params.topic),
      ("art", policy.label),
      ("minuten", &minutes),
      ("aufgaben", &tasks),
      ("lehrplan", state.prompts.curriculum_for(&params.subject)),
    ],
  )
  .trim()
  .to_string()
}

async fn render_source(
  state: &AppState,
  ws: &RunWorkspace,
  draft: &ExamDraft,
  scale: &GradeScale,
  params: &ExamRequestParams,
) -> String {
  let settings = &state.settings;
  let logo_file = stage_logo(state, ws).await;
  let ctx = RenderContext {
    params,
    date: today(),
    logo_file,
    brand: &settings.brand_name,
    version: env!("CARGO_PKG_VERSION"),
    gap_width: &settings.gap_width,
  };
  render(draft, scale, &ctx)
}

/// Copy the branding logo next to the source; `None` falls back to the brand name.
async fn stage_logo(state: &AppState, ws: &RunWorkspace) -> Option<String> {
  let src = state.settings.assets_dir.join(LOGO_FILE);
  if !tokio::fs::try_exists(&src).await.unwrap_or(false) {
    return None;
  }
  match tokio::fs::copy(&src, ws.dir().join(LOGO_FILE)).await {
    Ok(_) => Some(LOGO_FILE.to_string()),
    Err(e) => {
      warn!(target: "exam_forge", error = %e, "Could not stage logo; using brand name");
      None
    }
  }
}

fn today() -> String {
  OffsetDateTime::now_utc()
    .format(format_description!("[day].[month].[year]"))
    .unwrap_or_default()
}

/// `<brand>_<EX|SA>_<n>.pdf`, restricted to header-safe characters.
pub fn download_filename(brand: &str, kind: ExamKind, number: u64) -> String {
  let brand: String = brand
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
    .collect();
  let brand = if brand.is_empty() { "exam".to_string() } else { brand };
  format!("{brand}_{}_{number}.pdf", kind.policy().code)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn filename_contains_kind_code_and_number() {
    assert_eq!(download_filename("efectoTEC", ExamKind::FullExam, 7), "efectoTEC_SA_7.pdf");
    assert_eq!(download_filename("efectoTEC", ExamKind::ShortForm, 8), "efectoTEC_EX_8.pdf");
    assert_eq!(download_filename("Gym \"Süd\"", ExamKind::FullExam, 1), "Gym___S_d__SA_1.pdf");
    assert_eq!(download_filename("", ExamKind::FullExam, 1), "exam_SA_1.pdf");
  }

  #[test]
  fn params_require_subject_and_default_grade() {
    let mut form = UploadForm::default();
    assert!(matches!(request_params(&form), Err(ApiError::Validation(_))));
    form.fields.insert("userFach".into(), "Mathematik".into());
    form.fields.insert("examType".into(), "ex".into());
    let p = request_params(&form).unwrap();
    assert_eq!(p.grade_label, "9");
    assert_eq!(p.topic, "");
    assert_eq!(p.kind, ExamKind::ShortForm);
  }

  #[test]
  fn date_is_day_month_year() {
    let d = today();
    assert_eq!(d.len(), 10);
    assert_eq!(&d[2..3], ".");
    assert_eq!(&d[5..6], ".");
  }
}
