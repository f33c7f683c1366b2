//! Domain models: exam kinds and their policy, request parameters, and the
//! normalized exam draft that flows from the normalizer into the renderer.

use serde::Serialize;

/// Which kind of exam is requested?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamKind {
  /// Short-form "Stegreifaufgabe" (form value `ex`).
  ShortForm,
  /// Full-length "Schulaufgabe" (any other form value).
  FullExam,
}

/// Duration and size policy per exam kind.
#[derive(Debug)]
pub struct KindPolicy {
  pub label: &'static str,
  pub code: &'static str,
  pub minutes: u32,
  pub min_tasks: u32,
  pub max_tasks: u32,
}

const SHORT_FORM: KindPolicy = KindPolicy { label: "Stegreifaufgabe", code: "EX", minutes: 20, min_tasks: 2, max_tasks: 3 };
const FULL_EXAM: KindPolicy = KindPolicy { label: "Schulaufgabe", code: "SA", minutes: 60, min_tasks: 4, max_tasks: 6 };

impl ExamKind {
  pub fn from_form(value: Option<&str>) -> Self {
    match value.map(str::trim) {
      Some(v) if v.eq_ignore_ascii_case("ex") => ExamKind::ShortForm,
      _ => ExamKind::FullExam,
    }
  }

  pub fn policy(self) -> &'static KindPolicy {
    match self {
      ExamKind::ShortForm => &SHORT_FORM,
      ExamKind::FullExam => &FULL_EXAM,
    }
  }
}

impl Default for ExamKind {
  fn default() -> Self { ExamKind::FullExam }
}

/// User-supplied form fields for `/generate`.
#[derive(Clone, Debug)]
pub struct ExamRequestParams {
  pub subject: String,
  /// Free text, e.g. "9", "10b", "Q11".
  pub grade_label: String,
  pub topic: String,
  pub kind: ExamKind,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subtask {
  pub body: String,
  pub solution: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Task {
  pub instruction: String,
  pub body: String,
  pub solution: String,
  pub points: u32,
  pub subtasks: Vec<Subtask>,
}

/// Fully normalized model output. Every field is present; text may be empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExamDraft {
  pub title: String,
  pub aids: Option<String>,
  pub tasks: Vec<Task>,
}

impl ExamDraft {
  pub fn total_points(&self) -> u32 {
    self.tasks.iter().fold(0u32, |acc, t| acc.saturating_add(t.points))
  }
}

/// Best-effort metadata extracted from notebook photos by `/analyze`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SubjectGuess {
  pub fach: String,
  pub klasse: String,
  pub thema: String,
}
