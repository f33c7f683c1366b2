//! Turn raw model text into a fully-typed `ExamDraft` (or `SubjectGuess`).
//!
//! Steps: trim, strip a code fence, unescape `\'`, parse against a schema in
//! which every field is optional, then fill defaults. Nothing optional leaves
//! this module: the renderer only ever sees normalized data.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::domain::{ExamDraft, SubjectGuess, Subtask, Task};
use crate::error::ApiError;
use crate::util::trunc_for_log;

/// Total used when no task declares any points.
pub const DEFAULT_TOTAL_POINTS: u32 = 20;
/// Upper bound for a single task's points; larger model values are clamped.
pub const MAX_TASK_POINTS: u32 = 1000;

/// Title shown when cleaning leaves nothing.
pub const TITLE_PLACEHOLDER: &str = "Ohne Titel";

/// Exam-type labels and generic exam words never allowed in a topic title.
/// Longer words first so "Klassenarbeit" is not reduced to "narbeit".
const FORBIDDEN_TITLE_WORDS: &[&str] = &[
  "Stegreifaufgabe",
  "Schulaufgabe",
  "Klassenarbeit",
  "Klausur",
  "Klasse",
  "Prüfung",
  "Exam",
  "Test",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedOutput {
  #[error("empty model response")]
  Empty,
  #[error("response is not valid JSON: {0}")]
  NotJson(String),
  #[error("response has no task list")]
  MissingTasks,
  #[error("response task list is empty")]
  NoTasks,
}

impl From<MalformedOutput> for ApiError {
  fn from(e: MalformedOutput) -> Self {
    ApiError::MalformedModelOutput(e.to_string())
  }
}

/// Trim, drop a surrounding code fence (```json ... ```), and unescape `\'`.
pub fn clean_model_text(raw: &str) -> String {
  let mut text = raw.trim();
  if let Some(rest) = text.strip_prefix("```") {
    // Optional language tag up to the first newline.
    let tag_len = rest.find(|c: char| !c.is_ascii_alphanumeric()).unwrap_or(rest.len());
    text = &rest[tag_len..];
  }
  if let Some(rest) = text.trim_end().strip_suffix("```") {
    text = rest;
  }
  text.trim().replace("\\'", "'")
}

/// Parse model text into a normalized exam draft.
pub fn parse_exam_draft(raw: &str) -> Result<ExamDraft, MalformedOutput> {
  let text = clean_model_text(raw);
  if text.is_empty() {
    return Err(MalformedOutput::Empty);
  }
  let parsed: RawExam = serde_json::from_str(&text).map_err(|e| {
    warn!(target: "exam_forge", error = %e, raw = %trunc_for_log(raw, 400), "Model output failed to parse");
    MalformedOutput::NotJson(e.to_string())
  })?;

  let tasks = parsed.aufgaben.ok_or(MalformedOutput::MissingTasks)?;
  if tasks.is_empty() {
    return Err(MalformedOutput::NoTasks);
  }

  let mut draft = ExamDraft {
    title: parsed.titel.unwrap_or_default(),
    aids: parsed.hilfsmittel.filter(|s| !s.trim().is_empty()),
    tasks: tasks.into_iter().map(RawTask::into_task).collect(),
  };
  apply_point_fallback(&mut draft);
  Ok(draft)
}

/// Parse the `/analyze` answer. Missing fields become empty strings.
pub fn parse_subject_guess(raw: &str) -> Result<SubjectGuess, MalformedOutput> {
  let text = clean_model_text(raw);
  if text.is_empty() {
    return Err(MalformedOutput::Empty);
  }
  let parsed: RawGuess =
    serde_json::from_str(&text).map_err(|e| MalformedOutput::NotJson(e.to_string()))?;
  Ok(SubjectGuess {
    fach: parsed.fach.unwrap_or_default(),
    klasse: parsed.klasse.unwrap_or_default(),
    thema: parsed.thema.unwrap_or_default(),
  })
}

/// When the model declared no points at all, spread the default total over the
/// tasks so that the per-task row still sums to the total.
pub fn apply_point_fallback(draft: &mut ExamDraft) {
  if draft.total_points() > 0 || draft.tasks.is_empty() {
    return;
  }
  let n = draft.tasks.len() as u32;
  let (share, rest) = (DEFAULT_TOTAL_POINTS / n, DEFAULT_TOTAL_POINTS % n);
  for (i, task) in draft.tasks.iter_mut().enumerate() {
    task.points = share + u32::from((i as u32) < rest);
  }
}

fn forbidden_words_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    let alternation = FORBIDDEN_TITLE_WORDS.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|");
    Regex::new(&format!("(?i){alternation}")).expect("static title regex")
  })
}

fn is_edge_punct(c: char) -> bool {
  c.is_whitespace() || matches!(c, ':' | '-' | '–' | '—' | ',' | ';' | '|' | '/' | '.')
}

/// Remove exam-type words from a title, collapse whitespace, trim edge punctuation.
/// Idempotent; an empty result becomes `TITLE_PLACEHOLDER`.
pub fn clean_title(title: &str) -> String {
  let re = forbidden_words_re();
  let mut current = title.to_string();
  // Removing a word can join two halves into a new forbidden word; repeat to a fixpoint.
  loop {
    let next = re.replace_all(&current, "").into_owned();
    if next == current { break; }
    current = next;
  }
  let collapsed = current.split_whitespace().collect::<Vec<_>>().join(" ");
  let trimmed = collapsed.trim_matches(is_edge_punct);
  if trimmed.is_empty() { TITLE_PLACEHOLDER.to_string() } else { trimmed.to_string() }
}

// --- Lenient wire schema ---

#[derive(Deserialize)]
struct RawExam {
  #[serde(default, deserialize_with = "lenient_text")]
  titel: Option<String>,
  #[serde(default, deserialize_with = "lenient_text")]
  hilfsmittel: Option<String>,
  #[serde(default)]
  aufgaben: Option<Vec<RawTask>>,
}

#[derive(Deserialize)]
struct RawTask {
  #[serde(default, deserialize_with = "lenient_text")]
  anweisung: Option<String>,
  #[serde(default, deserialize_with = "lenient_text")]
  inhalt: Option<String>,
  #[serde(default, deserialize_with = "lenient_text")]
  loesung: Option<String>,
  #[serde(default)]
  subtasks: Option<Vec<RawSubtask>>,
  #[serde(default)]
  punkte: Option<Value>,
  #[serde(default)]
  be: Option<Value>,
}

impl RawTask {
  fn into_task(self) -> Task {
    let points = self.punkte.as_ref().and_then(points_of)
      .filter(|p| *p > 0)
      .or_else(|| self.be.as_ref().and_then(points_of))
      .unwrap_or(0);
    Task {
      instruction: self.anweisung.unwrap_or_default(),
      body: self.inhalt.unwrap_or_default(),
      solution: self.loesung.unwrap_or_default(),
      points,
      subtasks: self.subtasks.unwrap_or_default().into_iter().map(RawSubtask::into_subtask).collect(),
    }
  }
}

#[derive(Deserialize)]
struct RawSubtask {
  #[serde(default, deserialize_with = "lenient_text")]
  inhalt: Option<String>,
  #[serde(default, deserialize_with = "lenient_text")]
  text: Option<String>,
  #[serde(default, deserialize_with = "lenient_text")]
  loesung: Option<String>,
}

impl RawSubtask {
  fn into_subtask(self) -> Subtask {
    Subtask {
      body: self.inhalt.filter(|s| !s.is_empty()).or(self.text).unwrap_or_default(),
      solution: self.loesung.unwrap_or_default(),
    }
  }
}

#[derive(Deserialize)]
struct RawGuess {
  #[serde(default, deserialize_with = "lenient_text")]
  fach: Option<String>,
  #[serde(default, deserialize_with = "lenient_text")]
  klasse: Option<String>,
  #[serde(default, deserialize_with = "lenient_text")]
  thema: Option<String>,
}

/// Accept strings, numbers and booleans as text; anything else counts as absent.
fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
  let v = Option::<Value>::deserialize(d)?;
  Ok(match v {
    Some(Value::String(s)) => Some(s),
    Some(Value::Number(n)) => Some(n.to_string()),
    Some(Value::Bool(b)) => Some(b.to_string()),
    _ => None,
  })
}

/// Non-negative integer points from a number or numeric string, capped at `MAX_TASK_POINTS`.
fn points_of(v: &Value) -> Option<u32> {
  let raw = match v {
    Value::Number(n) => n.as_f64()?,
    Value::String(s) => s.trim().parse::<f64>().ok()?,
    _ => return None,
  };
  (raw.is_finite() && raw >= 0.0).then(|| raw.round().min(f64::from(MAX_TASK_POINTS)) as u32)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strips_fences_and_escaped_quotes() {
    assert_eq!(clean_model_text("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    assert_eq!(clean_model_text("  ```\n{}\n```  "), "{}");
    assert_eq!(clean_model_text("{\"t\":\"it\\'s\"}"), "{\"t\":\"it's\"}");
    assert_eq!(clean_model_text("{}"), "{}");
  }

  #[test]
  fn parses_full_draft() {
    let raw = r#"```json
    { "titel": "Quadratische Funktionen", "hilfsmittel": "Taschenrechner",
      "aufgaben": [
        { "anweisung": "Löse.", "inhalt": "x^2 = 4", "loesung": "x = ±2", "punkte": 6,
          "subtasks": [ { "inhalt": "a) Skizze", "loesung": "Parabel" }, { "text": "b) Scheitel" } ] },
        { "anweisung": "Erkläre.", "be": "4" }
      ] }
    ```"#;
    let d = parse_exam_draft(raw).unwrap();
    assert_eq!(d.title, "Quadratische Funktionen");
    assert_eq!(d.aids.as_deref(), Some("Taschenrechner"));
    assert_eq!(d.tasks.len(), 2);
    assert_eq!(d.tasks[0].points, 6);
    assert_eq!(d.tasks[0].subtasks[1].body, "b) Scheitel");
    assert_eq!(d.tasks[0].subtasks[1].solution, "");
    assert_eq!(d.tasks[1].points, 4);
    assert_eq!(d.tasks[1].body, "");
    assert_eq!(d.total_points(), 10);
  }

  #[test]
  fn tolerates_nulls_and_odd_types() {
    let raw = r#"{ "titel": null, "hilfsmittel": "", "aufgaben": [ { "anweisung": 42, "subtasks": null, "punkte": -3 } ] }"#;
    let d = parse_exam_draft(raw).unwrap();
    assert_eq!(d.title, "");
    assert_eq!(d.aids, None);
    assert_eq!(d.tasks[0].instruction, "42");
    assert!(d.tasks[0].subtasks.is_empty());
    // Negative points are ignored, so the default total applies.
    assert_eq!(d.total_points(), DEFAULT_TOTAL_POINTS);
  }

  #[test]
  fn rejects_empty_string() {
    assert_eq!(parse_exam_draft(""), Err(MalformedOutput::Empty));
    assert_eq!(parse_exam_draft("  ```json\n```  "), Err(MalformedOutput::Empty));
  }

  #[test]
  fn rejects_prose() {
    assert!(matches!(
      parse_exam_draft("Leider kann ich die Bilder nicht lesen."),
      Err(MalformedOutput::NotJson(_))
    ));
  }

  #[test]
  fn rejects_missing_or_empty_task_list() {
    assert_eq!(parse_exam_draft(r#"{"titel":"x"}"#), Err(MalformedOutput::MissingTasks));
    assert_eq!(parse_exam_draft(r#"{"titel":"x","aufgaben":null}"#), Err(MalformedOutput::MissingTasks));
    assert_eq!(parse_exam_draft(r#"{"aufgaben":[]}"#), Err(MalformedOutput::NoTasks));
    assert!(matches!(parse_exam_draft("[1,2,3]"), Err(MalformedOutput::NotJson(_))));
  }

  #[test]
  fn malformed_output_maps_to_api_error() {
    let e: ApiError = MalformedOutput::NoTasks.into();
    assert!(matches!(e, ApiError::MalformedModelOutput(_)));
  }

  #[test]
  fn point_fallback_distributes_default_total() {
    let mut d = ExamDraft { tasks: vec![Task::default(); 3], ..Default::default() };
    apply_point_fallback(&mut d);
    let pts: Vec<u32> = d.tasks.iter().map(|t| t.points).collect();
    assert_eq!(pts, vec![7, 7, 6]);
    assert_eq!(d.total_points(), DEFAULT_TOTAL_POINTS);
  }

  #[test]
  fn point_fallback_keeps_declared_points() {
    let mut d = ExamDraft { tasks: vec![Task { points: 5, ..Default::default() }, Task::default()], ..Default::default() };
    apply_point_fallback(&mut d);
    assert_eq!(d.total_points(), 5);
  }

  #[test]
  fn title_cleaning_strips_forbidden_words() {
    assert_eq!(clean_title("Schulaufgabe: Quadratische Funktionen"), "Quadratische Funktionen");
    assert_eq!(clean_title("  Test -  Bruchrechnung  KLASSE 7 "), "Bruchrechnung 7");
    assert_eq!(clean_title("Prüfung – Photosynthese"), "Photosynthese");
    assert_eq!(clean_title("Klassenarbeit Optik"), "Optik");
  }

  #[test]
  fn title_cleaning_is_idempotent() {
    for t in ["Quadratische Funktionen", "Schulaufgabe: Lineare Gleichungen", "TeTestst Optik", "", "a - b"] {
      let once = clean_title(t);
      assert_eq!(clean_title(&once), once, "input {t:?}");
    }
  }

  #[test]
  fn title_of_only_forbidden_words_yields_placeholder() {
    assert_eq!(clean_title("Schulaufgabe Klasse Test"), TITLE_PLACEHOLDER);
    assert_eq!(clean_title("  EXAM - prüfung: "), TITLE_PLACEHOLDER);
    assert_eq!(clean_title(""), TITLE_PLACEHOLDER);
  }

  #[test]
  fn parses_subject_guess_with_numeric_grade() {
    let g = parse_subject_guess(r#"{"fach":"Mathematik","klasse":9,"thema":"Terme"}"#).unwrap();
    assert_eq!(g, SubjectGuess { fach: "Mathematik".into(), klasse: "9".into(), thema: "Terme".into() });
    assert!(matches!(parse_subject_guess("kein json"), Err(MalformedOutput::NotJson(_))));
  }

  #[test]
  fn huge_point_values_are_clamped() {
    let d = parse_exam_draft(r#"{"titel":"x","aufgaben":[{"punkte":4294967295},{"punkte":4294967295}]}"#).unwrap();
    assert_eq!(d.tasks[0].points, MAX_TASK_POINTS);
    assert_eq!(d.total_points(), 2 * MAX_TASK_POINTS);

    let d = parse_exam_draft(r#"{"aufgaben":[{"punkte":"1e12"},{"be":1e300},{"punkte":"NaN","be":"7.6"},{"punkte":"inf"}]}"#).unwrap();
    let points: Vec<u32> = d.tasks.iter().map(|t| t.points).collect();
    assert_eq!(points, vec![MAX_TASK_POINTS, MAX_TASK_POINTS, 8, 0]);
  }
}
