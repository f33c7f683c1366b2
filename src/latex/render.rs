//! Exam layout: `ExamDraft` + `GradeScale` -> `Document`.
//!
//! Page one onwards holds the tasks and the grading block; after a page break
//! the same tasks are repeated with their solutions ("Musterlösung").

use crate::domain::{ExamDraft, ExamRequestParams, Task};
use crate::grading::{GradeBand, GradeScale};
use crate::normalize::clean_title;

use super::doc::{Block, Document, HeaderFields, Inline, Logo, Table};

/// Everything besides the draft and the scale that ends up on paper.
#[derive(Clone, Debug)]
pub struct RenderContext<'a> {
  pub params: &'a ExamRequestParams,
  /// Already formatted, e.g. "14.02.2026".
  pub date: String,
  /// Logo file name next to the source, if one was staged.
  pub logo_file: Option<String>,
  pub brand: &'a str,
  pub version: &'a str,
  pub gap_width: &'a str,
}

const DEFAULT_AIDS: &str = "Keine";
const MISSING_SOLUTION: &str = "Lösung folgt";

pub fn build_document(draft: &ExamDraft, scale: &GradeScale, ctx: &RenderContext<'_>) -> Document {
  let policy = ctx.params.kind.policy();

  let header = HeaderFields {
    logo: match &ctx.logo_file {
      Some(file) => Logo::Image(file.clone()),
      None => Logo::Brand(ctx.brand.to_string()),
    },
    subject: ctx.params.subject.clone(),
    grade_label: ctx.params.grade_label.clone(),
    topic: clean_title(&draft.title),
    date: ctx.date.clone(),
    duration: format!("{} Min.", policy.minutes),
    aids: draft.aids.clone().unwrap_or_else(|| DEFAULT_AIDS.to_string()),
  };

  let mut body = vec![Block::PageHeader(vec![Inline::text(policy.label)])];
  for (i, task) in draft.tasks.iter().enumerate() {
    task_blocks(&mut body, i + 1, task);
  }
  body.push(Block::VFill);
  body.push(grading_block(draft, scale));
  body.push(Block::NewPage);
  body.push(Block::PageHeader(vec![Inline::text("Musterlösung")]));
  for (i, task) in draft.tasks.iter().enumerate() {
    solution_blocks(&mut body, i + 1, task);
  }

  Document {
    header,
    footer_left: vec![Inline::raw(format!(
      "v{} | Seite \\thepage\\ von \\pageref{{LastPage}}",
      ctx.version
    ))],
    footer_right: vec![Inline::text(format!("Viel Erfolg wünscht dir {}!", ctx.brand))],
    gap_width: ctx.gap_width.to_string(),
    body,
  }
}

/// Convenience: build and serialize in one go.
pub fn render(draft: &ExamDraft, scale: &GradeScale, ctx: &RenderContext<'_>) -> String {
  build_document(draft, scale, ctx).to_source()
}

fn task_blocks(body: &mut Vec<Block>, number: usize, task: &Task) {
  body.push(Block::Heading {
    left: vec![Inline::text(format!("Aufgabe {number}"))],
    right: Some(vec![Inline::text(format!("/ {} BE", task.points))]),
  });
  if !task.instruction.trim().is_empty() {
    body.push(Block::Paragraph(vec![Inline::Content(task.instruction.clone())]));
  }
  // One- or two-character bodies are model noise such as "-" or "a)".
  if task.body.trim().chars().count() > 2 {
    body.push(Block::Paragraph(vec![Inline::Content(task.body.clone())]));
  }
  if !task.subtasks.is_empty() {
    body.push(Block::Enumerate(
      task.subtasks.iter().map(|s| vec![Inline::Content(s.body.clone())]).collect(),
    ));
  }
  body.push(Block::VSpace("1.0cm"));
}

fn solution_blocks(body: &mut Vec<Block>, number: usize, task: &Task) {
  body.push(Block::Heading { left: vec![Inline::text(format!("Zu Aufgabe {number}"))], right: None });
  if task.solution.trim().chars().count() > 1 {
    body.push(Block::Paragraph(vec![Inline::Content(task.solution.clone())]));
  }
  if task.subtasks.iter().any(|s| !s.solution.trim().is_empty()) {
    body.push(Block::Enumerate(
      task
        .subtasks
        .iter()
        .map(|s| {
          let text = if s.solution.trim().is_empty() { MISSING_SOLUTION } else { s.solution.as_str() };
          vec![Inline::Content(text.to_string())]
        })
        .collect(),
    ));
  }
  body.push(Block::VSpace("0.5cm"));
}

fn points_table(draft: &ExamDraft, total: u32) -> Table {
  let n = draft.tasks.len();
  let mut header = vec![vec![Inline::bold("Aufg.")]];
  let mut max_row = vec![vec![Inline::text("Max.")]];
  let mut achieved = vec![vec![Inline::text("Err.")]];
  for (i, task) in draft.tasks.iter().enumerate() {
    header.push(vec![Inline::text((i + 1).to_string())]);
    max_row.push(vec![Inline::text(task.points.to_string())]);
    achieved.push(vec![]);
  }
  header.push(vec![Inline::bold("Gesamt")]);
  max_row.push(vec![Inline::bold(total.to_string())]);
  achieved.push(vec![]);

  Table { columns: format!("|c|{}c|", "X|".repeat(n)), rows: vec![header, max_row, achieved] }
}

fn band_label(band: &GradeBand) -> Inline {
  match band.range {
    Some((lo, hi)) if lo == hi => Inline::text(lo.to_string()),
    Some((lo, hi)) => Inline::text(format!("{hi} - {lo}")),
    None => Inline::raw("--"),
  }
}

fn grade_table(scale: &GradeScale) -> Table {
  let mut grades = vec![vec![Inline::bold("Note")]];
  let mut points = vec![vec![Inline::text("Pkte")]];
  for band in &scale.bands {
    grades.push(vec![Inline::text(band.grade.to_string())]);
    points.push(vec![band_label(band)]);
  }
  Table { columns: "|c|X|X|X|X|X|X|".into(), rows: vec![grades, points] }
}

fn grading_block(draft: &ExamDraft, scale: &GradeScale) -> Block {
  Block::Minipage(vec![
    Block::Heading { left: vec![Inline::text("Bewertung:")], right: None },
    Block::VSpace("0.3cm"),
    Block::Table(points_table(draft, scale.total)),
    Block::VSpace("0.8cm"),
    Block::Table(grade_table(scale)),
    Block::VSpace("1cm"),
    Block::SignOff(vec![Inline::text("Note: "), Inline::Gap]),
  ])
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{ExamKind, Subtask};

  const THRESHOLDS: [u32; 5] = [85, 70, 55, 45, 20];

  fn params(kind: ExamKind) -> ExamRequestParams {
    ExamRequestParams {
      subject: "Mathematik".into(),
      grade_label: "9".into(),
      topic: "Quadratische Funktionen".into(),
      kind,
    }
  }

  fn ctx(p: &ExamRequestParams) -> RenderContext<'_> {
    RenderContext {
      params: p,
      date: "14.02.2026".into(),
      logo_file: None,
      brand: "efectoTEC",
      version: "0.1.0",
      gap_width: "3cm",
    }
  }

  fn draft() -> ExamDraft {
    ExamDraft {
      title: "Schulaufgabe: Parabeln & Scheitel".into(),
      aids: None,
      tasks: vec![
        Task {
          instruction: "Berechne den Scheitel von $f$.".into(),
          body: "f(x) = x^2 - 4".into(),
          solution: "S(0|-4)".into(),
          points: 12,
          subtasks: vec![
            Subtask { body: "Nullstellen: ___".into(), solution: "x = 2".into() },
            Subtask { body: "Skizze".into(), solution: String::new() },
          ],
        },
        Task { instruction: "Erkläre.".into(), body: "-".into(), solution: "".into(), points: 8, subtasks: vec![] },
      ],
    }
  }

  #[test]
  fn renders_deterministically() {
    let p = params(ExamKind::FullExam);
    let d = draft();
    let s = GradeScale::compute(d.total_points(), THRESHOLDS);
    assert_eq!(render(&d, &s, &ctx(&p)), render(&d, &s, &ctx(&p)));
  }

  #[test]
  fn header_uses_policy_and_clean_title() {
    let p = params(ExamKind::ShortForm);
    let d = draft();
    let s = GradeScale::compute(d.total_points(), THRESHOLDS);
    let src = render(&d, &s, &ctx(&p));
    assert!(src.contains(r"\myHeader{Stegreifaufgabe}"));
    assert!(src.contains(r"\textbf{Zeit:} 20 Min."));
    assert!(src.contains(r"Thema: \textbf{Parabeln \& Scheitel}"));
    assert!(src.contains(r"\textbf{Hilfsmittel:} Keine"));
    assert!(src.contains(r"\myHeader{Musterlösung}"));
  }

  #[test]
  fn tasks_and_solutions_are_escaped() {
    let p = params(ExamKind::FullExam);
    let d = draft();
    let s = GradeScale::compute(d.total_points(), THRESHOLDS);
    let src = render(&d, &s, &ctx(&p));
    assert!(src.contains(r"\textbf{Aufgabe 1} \hfill \small{/ 12 BE}"));
    assert!(src.contains(r"Berechne den Scheitel von \$f\$."));
    assert!(src.contains(r"f(x) = x\textasciicircum{}2 - 4"));
    assert!(src.contains(r"\item Nullstellen: \luecke{3cm}"));
    assert!(src.contains(r"\textbf{Zu Aufgabe 1}"));
    assert!(src.contains(r"\item x = 2"));
    assert!(src.contains(r"\item Lösung folgt"));
    // Too-short body of task 2 is dropped.
    assert!(!src.contains("\\noindent - \\par"));
  }

  #[test]
  fn grading_tables_have_one_column_per_task() {
    let p = params(ExamKind::FullExam);
    let d = draft();
    let s = GradeScale::compute(d.total_points(), THRESHOLDS);
    let doc = build_document(&d, &s, &ctx(&p));
    let Some(Block::Minipage(inner)) = doc.body.iter().find(|b| matches!(b, Block::Minipage(_))) else {
      panic!("grading block missing");
    };
    let tables: Vec<&Table> = inner.iter().filter_map(|b| match b { Block::Table(t) => Some(t), _ => None }).collect();
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0].columns, "|c|X|X|c|");
    assert!(tables[0].rows.iter().all(|r| r.len() == 4));
    assert_eq!(tables[1].columns, "|c|X|X|X|X|X|X|");
    assert!(tables[1].rows.iter().all(|r| r.len() == 7));

    let src = doc.to_source();
    assert!(src.contains(r"Max. & 12 & 8 & \textbf{20} \\ \hline"));
    assert!(src.contains(r"Pkte & 20 - 17 & 16 - 14 & 13 - 11 & 10 - 9 & 8 - 4 & 3 - 0 \\ \hline"));
  }

  #[test]
  fn unreachable_grades_render_as_dash() {
    let p = params(ExamKind::FullExam);
    let mut d = draft();
    d.tasks.truncate(1);
    d.tasks[0].points = 1;
    let s = GradeScale::compute(1, THRESHOLDS);
    let src = render(&d, &s, &ctx(&p));
    assert!(src.contains("Pkte & 1 & -- & -- & 0 & -- & -- \\\\ \\hline"));
  }

  #[test]
  fn empty_fields_are_tolerated() {
    let p = params(ExamKind::FullExam);
    let d = ExamDraft { title: String::new(), aids: None, tasks: vec![Task::default()] };
    let s = GradeScale::compute(0, THRESHOLDS);
    let src = render(&d, &s, &ctx(&p));
    assert!(src.contains(r"Thema: \textbf{Ohne Titel}"));
    assert!(src.contains(r"\textbf{Aufgabe 1}"));
    assert!(!src.contains(r"\begin{enumerate}"));
  }

  #[test]
  fn logo_file_is_included_when_staged() {
    let p = params(ExamKind::FullExam);
    let d = draft();
    let s = GradeScale::compute(d.total_points(), THRESHOLDS);
    let mut c = ctx(&p);
    c.logo_file = Some("logo.png".into());
    let src = render(&d, &s, &c);
    assert!(src.contains(r"\includegraphics[width=3.5cm]{logo.png}"));
  }
}
