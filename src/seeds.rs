//! Canned data for TEST_MODE: lets the whole pipeline run without a model.

use crate::domain::{ExamDraft, SubjectGuess, Subtask, Task};

/// Stand-in exam draft. The title is the user's topic (or a fixed fallback).
pub fn canned_draft(topic: &str) -> ExamDraft {
  let title = if topic.trim().is_empty() { "Test Thema" } else { topic.trim() };
  ExamDraft {
    title: title.to_string(),
    aids: Some("Keine".into()),
    tasks: vec![Task {
      instruction: "Berechne.".into(),
      body: String::new(),
      solution: String::new(),
      points: 4,
      subtasks: vec![
        Subtask { body: "2+2".into(), solution: "4".into() },
        Subtask { body: "4+4".into(), solution: "8".into() },
      ],
    }],
  }
}

/// Stand-in `/analyze` answer.
pub fn canned_guess() -> SubjectGuess {
  SubjectGuess { fach: "Mathe".into(), klasse: "10".into(), thema: "Test".into() }
}
