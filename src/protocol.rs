//! Public JSON DTOs returned by the HTTP endpoints (serde ready).
//! Field names are what the frontend reads; keep them stable.

use serde::Serialize;

use crate::domain::SubjectGuess;

/// `/analyze` response. Always 200; `error` is set when the fields are placeholders.
#[derive(Debug, Serialize)]
pub struct AnalyzeOut {
    pub fach: String,
    pub klasse: String,
    pub thema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalyzeOut {
    pub fn from_guess(g: SubjectGuess) -> Self {
        Self { fach: g.fach, klasse: g.klasse, thema: g.thema, error: None }
    }

    /// Placeholder object keeping the frontend flow alive after an upstream failure.
    pub fn placeholder(message: impl Into<String>) -> Self {
        Self { fach: String::new(), klasse: String::new(), thema: String::new(), error: Some(message.into()) }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub status: u16,
    pub detail: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub version: &'static str,
    pub test_mode: bool,
}
