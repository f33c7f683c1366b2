//! Runtime configuration.
//!
//! `Settings` is resolved once from the environment at startup and shared via
//! `AppState`. `Prompts` (model instructions + curriculum table) can be
//! overridden from a TOML file at PROMPTS_CONFIG_PATH.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid value for {field}: {value:?}")]
  InvalidValue { field: &'static str, value: String },
  #[error("GRADE_THRESHOLDS must be five strictly decreasing percentages in 1..=100, got {0:?}")]
  InvalidThresholds(String),
}

#[derive(Clone, Debug)]
pub struct Settings {
  pub port: u16,
  pub openai_api_key: Option<String>,
  pub openai_base_url: String,
  pub openai_model: String,
  pub ai_timeout: Duration,
  pub test_mode: bool,
  pub rate_limit_window: Duration,
  pub rate_limit_max: u32,
  /// Key the rate limiter on `X-Forwarded-For` (only behind a reverse proxy).
  pub trust_proxy: bool,
  pub max_upload_bytes: u64,
  pub max_analyze_images: usize,
  pub max_generate_images: usize,
  pub work_dir: PathBuf,
  pub counter_path: PathBuf,
  pub static_dir: PathBuf,
  pub assets_dir: PathBuf,
  pub latex_bin: String,
  pub latex_timeout: Duration,
  pub gap_width: String,
  pub brand_name: String,
  /// Cumulative percentages for grades 1..=5, strictly decreasing.
  pub grade_thresholds: [u32; 5],
  pub prompts_path: Option<PathBuf>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      port: 8080,
      openai_api_key: None,
      openai_base_url: "https://api.openai.com/v1".into(),
      openai_model: "gpt-4o-mini".into(),
      ai_timeout: Duration::from_secs(15),
      test_mode: false,
      rate_limit_window: Duration::from_secs(15 * 60),
      rate_limit_max: 100,
      trust_proxy: false,
      max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
      max_analyze_images: 4,
      max_generate_images: 5,
      work_dir: std::env::temp_dir().join("exam-forge"),
      counter_path: PathBuf::from("./counter.json"),
      static_dir: PathBuf::from("./static"),
      assets_dir: PathBuf::from("./assets"),
      latex_bin: "pdflatex".into(),
      latex_timeout: Duration::from_secs(60),
      gap_width: "3cm".into(),
      brand_name: "efectoTEC".into(),
      grade_thresholds: [85, 70, 55, 45, 20],
      prompts_path: None,
    }
  }
}

impl Settings {
  /// Read every setting from the environment, falling back to defaults.
  pub fn from_env() -> Result<Self, ConfigError> {
    let d = Settings::default();
    Ok(Self {
      port: env_parse("PORT")?.unwrap_or(d.port),
      openai_api_key: env_optional("OPENAI_API_KEY"),
      openai_base_url: env_optional("OPENAI_BASE_URL")
        .map(|u| u.trim_end_matches('/').to_string())
        .unwrap_or(d.openai_base_url),
      openai_model: env_optional("OPENAI_MODEL").unwrap_or(d.openai_model),
      ai_timeout: env_parse("AI_TIMEOUT_SECS")?.map(Duration::from_secs).unwrap_or(d.ai_timeout),
      test_mode: env_optional("TEST_MODE").map(|v| parse_bool(&v)).unwrap_or(false),
      rate_limit_window: env_parse("RATE_LIMIT_WINDOW_SECS")?
        .map(Duration::from_secs)
        .unwrap_or(d.rate_limit_window),
      rate_limit_max: env_parse("RATE_LIMIT_MAX")?.unwrap_or(d.rate_limit_max),
      trust_proxy: env_optional("TRUST_PROXY").map(|v| parse_bool(&v)).unwrap_or(d.trust_proxy),
      max_upload_bytes: env_parse("MAX_UPLOAD_BYTES")?.unwrap_or(d.max_upload_bytes),
      max_analyze_images: env_parse("MAX_ANALYZE_IMAGES")?.unwrap_or(d.max_analyze_images),
      max_generate_images: env_parse("MAX_GENERATE_IMAGES")?.unwrap_or(d.max_generate_images),
      work_dir: env_optional("WORK_DIR").map(PathBuf::from).unwrap_or(d.work_dir),
      counter_path: env_optional("COUNTER_PATH").map(PathBuf::from).unwrap_or(d.counter_path),
      static_dir: env_optional("STATIC_DIR").map(PathBuf::from).unwrap_or(d.static_dir),
      assets_dir: env_optional("ASSETS_DIR").map(PathBuf::from).unwrap_or(d.assets_dir),
      latex_bin: env_optional("LATEX_BIN").unwrap_or(d.latex_bin),
      latex_timeout: env_parse("LATEX_TIMEOUT_SECS")?
        .map(Duration::from_secs)
        .unwrap_or(d.latex_timeout),
      gap_width: env_optional("GAP_WIDTH").unwrap_or(d.gap_width),
      brand_name: env_optional("BRAND_NAME").unwrap_or(d.brand_name),
      grade_thresholds: match env_optional("GRADE_THRESHOLDS") {
        Some(raw) => parse_thresholds(&raw)?,
        None => d.grade_thresholds,
      },
      prompts_path: env_optional("PROMPTS_CONFIG_PATH").map(PathBuf::from),
    })
  }

  /// Largest request body we accept: every image at its cap plus form overhead.
  pub fn body_limit(&self) -> usize {
    let images = self.max_analyze_images.max(self.max_generate_images) as u64;
    let bytes = images.saturating_mul(self.max_upload_bytes).saturating_add(1024 * 1024);
    usize::try_from(bytes).unwrap_or(usize::MAX)
  }
}

fn env_optional(key: &str) -> Option<String> {
  std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
  match env_optional(key) {
    None => Ok(None),
    Some(value) => value
      .parse::<T>()
      .map(Some)
      .map_err(|_| ConfigError::InvalidValue { field: key, value }),
  }
}

fn parse_bool(value: &str) -> bool {
  matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

pub fn parse_thresholds(raw: &str) -> Result<[u32; 5], ConfigError> {
  let parsed: Result<Vec<u32>, _> = raw.split(',').map(|p| p.trim().parse::<u32>()).collect();
  let values = parsed.map_err(|_| ConfigError::InvalidThresholds(raw.to_string()))?;
  let arr: [u32; 5] = values
    .try_into()
    .map_err(|_| ConfigError::InvalidThresholds(raw.to_string()))?;
  let in_range = arr.iter().all(|p| (1..=100).contains(p));
  let decreasing = arr.windows(2).all(|w| w[0] > w[1]);
  if in_range && decreasing { Ok(arr) } else { Err(ConfigError::InvalidThresholds(raw.to_string())) }
}

/// TOML schema for PROMPTS_CONFIG_PATH.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptConfig {
  #[serde(default)]
  pub prompts: Prompts,
}

/// Keyword-matched curriculum hint appended to the exam prompt.
#[derive(Clone, Debug, Deserialize)]
pub struct CurriculumEntry {
  pub keywords: Vec<String>,
  pub context: String,
}

/// Instructions sent to the vision model. Defaults target Bavarian Gymnasium exams.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub exam_system: String,
  pub exam_context_template: String,
  pub analyze: String,
  pub curriculum: Vec<CurriculumEntry>,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      exam_system: r#"Du bist ein professioneller Lehrer an einem Gymnasium in Bayern.
Du erstellst Prüfungen streng nach Lehrplan. Verwende ausschließlich Standarddeutsch (Hochdeutsch).
DEINE AUFGABE: Erstelle eine Prüfung basierend auf den Bildern im folgenden JSON-Format.
KRITISCHE REGELN:
1. NIEMALS Math-Mode ($...$) für normalen Text verwenden.
2. Lückentexte IMMER als normalen Text mit Platzhalter _____ (5 Unterstriche).
3. Unteraufgaben (a, b, c) MÜSSEN im "subtasks"-Array landen.
4. Jede Aufgabe MUSS eine "loesung" enthalten.
5. Der "titel" darf NUR das Thema enthalten.
JSON-SCHEMA: { "titel": "Thema (Kurz)", "hilfsmittel": "Hilfsmittel", "aufgaben": [ { "anweisung": "Frage", "inhalt": "Text", "loesung": "Lsg", "subtasks": [ { "inhalt": "a)", "loesung": "b)" } ], "punkte": 10 } ] }"#.into(),
      exam_context_template: "Kontext: Fach {fach}, Klasse {klasse}, Thema {thema}. Art: {art} ({minuten} Minuten, {aufgaben} Aufgaben). {lehrplan}".into(),
      analyze: r#"Analysiere die Bilder eines Hefteintrags. Antworte nur mit JSON: { "fach": "...", "klasse": "...", "thema": "..." }"#.into(),
      curriculum: vec![
        CurriculumEntry {
          keywords: vec!["mathe".into()],
          context: "Lehrplan: LehrplanPLUS Gymnasium Bayern, Mathematik. Rechenwege in der Lösung vollständig angeben.".into(),
        },
        CurriculumEntry {
          keywords: vec!["englisch".into(), "english".into()],
          context: "Lehrplan: LehrplanPLUS Gymnasium Bayern, Englisch. Aufgabenstellungen auf Englisch formulieren.".into(),
        },
        CurriculumEntry {
          keywords: vec!["deutsch".into()],
          context: "Lehrplan: LehrplanPLUS Gymnasium Bayern, Deutsch.".into(),
        },
        CurriculumEntry {
          keywords: vec!["physik".into(), "chemie".into(), "biologie".into()],
          context: "Lehrplan: LehrplanPLUS Gymnasium Bayern, Naturwissenschaften. Einheiten stets angeben.".into(),
        },
      ],
    }
  }
}

impl Prompts {
  /// First curriculum entry whose keyword occurs in the subject name (case-insensitive).
  pub fn curriculum_for(&self, subject: &str) -> &str {
    let subject = subject.to_lowercase();
    self
      .curriculum
      .iter()
      .find(|entry| entry.keywords.iter().any(|k| subject.contains(&k.to_lowercase())))
      .map(|entry| entry.context.as_str())
      .unwrap_or("")
  }
}

/// Load prompts from `path`. On any IO/parse error we log and keep the defaults.
pub fn load_prompts(path: Option<&PathBuf>) -> Prompts {
  let Some(path) = path else { return Prompts::default() };
  match std::fs::read_to_string(path) {
    Ok(s) => match toml::from_str::<PromptConfig>(&s) {
      Ok(cfg) => {
        info!(target: "exam_forge", path = %path.display(), "Loaded prompt config (TOML)");
        cfg.prompts
      }
      Err(e) => {
        error!(target: "exam_forge", path = %path.display(), error = %e, "Failed to parse TOML config");
        Prompts::default()
      }
    },
    Err(e) => {
      error!(target: "exam_forge", path = %path.display(), error = %e, "Failed to read TOML config file");
      Prompts::default()
    }
  }
}
