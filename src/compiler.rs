//! Compilation driver.
//!
//! Runs the TeX engine twice (the second pass resolves `LastPage` and other
//! forward references) inside the run workspace, then decides success solely
//! by whether the PDF exists. Exit codes are logged but not trusted: pdflatex
//! in nonstopmode often exits non-zero on harmless warnings.

use std::{
  path::{Path, PathBuf},
  process::Stdio,
  sync::Arc,
  time::Duration,
};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{error, info, instrument, warn};

use crate::error::ApiError;
use crate::util::tail_for_log;

const PASSES: u32 = 2;

#[derive(Debug, Default)]
pub struct PassOutput {
  /// `None` when the process was killed (timeout) or never started.
  pub exit_code: Option<i32>,
  pub output: String,
}

/// One invocation of the external document compiler.
#[async_trait]
pub trait TexEngine: Send + Sync {
  async fn run_pass(&self, source: &Path, out_dir: &Path) -> std::io::Result<PassOutput>;
}

/// `pdflatex` (or a compatible binary) with shell escape disabled.
#[derive(Clone, Debug)]
pub struct PdfLatex {
  pub program: String,
  pub timeout: Duration,
}

#[async_trait]
impl TexEngine for PdfLatex {
  async fn run_pass(&self, source: &Path, out_dir: &Path) -> std::io::Result<PassOutput> {
    let mut cmd = Command::new(&self.program);
    cmd
      .arg("-interaction=nonstopmode")
      .arg("-no-shell-escape")
      .arg(format!("-output-directory={}", out_dir.display()))
      .arg(source)
      .current_dir(out_dir)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    let child = cmd.spawn()?;
    match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
      Ok(out) => {
        let out = out?;
        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));
        Ok(PassOutput { exit_code: out.status.code(), output })
      }
      // Dropping the wait future kills the child (kill_on_drop).
      Err(_) => Ok(PassOutput { exit_code: None, output: format!("killed after {:?}", self.timeout) }),
    }
  }
}

#[derive(Clone)]
pub struct CompilationDriver {
  engine: Arc<dyn TexEngine>,
}

impl CompilationDriver {
  pub fn new(engine: Arc<dyn TexEngine>) -> Self {
    Self { engine }
  }

  /// Compile `source` into `<out_dir>/<stem>.pdf` and return that path.
  #[instrument(level = "info", skip(self), fields(source = %source.display()))]
  pub async fn compile(&self, source: &Path, out_dir: &Path) -> Result<PathBuf, ApiError> {
    let stem = source
      .file_stem()
      .and_then(|s| s.to_str())
      .ok_or_else(|| ApiError::Rendering(format!("bad source path {}", source.display())))?;
    let artifact = out_dir.join(format!("{stem}.pdf"));
    let start = std::time::Instant::now();

    for pass in 1..=PASSES {
      match self.engine.run_pass(source, out_dir).await {
        Ok(out) if out.exit_code == Some(0) => {}
        Ok(out) => {
          warn!(target: "exam_forge", pass, exit_code = ?out.exit_code, output = %tail_for_log(&out.output, 800), "Compiler pass reported failure");
        }
        Err(e) => {
          error!(target: "exam_forge", pass, error = %e, "Compiler could not be started");
          return Err(ApiError::Rendering(format!("compiler not runnable: {e}")));
        }
      }
    }

    if tokio::fs::try_exists(&artifact).await.unwrap_or(false) {
      info!(target: "exam_forge", elapsed = ?start.elapsed(), "PDF produced");
      return Ok(artifact);
    }

    let log = tokio::fs::read_to_string(out_dir.join(format!("{stem}.log"))).await.unwrap_or_default();
    error!(target: "exam_forge", log_tail = %tail_for_log(&log, 2000), "No PDF after compiler passes");
    Err(ApiError::Rendering("no artifact after compilation".into()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use uuid::Uuid;

  /// Writes aux/log every pass and the PDF on `pdf_on_pass` (if any).
  struct ScriptedEngine {
    passes: AtomicU32,
    pdf_on_pass: Option<u32>,
    exit_code: i32,
  }

  impl ScriptedEngine {
    fn new(pdf_on_pass: Option<u32>, exit_code: i32) -> Self {
      Self { passes: AtomicU32::new(0), pdf_on_pass, exit_code }
    }
  }

  #[async_trait]
  impl TexEngine for ScriptedEngine {
    async fn run_pass(&self, source: &Path, out_dir: &Path) -> std::io::Result<PassOutput> {
      let pass = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
      let stem = source.file_stem().unwrap().to_str().unwrap();
      tokio::fs::write(out_dir.join(format!("{stem}.aux")), b"aux").await?;
      tokio::fs::write(out_dir.join(format!("{stem}.log")), b"! Undefined control sequence.").await?;
      if self.pdf_on_pass == Some(pass) {
        tokio::fs::write(out_dir.join(format!("{stem}.pdf")), b"%PDF-1.5").await?;
      }
      Ok(PassOutput { exit_code: Some(self.exit_code), output: String::new() })
    }
  }

  async fn scratch() -> (PathBuf, PathBuf) {
    let dir = std::env::temp_dir().join(format!("exam-forge-compile-{}", Uuid::new_v4()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let source = dir.join("exam.tex");
    tokio::fs::write(&source, b"\\documentclass{article}").await.unwrap();
    (dir, source)
  }

  #[tokio::test]
  async fn runs_two_passes_and_finds_artifact() {
    let (dir, source) = scratch().await;
    let engine = Arc::new(ScriptedEngine::new(Some(2), 0));
    let driver = CompilationDriver::new(engine.clone());
    let pdf = driver.compile(&source, &dir).await.unwrap();
    assert_eq!(pdf, dir.join("exam.pdf"));
    assert_eq!(engine.passes.load(Ordering::SeqCst), 2);
    tokio::fs::remove_dir_all(&dir).await.unwrap();
  }

  #[tokio::test]
  async fn nonzero_exit_with_artifact_is_success() {
    let (dir, source) = scratch().await;
    let driver = CompilationDriver::new(Arc::new(ScriptedEngine::new(Some(1), 1)));
    assert!(driver.compile(&source, &dir).await.is_ok());
    tokio::fs::remove_dir_all(&dir).await.unwrap();
  }

  #[tokio::test]
  async fn clean_exit_without_artifact_is_rendering_error() {
    let (dir, source) = scratch().await;
    let driver = CompilationDriver::new(Arc::new(ScriptedEngine::new(None, 0)));
    let err = driver.compile(&source, &dir).await.unwrap_err();
    assert!(matches!(err, ApiError::Rendering(_)));
    tokio::fs::remove_dir_all(&dir).await.unwrap();
  }

  #[tokio::test]
  async fn missing_binary_is_rendering_error() {
    let (dir, source) = scratch().await;
    let engine = PdfLatex { program: "exam-forge-no-such-tex-binary".into(), timeout: Duration::from_secs(5) };
    let driver = CompilationDriver::new(Arc::new(engine));
    let err = driver.compile(&source, &dir).await.unwrap_err();
    assert!(matches!(err, ApiError::Rendering(_)));
    tokio::fs::remove_dir_all(&dir).await.unwrap();
  }
}
