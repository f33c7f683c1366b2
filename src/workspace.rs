//! Per-request scratch directory.
//!
//! Every file a request creates (uploads, document source, compiler output,
//! copied logo) lives under one run-unique directory. The directory is removed
//! when the `RunWorkspace` is dropped, which happens on every exit path of the
//! handler, including errors and client disconnects (the handler future is
//! dropped by the server in that case).

use std::path::{Path, PathBuf};

use tracing::{debug, error};
use uuid::Uuid;

/// Stem shared by the document source and everything the compiler derives from it.
pub const DOCUMENT_STEM: &str = "exam";

#[derive(Debug)]
pub struct RunWorkspace {
  run_id: String,
  dir: PathBuf,
}

impl RunWorkspace {
  /// Create `<root>/run-<uuid>`. Random ids never collide across concurrent requests.
  pub async fn create(root: &Path) -> std::io::Result<Self> {
    let run_id = Uuid::new_v4().simple().to_string();
    let dir = root.join(format!("run-{run_id}"));
    tokio::fs::create_dir_all(&dir).await?;
    debug!(target: "exam_forge", %run_id, dir = %dir.display(), "Run workspace created");
    Ok(Self { run_id, dir })
  }

  pub fn run_id(&self) -> &str { &self.run_id }

  pub fn dir(&self) -> &Path { &self.dir }

  pub fn upload_path(&self, index: usize) -> PathBuf {
    self.dir.join(format!("upload_{index}"))
  }

  /// The compiler writes `exam.pdf` and `exam.log` next to this file.
  pub fn source_path(&self) -> PathBuf {
    self.dir.join(format!("{DOCUMENT_STEM}.tex"))
  }

}

impl Drop for RunWorkspace {
  fn drop(&mut self) {
    match std::fs::remove_dir_all(&self.dir) {
      Ok(()) => debug!(target: "exam_forge", run_id = %self.run_id, "Run workspace cleaned"),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => error!(target: "exam_forge", run_id = %self.run_id, error = %e, "Failed to clean run workspace"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn drop_removes_everything() {
    let root = std::env::temp_dir().join(format!("exam-forge-ws-{}", Uuid::new_v4()));
    let ws = RunWorkspace::create(&root).await.unwrap();
    tokio::fs::write(ws.upload_path(0), b"img").await.unwrap();
    tokio::fs::write(ws.source_path(), b"tex").await.unwrap();
    tokio::fs::write(ws.dir().join(format!("{DOCUMENT_STEM}.pdf")), b"pdf").await.unwrap();
    let dir = ws.dir().to_path_buf();
    assert!(dir.exists());
    drop(ws);
    assert!(!dir.exists());
    assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    std::fs::remove_dir_all(&root).unwrap();
  }

  #[tokio::test]
  async fn run_ids_are_unique() {
    let root = std::env::temp_dir().join(format!("exam-forge-ws-{}", Uuid::new_v4()));
    let a = RunWorkspace::create(&root).await.unwrap();
    let b = RunWorkspace::create(&root).await.unwrap();
    assert_ne!(a.run_id(), b.run_id());
    assert_ne!(a.dir(), b.dir());
    drop((a, b));
    std::fs::remove_dir_all(&root).unwrap();
  }
}
