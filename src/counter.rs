//! Persistent sequence counter for human-friendly download names.
//!
//! The file holds `{"count": n}`. All increments go through one async mutex
//! and are written via temp-file + rename, so concurrent requests never see
//! the same number and a crash never leaves a half-written file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CounterFile {
  count: u64,
}

#[derive(Debug)]
pub struct SequenceCounter {
  path: PathBuf,
  /// Last issued value once loaded; `None` until the first increment reads the file.
  state: Mutex<Option<u64>>,
}

impl SequenceCounter {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into(), state: Mutex::new(None) }
  }

  pub fn path(&self) -> &Path { &self.path }

  /// Issue the next number and persist it.
  pub async fn next(&self) -> std::io::Result<u64> {
    let mut state = self.state.lock().await;
    let current = match *state {
      Some(v) => v,
      None => self.load().await,
    };
    let next = current + 1;
    self.persist(next).await?;
    *state = Some(next);
    debug!(target: "exam_forge", value = next, "Sequence counter advanced");
    Ok(next)
  }

  async fn load(&self) -> u64 {
    match tokio::fs::read(&self.path).await {
      Ok(bytes) => match serde_json::from_slice::<CounterFile>(&bytes) {
        Ok(f) => f.count,
        Err(e) => {
          warn!(target: "exam_forge", path = %self.path.display(), error = %e, "Counter file unreadable; restarting at 0");
          0
        }
      },
      Err(_) => 0,
    }
  }

  async fn persist(&self, value: u64) -> std::io::Result<()> {
    if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
      tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = self.path.with_extension("json.tmp");
    let body = serde_json::to_vec(&CounterFile { count: value })?;
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, &self.path).await
  }
}
