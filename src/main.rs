//! exam-forge · notebook photos in, typeset exam PDF out
//!
//! - Axum HTTP API: `/analyze` (subject guess), `/generate` (exam PDF), `/health`
//! - OpenAI-compatible vision model (optional; TEST_MODE runs without it)
//! - pdflatex as an external, time-bounded subprocess
//! - Static frontend from STATIC_DIR, branding from ASSETS_DIR
//!
//! Important env variables (all optional, see `config::Settings`):
//!   PORT                : u16 (default 8080)
//!   OPENAI_API_KEY      : enables the model integration
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_MODEL        : default "gpt-4o-mini"
//!   TEST_MODE           : "1"/"true" substitutes canned model output
//!   PROMPTS_CONFIG_PATH : TOML file overriding prompts and the curriculum table
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod error;
mod protocol;
mod workspace;
mod upload;
mod openai;
mod normalize;
mod grading;
mod latex;
mod compiler;
mod counter;
mod ratelimit;
mod seeds;
mod state;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::Settings;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  dotenvy::dotenv().ok();
  telemetry::init_tracing();

  let settings = Settings::from_env()?;
  let frontend = tokio::fs::read_to_string(settings.static_dir.join("index.html"))
    .await
    .ok()
    .and_then(|html| util::frontend_version(&html))
    .unwrap_or_else(|| "unknown".into());
  info!(
    target: "exam_forge",
    backend = env!("CARGO_PKG_VERSION"),
    %frontend,
    test_mode = settings.test_mode,
    work_dir = %settings.work_dir.display(),
    "Starting exam-forge"
  );

  let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
  let state = Arc::new(AppState::from_settings(settings));
  info!(target: "exam_forge", counter = %state.counter.path().display(), "Download counter file");

  let app = build_router(state);

  let listener = TcpListener::bind(addr).await?;
  info!(target: "exam_forge", %addr, "HTTP server listening");
  axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "exam_forge", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "exam_forge", error = %e, "Could not install Ctrl-C handler");
    std::future::pending::<()>().await;
  }
}
