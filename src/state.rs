//! Application state: settings, prompts, the optional model client, the
//! compilation driver, the download counter and the rate limiter.
//!
//! Built once at startup from the environment. Tests assemble it directly via
//! `AppState::new` with fake model/engine implementations.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::compiler::{CompilationDriver, PdfLatex, TexEngine};
use crate::config::{load_prompts, Prompts, Settings};
use crate::counter::SequenceCounter;
use crate::openai::{AiClient, OpenAI, VisionModel};
use crate::ratelimit::RateLimiter;

pub struct AppState {
    pub settings: Settings,
    pub prompts: Prompts,
    pub ai: Option<AiClient>,
    pub compiler: CompilationDriver,
    pub counter: SequenceCounter,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        prompts: Prompts,
        model: Option<Arc<dyn VisionModel>>,
        engine: Arc<dyn TexEngine>,
    ) -> Self {
        let ai = model.map(|m| AiClient::new(m, settings.ai_timeout));
        let counter = SequenceCounter::new(settings.counter_path.clone());
        let limiter = Arc::new(RateLimiter::new(settings.rate_limit_window, settings.rate_limit_max, settings.trust_proxy));
        Self { ai, compiler: CompilationDriver::new(engine), counter, limiter, prompts, settings }
    }

    /// Build state from resolved settings: load prompts, init the OpenAI client and pdflatex.
    #[instrument(level = "info", skip_all)]
    pub fn from_settings(settings: Settings) -> Self {
        let prompts = load_prompts(settings.prompts_path.as_ref());

        let model: Option<Arc<dyn VisionModel>> = match OpenAI::from_settings(&settings) {
            Some(oa) => {
                info!(target: "exam_forge", base_url = %oa.base_url, model = %oa.model, timeout = ?settings.ai_timeout, "OpenAI enabled.");
                Some(Arc::new(oa))
            }
            None => {
                warn!(target: "exam_forge", "OpenAI disabled (no OPENAI_API_KEY). Only TEST_MODE requests can succeed.");
                None
            }
        };
        if settings.test_mode {
            warn!(target: "exam_forge", "TEST_MODE active: model calls are bypassed with canned data");
        }

        let engine = Arc::new(PdfLatex { program: settings.latex_bin.clone(), timeout: settings.latex_timeout });
        Self::new(settings, prompts, model, engine)
    }
}
