//! Tracing setup.
//!
//! LOG_LEVEL takes EnvFilter directives (default keeps this crate at debug and
//! the HTTP stack at info). LOG_FORMAT=json switches to structured lines for
//! log shippers; anything else prints the human-readable format.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "info,exam_forge=debug,tower_http=info,axum=info";

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    if json_requested(std::env::var("LOG_FORMAT").ok().as_deref()) {
        builder.json().with_current_span(true).init();
    } else {
        builder.init();
    }
}

fn json_requested(format: Option<&str>) -> bool {
    format.is_some_and(|f| f.trim().eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_json_selects_structured_output() {
        assert!(json_requested(Some("json")));
        assert!(json_requested(Some(" JSON ")));
        assert!(!json_requested(Some("pretty")));
        assert!(!json_requested(None));
    }
}
