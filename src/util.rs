//! Small utility helpers used across modules.

use std::sync::OnceLock;

use regex::Regex;

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings (model output, compiler logs).
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) { cut -= 1; }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

/// Last `max` bytes of a string, on a char boundary.
pub fn tail_for_log(s: &str, max: usize) -> &str {
  if s.len() <= max {
    return s;
  }
  let mut start = s.len() - max;
  while !s.is_char_boundary(start) { start += 1; }
  &s[start..]
}

/// Version advertised by the frontend via `<meta name="app-version" content="...">`.
pub fn frontend_version(html: &str) -> Option<String> {
  static META: OnceLock<Regex> = OnceLock::new();
  let re = META.get_or_init(|| {
    Regex::new(r#"<meta\s+name=["']app-version["']\s+content=["']([^"']+)["']"#).expect("valid regex")
  });
  re.captures(html).map(|c| c[1].trim().to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fills_known_keys_only() {
    assert_eq!(fill_template("Fach {fach}, {x}", &[("fach", "Mathe")]), "Fach Mathe, {x}");
  }

  #[test]
  fn truncation_respects_char_boundaries() {
    let s = "äöüäöü";
    let t = trunc_for_log(s, 3);
    assert!(t.starts_with('ä'));
    assert!(t.contains("12 bytes total"));
    assert_eq!(trunc_for_log("kurz", 10), "kurz");
    assert_eq!(tail_for_log("äöü", 3), "ü");
    assert_eq!(tail_for_log("abc", 10), "abc");
  }

  #[test]
  fn reads_frontend_meta_version() {
    let html = r#"<head><meta charset="utf-8"><meta name="app-version" content="2.4.1"></head>"#;
    assert_eq!(frontend_version(html).as_deref(), Some("2.4.1"));
    assert_eq!(frontend_version("<html></html>"), None);
  }
}
