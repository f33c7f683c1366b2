//! Neutralising user and model text for the LaTeX body.
//!
//! `escape_latex` maps every syntactically significant character in a single
//! pass, so replacement text is never re-escaped. `process_content` also turns
//! runs of three or more underscores (raw `___` or model-escaped `\_\_\_`)
//! into a fixed-width fill-in gap.

use std::sync::OnceLock;

use regex::Regex;

/// Replacement for one character, or `None` when it is safe as-is.
fn replacement(c: char) -> Option<&'static str> {
  Some(match c {
    '\\' => r"\textbackslash{}",
    '&' => r"\&",
    '%' => r"\%",
    '$' => r"\$",
    '#' => r"\#",
    '_' => r"\_",
    '{' => r"\{",
    '}' => r"\}",
    '~' => r"\textasciitilde{}",
    '^' => r"\textasciicircum{}",
    _ => return None,
  })
}

pub fn escape_latex(text: &str) -> String {
  let mut out = String::with_capacity(text.len() + text.len() / 8);
  for c in text.chars() {
    match replacement(c) {
      Some(r) => out.push_str(r),
      None => out.push(c),
    }
  }
  out
}

fn gap_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"(?:\\_|_){3,}").expect("static gap regex"))
}

/// The fill-in gap macro, defined in the document preamble.
pub fn gap(width: &str) -> String {
  format!(r"\luecke{{{width}}}")
}

/// Escape `text` and replace underscore runs with a gap of `gap_width`.
pub fn process_content(text: &str, gap_width: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut last = 0;
  for m in gap_re().find_iter(text) {
    out.push_str(&escape_latex(&text[last..m.start()]));
    out.push_str(&gap(gap_width));
    last = m.end();
  }
  out.push_str(&escape_latex(&text[last..]));
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  const SPECIALS: &[char] = &['\\', '&', '%', '$', '#', '_', '{', '}', '~', '^'];

  /// Remove every sanctioned escape sequence; whatever special char remains leaked through.
  fn strip_escapes(s: &str) -> String {
    let mut out = s.to_string();
    for token in [
      r"\textbackslash{}", r"\textasciitilde{}", r"\textasciicircum{}",
      r"\&", r"\%", r"\$", r"\#", r"\_", r"\{", r"\}",
    ] {
      out = out.replace(token, "");
    }
    out
  }

  #[test]
  fn escapes_each_special_character() {
    assert_eq!(escape_latex(r"\"), r"\textbackslash{}");
    assert_eq!(escape_latex("a & b"), r"a \& b");
    assert_eq!(escape_latex("50%"), r"50\%");
    assert_eq!(escape_latex("$x$"), r"\$x\$");
    assert_eq!(escape_latex("#1"), r"\#1");
    assert_eq!(escape_latex("a_b"), r"a\_b");
    assert_eq!(escape_latex("{}"), r"\{\}");
    assert_eq!(escape_latex("~"), r"\textasciitilde{}");
    assert_eq!(escape_latex("x^2"), r"x\textasciicircum{}2");
  }

  #[test]
  fn backslash_replacement_is_not_re_escaped() {
    assert_eq!(escape_latex(r"\input{x}"), r"\textbackslash{}input\{x\}");
  }

  #[test]
  fn plain_text_is_a_fixed_point() {
    for s in ["", "Quadratische Funktionen", "Äpfel, Birnen (3 Stück) = 5€!"] {
      assert_eq!(escape_latex(s), s);
    }
    for c in SPECIALS {
      let s = c.to_string();
      assert_ne!(escape_latex(&s), s);
    }
  }

  #[test]
  fn no_raw_special_survives_one_pass() {
    let hostile = [
      r"\input{/etc/passwd}",
      r"\immediate\write18{rm -rf /}",
      "}{\\end{document}",
      "100% & $5 # _x_ ~y^z",
      r"\\\{\}",
      "~~^^%%",
    ];
    for input in hostile {
      let leftover = strip_escapes(&escape_latex(input));
      assert!(!leftover.contains(SPECIALS), "leak in {input:?}: {leftover:?}");
    }
  }

  #[test]
  fn underscore_runs_become_gaps() {
    assert_eq!(process_content("Die _____ ist rund.", "3cm"), r"Die \luecke{3cm} ist rund.");
    assert_eq!(process_content(r"Die \_\_\_\_ ist", "2cm"), r"Die \luecke{2cm} ist");
    assert_eq!(process_content("a___b___c", "3cm"), r"a\luecke{3cm}b\luecke{3cm}c");
  }

  #[test]
  fn short_underscore_runs_are_escaped() {
    assert_eq!(process_content("x__y", "3cm"), r"x\_\_y");
    assert_eq!(process_content("snake_case", "3cm"), r"snake\_case");
  }

  #[test]
  fn content_outside_gaps_is_escaped() {
    assert_eq!(process_content("50% ___ & mehr", "3cm"), r"50\% \luecke{3cm} \& mehr");
    assert_eq!(process_content("", "3cm"), "");
  }
}
