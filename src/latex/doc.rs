//! Document intermediate representation and its serialization to LaTeX source.
//!
//! The renderer builds a `Document` out of blocks and inlines; only this module
//! writes LaTeX syntax. Untrusted text enters exclusively through
//! `Inline::Text` / `Inline::Content`, which are escaped on output.

use std::fmt::Write as _;

use super::escape::{escape_latex, gap, process_content};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inline {
  /// Untrusted text, escaped.
  Text(String),
  /// Untrusted text, escaped, with underscore runs turned into gaps.
  Content(String),
  /// Trusted markup produced by the renderer itself.
  Raw(String),
  Bold(Vec<Inline>),
  /// Blank fill-in gap.
  Gap,
}

impl Inline {
  pub fn text(s: impl Into<String>) -> Self { Inline::Text(s.into()) }
  pub fn raw(s: impl Into<String>) -> Self { Inline::Raw(s.into()) }
  pub fn bold(s: impl Into<String>) -> Self { Inline::Bold(vec![Inline::Text(s.into())]) }
}

/// `tabularx` over the full text width; `\hline` around every row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table {
  pub columns: String,
  pub rows: Vec<Vec<Vec<Inline>>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block {
  /// The page header macro with the given headline.
  PageHeader(Vec<Inline>),
  /// Bold left label, optional small right-aligned annotation, line break.
  Heading { left: Vec<Inline>, right: Option<Vec<Inline>> },
  Paragraph(Vec<Inline>),
  /// a), b), c) list.
  Enumerate(Vec<Vec<Inline>>),
  Table(Table),
  /// Keeps its content together on one page.
  Minipage(Vec<Block>),
  VSpace(&'static str),
  VFill,
  NewPage,
  /// Right-aligned large bold line, e.g. the final grade field.
  SignOff(Vec<Inline>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Logo {
  /// File name of an image next to the source file.
  Image(String),
  Brand(String),
}

/// Values repeated at the top of every exam page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderFields {
  pub logo: Logo,
  pub subject: String,
  pub grade_label: String,
  pub topic: String,
  pub date: String,
  pub duration: String,
  pub aids: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
  pub header: HeaderFields,
  pub footer_left: Vec<Inline>,
  pub footer_right: Vec<Inline>,
  pub gap_width: String,
  pub body: Vec<Block>,
}

const PREAMBLE: &str = r"\documentclass[a4paper,11pt]{article}
\usepackage[utf8]{inputenc}
\usepackage[ngerman]{babel}
\usepackage[T1]{fontenc}
\usepackage{lmodern, amsmath, amssymb, geometry, fancyhdr, graphicx, tabularx, lastpage, array, enumitem}
\geometry{a4paper, top=1.5cm, bottom=2.5cm, left=2.5cm, right=2.5cm, headheight=4cm}
\newcommand{\luecke}[1]{\underline{\hspace{#1}}}
\newcolumntype{Y}{>{\centering\arraybackslash}X}
\setlength{\parindent}{0pt}
";

impl Document {
  pub fn to_source(&self) -> String {
    let mut out = String::with_capacity(8 * 1024);
    out.push_str(PREAMBLE);
    self.write_header_macro(&mut out);
    out.push_str("\\pagestyle{fancy} \\fancyhf{} \\renewcommand{\\headrulewidth}{0pt}\n");
    let _ = writeln!(out, "\\fancyfoot[L]{{\\small {}}}", self.inlines(&self.footer_left));
    let _ = writeln!(out, "\\fancyfoot[R]{{\\small {}}}", self.inlines(&self.footer_right));
    out.push_str("\\begin{document}\n");
    for block in &self.body {
      self.write_block(&mut out, block);
    }
    out.push_str("\\end{document}\n");
    out
  }

  fn write_header_macro(&self, out: &mut String) {
    let h = &self.header;
    let logo = match &h.logo {
      Logo::Image(file) => format!("\\includegraphics[width=3.5cm]{{{}}}", escape_latex(file)),
      Logo::Brand(name) => format!("\\textbf{{{}}}", escape_latex(name)),
    };
    let _ = write!(
      out,
      "\\newcommand{{\\myHeader}}[1]{{
\\noindent
\\makebox[0pt][l]{{\\raisebox{{-0.97\\height}}{{{logo}}}}}%
\\begin{{center}}
\\parbox[t]{{0.8\\textwidth}}{{\\centering \\Huge \\textbf{{#1}}}} \\\\[0.3cm]
\\large im Fach \\textbf{{{subject}}} der {grade}. Klasse \\\\[0.2cm]
\\parbox[t]{{0.8\\textwidth}}{{\\centering \\normalsize Thema: \\textbf{{{topic}}}}}
\\end{{center}}
\\vspace{{0.2cm}}
\\noindent
\\textbf{{Datum:}} {date} \\\\
\\textbf{{Zeit:}} {duration} \\\\
\\textbf{{Hilfsmittel:}} {aids}
\\vspace{{0.5cm}}
\\hrule
\\vspace{{1.0cm}}
}}
",
      subject = escape_latex(&h.subject),
      grade = escape_latex(&h.grade_label),
      topic = escape_latex(&h.topic),
      date = escape_latex(&h.date),
      duration = escape_latex(&h.duration),
      aids = escape_latex(&h.aids),
    );
  }

  fn inlines(&self, items: &[Inline]) -> String {
    items.iter().map(|i| self.inline(i)).collect()
  }

  fn inline(&self, item: &Inline) -> String {
    match item {
      Inline::Text(s) => escape_latex(s),
      Inline::Content(s) => process_content(s, &self.gap_width),
      Inline::Raw(s) => s.clone(),
      Inline::Bold(inner) => format!("\\textbf{{{}}}", self.inlines(inner)),
      Inline::Gap => gap(&self.gap_width),
    }
  }

  fn write_block(&self, out: &mut String, block: &Block) {
    match block {
      Block::PageHeader(title) => {
        let _ = writeln!(out, "\\null \\vspace*{{-1.0cm}} \\myHeader{{{}}}", self.inlines(title));
      }
      Block::Heading { left, right } => {
        let _ = write!(out, "\\noindent \\textbf{{{}}}", self.inlines(left));
        if let Some(right) = right {
          let _ = write!(out, " \\hfill \\small{{{}}}", self.inlines(right));
        }
        out.push_str(" \\\\\n");
      }
      Block::Paragraph(items) => {
        let _ = writeln!(out, "\\noindent {} \\par \\vspace{{0.3cm}}", self.inlines(items));
      }
      Block::Enumerate(items) => {
        out.push_str("\\begin{enumerate}[label=\\alph*), leftmargin=*, nosep]\n");
        for item in items {
          let _ = writeln!(out, "\\item {}", self.inlines(item));
        }
        out.push_str("\\end{enumerate}\n");
      }
      Block::Table(table) => {
        let _ = writeln!(out, "\\begin{{tabularx}}{{\\textwidth}}{{{}}}", table.columns);
        out.push_str("\\hline\n");
        for row in &table.rows {
          let cells: Vec<String> = row.iter().map(|cell| self.inlines(cell)).collect();
          let _ = writeln!(out, "{} \\\\ \\hline", cells.join(" & "));
        }
        out.push_str("\\end{tabularx}\n");
      }
      Block::Minipage(inner) => {
        out.push_str("\\noindent\n\\begin{minipage}{\\textwidth}\n\\renewcommand{\\arraystretch}{1.5}\n");
        for b in inner {
          self.write_block(out, b);
        }
        out.push_str("\\end{minipage}\n");
      }
      Block::VSpace(len) => {
        let _ = writeln!(out, "\\vspace{{{len}}}");
      }
      Block::VFill => out.push_str("\\vfill\n"),
      Block::NewPage => out.push_str("\\newpage\n"),
      Block::SignOff(items) => {
        let _ = writeln!(out, "\\hfill \\Large \\textbf{{{}}}", self.inlines(items));
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn doc(body: Vec<Block>) -> Document {
    Document {
      header: HeaderFields {
        logo: Logo::Brand("Brand & Co".into()),
        subject: "Mathe".into(),
        grade_label: "9b".into(),
        topic: "Terme_1".into(),
        date: "01.02.2026".into(),
        duration: "60 Min.".into(),
        aids: "Keine".into(),
      },
      footer_left: vec![Inline::raw("Seite \\thepage")],
      footer_right: vec![Inline::text("Viel Erfolg!")],
      gap_width: "3cm".into(),
      body,
    }
  }

  #[test]
  fn header_fields_are_escaped() {
    let src = doc(vec![]).to_source();
    assert!(src.contains(r"\textbf{Brand \& Co}"));
    assert!(src.contains(r"Thema: \textbf{Terme\_1}"));
    assert!(src.contains(r"der 9b. Klasse"));
    assert!(src.starts_with(r"\documentclass"));
    assert!(src.trim_end().ends_with(r"\end{document}"));
  }

  #[test]
  fn table_rows_are_joined_and_ruled() {
    let t = Table {
      columns: "|c|X|".into(),
      rows: vec![vec![vec![Inline::bold("Note")], vec![Inline::text("1")]]],
    };
    let src = doc(vec![Block::Table(t)]).to_source();
    assert!(src.contains("\\begin{tabularx}{\\textwidth}{|c|X|}\n\\hline\n\\textbf{Note} & 1 \\\\ \\hline\n\\end{tabularx}"));
  }

  #[test]
  fn content_inlines_get_gaps_text_does_not() {
    let src = doc(vec![
      Block::Paragraph(vec![Inline::Content("a ___ b".into())]),
      Block::Paragraph(vec![Inline::Text("c ___ d".into())]),
    ])
    .to_source();
    assert!(src.contains(r"a \luecke{3cm} b"));
    assert!(src.contains(r"c \_\_\_ d"));
  }

  #[test]
  fn enumerate_uses_letter_labels() {
    let src = doc(vec![Block::Enumerate(vec![vec![Inline::text("x")], vec![Inline::text("y")]])]).to_source();
    assert!(src.contains("\\begin{enumerate}[label=\\alph*), leftmargin=*, nosep]\n\\item x\n\\item y\n\\end{enumerate}"));
  }
}
