//! LaTeX document generation: escaping rules, the document IR, and the exam layout.

pub mod doc;
pub mod escape;
pub mod render;

pub use render::{render, RenderContext};
