//! The proposed command currently awaiting a decision.

use crate::sanitizer::sanitize_text;
use std::fmt;

/// Marker that turns model output into informational text instead of a command.
pub const COMMENT_MARKER: char = '#';

/// A sanitized model answer.
///
/// A candidate is built once from model output and never edited afterwards;
/// refining or fixing produces a brand new candidate that replaces the old one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    lines: Vec<String>,
    is_comment: bool,
}

impl Candidate {
    /// Sanitizes raw model output and classifies it.
    pub fn from_model_output(raw: &str) -> Self {
        Self::from_lines(sanitize_text(raw))
    }

    /// Builds a candidate from already sanitized lines.
    ///
    /// Empty output counts as a comment: there is nothing to run.
    pub fn from_lines(lines: Vec<String>) -> Self {
        let is_comment = match lines.first() {
            Some(first) => first.trim_start().starts_with(COMMENT_MARKER),
            None => true,
        };
        Self { lines, is_comment }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_comment(&self) -> bool {
        self.is_comment
    }

    /// The candidate as a single multi-line command string.
    pub fn command_text(&self) -> String {
        self.lines.join("\n")
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_text())
    }
}
