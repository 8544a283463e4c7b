//! Best-effort cleanup of raw model output.
//!
//! Models are told to answer with a bare command, but they regularly wrap the
//! answer in a markdown code fence or in single backticks anyway. This module
//! strips those artifacts without touching legitimate multi-line shell syntax.

const FENCE: &str = "```";

/// Splits raw model output into lines and sanitizes them.
pub fn sanitize_text(raw: &str) -> Vec<String> {
    let lines: Vec<String> = raw.lines().map(|l| l.to_string()).collect();
    sanitize(&lines)
}

/// Removes markdown wrapping from model output.
///
/// Leading and trailing blank lines are trimmed, a fence opener (optionally
/// tagged with a language) on the first line and a bare fence closer on the
/// last line are dropped, and a single remaining line wrapped in single
/// backticks is unwrapped. The passes repeat until nothing changes, so
/// `sanitize(&sanitize(x)) == sanitize(x)`.
pub fn sanitize(lines: &[String]) -> Vec<String> {
    let mut current: Vec<String> = lines.to_vec();
    loop {
        let next = sanitize_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn sanitize_once(lines: &[String]) -> Vec<String> {
    let mut lines = trim_blank_lines(lines);

    if lines.first().is_some_and(|first| is_fence_opener(first)) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|last| last.trim() == FENCE) {
        lines.pop();
    }

    let mut lines = trim_blank_lines(&lines);

    if lines.len() == 1 {
        if let Some(inner) = unwrap_backticks(&lines[0]) {
            lines[0] = inner.to_string();
        }
    }

    lines
}

fn trim_blank_lines(lines: &[String]) -> Vec<String> {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].to_vec(),
        _ => Vec::new(),
    }
}

fn is_fence_opener(line: &str) -> bool {
    match line.trim().strip_prefix(FENCE) {
        Some(tag) => tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '.')),
        None => false,
    }
}

fn unwrap_backticks(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix('`')?.strip_suffix('`')?;
    if inner.contains('`') {
        None
    } else {
        Some(inner)
    }
}
