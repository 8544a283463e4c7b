//! Heuristic failure detection for executed commands.
//!
//! A non-zero exit status is always a failure. Commands that exit zero but
//! print diagnostics are caught by a fixed set of textual patterns; false
//! positives and negatives are accepted.

use regex::RegexSet;
use std::fmt;
use std::sync::LazyLock;

/// Pattern source and the label reported when it matches.
const FAILURE_PATTERNS: &[(&str, &str)] = &[
    (r"\berror:", "error:"),
    (r"command not found", "command not found"),
    (r"no such file or directory", "no such file or directory"),
    (r"permission denied", "permission denied"),
    (r"\bfatal:", "fatal:"),
    (r"failed to", "failed to"),
    (r"cannot ", "cannot"),
    (r"unable to", "unable to"),
    (r"not found[ \t]*$", "not found"),
    (r"unknown option", "unknown option"),
    (r"invalid option", "invalid option"),
    (r"unrecognized option", "unrecognized option"),
    (r"syntax error", "syntax error"),
    (r"undefined variable", "undefined variable"),
];

static FAILURE_SET: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(
        FAILURE_PATTERNS
            .iter()
            .map(|(pattern, _)| format!("(?im){}", pattern)),
    )
    .expect("failure patterns are valid regexes")
});

/// Why a command run was considered failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The command exited with a non-zero status.
    ExitStatus(i32),
    /// The command exited zero but its output matched an error pattern.
    ErrorOutput(&'static str),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ExitStatus(status) => write!(f, "exit status {}", status),
            FailureReason::ErrorOutput(pattern) => {
                write!(f, "output contains \"{}\"", pattern)
            }
        }
    }
}

/// Returns the reason a run failed, or `None` when it looks successful.
pub fn classify(exit_status: i32, output: &str) -> Option<FailureReason> {
    if exit_status != 0 {
        return Some(FailureReason::ExitStatus(exit_status));
    }
    matching_pattern(output).map(FailureReason::ErrorOutput)
}

/// True when the run failed by status or by error text in its output.
pub fn is_failure(exit_status: i32, output: &str) -> bool {
    classify(exit_status, output).is_some()
}

fn matching_pattern(output: &str) -> Option<&'static str> {
    FAILURE_SET
        .matches(output)
        .iter()
        .next()
        .map(|index| FAILURE_PATTERNS[index].1)
}
