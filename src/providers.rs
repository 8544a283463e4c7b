//! Shared provider traits for dependency injection.
//!
//! The controller only needs a yes/no answer to "is a person sitting at this
//! terminal". Hiding that behind a trait keeps run-mode selection testable.

use std::io::IsTerminal;

/// Reports whether the process is attached to an interactive terminal.
pub trait TerminalProbe {
    /// True when stdout is a terminal (not redirected to a pipe or file).
    fn stdout_is_terminal(&self) -> bool;

    /// True when stdin is a terminal, so menu answers can be read.
    fn stdin_is_terminal(&self) -> bool;

    fn is_interactive(&self) -> bool {
        self.stdout_is_terminal() && self.stdin_is_terminal()
    }
}

/// Probe backed by the real standard streams.
pub struct StdTerminalProbe;

impl TerminalProbe for StdTerminalProbe {
    fn stdout_is_terminal(&self) -> bool {
        std::io::stdout().is_terminal()
    }

    fn stdin_is_terminal(&self) -> bool {
        std::io::stdin().is_terminal()
    }
}

/// Probe with fixed answers.
///
/// # Example
///
/// ```
/// use incanto::providers::{FixedTerminalProbe, TerminalProbe};
///
/// let probe = FixedTerminalProbe { stdout: true, stdin: false };
/// assert!(!probe.is_interactive());
/// ```
pub struct FixedTerminalProbe {
    pub stdout: bool,
    pub stdin: bool,
}

impl TerminalProbe for FixedTerminalProbe {
    fn stdout_is_terminal(&self) -> bool {
        self.stdout
    }

    fn stdin_is_terminal(&self) -> bool {
        self.stdin
    }
}
