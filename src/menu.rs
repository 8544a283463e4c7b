//! Interactive prompts shown while a candidate awaits a decision.
//!
//! Every prompt takes its reader and writer as parameters so tests can drive
//! it with in-memory buffers. The controller passes stderr as the writer,
//! which keeps stdout reserved for command output.

use crate::candidate::Candidate;
use crate::error_classifier::FailureReason;
use anyhow::Result;
use std::io::{BufRead, Write};
use std::time::Duration;
use tracing::info;

/// Answer to the main menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Execute,
    Cancel,
    Refine,
    Invalid(String),
}

/// Answer to the prompt shown after a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixDecision {
    Fix,
    Ignore,
}

/// Maps a menu answer to a decision. An empty answer cancels.
pub fn parse_decision(answer: &str) -> Decision {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Decision::Execute,
        "" | "n" | "no" | "q" | "quit" => Decision::Cancel,
        "r" | "refine" => Decision::Refine,
        other => Decision::Invalid(other.to_string()),
    }
}

/// Anything other than `f`/`fix` ignores the failure.
pub fn parse_fix_decision(answer: &str) -> FixDecision {
    match answer.trim().to_ascii_lowercase().as_str() {
        "f" | "fix" => FixDecision::Fix,
        _ => FixDecision::Ignore,
    }
}

/// Reads one line; end of input reads as an empty answer.
fn read_answer<R: BufRead>(input: &mut R) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Decision, refinement and fix prompts.
///
/// # Example
///
/// ```
/// use incanto::menu::{Decision, Menu};
/// use std::io::Cursor;
///
/// let menu = Menu::new(false);
/// let mut input = Cursor::new(b"r\n".to_vec());
/// let mut output = Vec::new();
/// let decision = menu.prompt_decision(&mut input, &mut output).unwrap();
/// assert_eq!(decision, Decision::Refine);
/// ```
pub struct Menu {
    verbose: bool,
}

impl Menu {
    /// # Arguments
    ///
    /// * `verbose` - If true, timing information is printed after each step
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Prints the candidate lines indented, framed by blank lines.
    pub fn show_candidate<W: Write>(&self, candidate: &Candidate, output: &mut W) -> Result<()> {
        writeln!(output)?;
        for line in candidate.lines() {
            writeln!(output, "  {}", line)?;
        }
        writeln!(output)?;
        Ok(())
    }

    /// Asks whether to execute, cancel or refine the candidate.
    ///
    /// # Arguments
    ///
    /// * `input` - Source of the answer; end of input cancels
    /// * `output` - Where the question is written
    ///
    /// # Errors
    ///
    /// Returns an error if writing the question or reading the answer fails.
    pub fn prompt_decision<R: BufRead, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
    ) -> Result<Decision> {
        write!(output, "Execute? [y]es / [n]o / [r]efine: ")?;
        output.flush()?;
        let decision = parse_decision(&read_answer(input)?);
        info!("User decision: {:?}", decision);
        Ok(decision)
    }

    /// Asks for free-text refinement instructions. May return an empty string.
    pub fn prompt_refinement<R: BufRead, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
    ) -> Result<String> {
        write!(output, "Refine: ")?;
        output.flush()?;
        Ok(read_answer(input)?.trim().to_string())
    }

    /// Offers to fix a failed command.
    ///
    /// # Arguments
    ///
    /// * `reason` - Why the run was judged a failure, shown in the question
    /// * `input` - Source of the answer; end of input ignores the failure
    /// * `output` - Where the question is written
    ///
    /// # Errors
    ///
    /// Returns an error if writing the question or reading the answer fails.
    pub fn prompt_fix<R: BufRead, W: Write>(
        &self,
        reason: &FailureReason,
        input: &mut R,
        output: &mut W,
    ) -> Result<FixDecision> {
        write!(output, "\nCommand failed ({}). [f]ix or Enter to ignore: ", reason)?;
        output.flush()?;
        let decision = parse_fix_decision(&read_answer(input)?);
        info!("User fix decision: {:?}", decision);
        Ok(decision)
    }

    pub fn show_cancelled<W: Write>(&self, output: &mut W) -> Result<()> {
        writeln!(output, "Cancelled")?;
        Ok(())
    }

    /// Reports an unrecognised menu answer.
    pub fn show_invalid_choice<W: Write>(&self, choice: &str, output: &mut W) -> Result<()> {
        writeln!(output, "Invalid choice '{}'. Enter y, n or r.", choice)?;
        Ok(())
    }

    /// Execute was chosen on a comment.
    pub fn show_not_executable<W: Write>(&self, output: &mut W) -> Result<()> {
        writeln!(output, "Nothing to execute: the suggestion is a comment. Refine or cancel.")?;
        Ok(())
    }

    /// Prints the model's own text after a failed call. `what` names the
    /// step, e.g. `Refinement`.
    pub fn show_model_failure<W: Write>(&self, what: &str, text: &str, output: &mut W) -> Result<()> {
        writeln!(output, "{} failed:", what)?;
        writeln!(output, "{}", text.trim_end())?;
        Ok(())
    }

    /// Prints timing information in verbose mode only.
    pub fn show_elapsed<W: Write>(
        &self,
        what: &str,
        step: Duration,
        total: Duration,
        output: &mut W,
    ) -> Result<()> {
        if self.verbose {
            writeln!(
                output,
                "{} took {:.1}s (total {:.1}s)",
                what,
                step.as_secs_f64(),
                total.as_secs_f64()
            )?;
        }
        Ok(())
    }
}
