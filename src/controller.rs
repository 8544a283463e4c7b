//! The command lifecycle state machine.
//!
//! One invocation walks the states below until it reaches [`State::Done`],
//! whose status becomes the process exit code:
//!
//! ```text
//! Generating ──► PresentingComment ──► Done
//!     │
//!     ├─ pipe mode ──────────────────► Done(0)
//!     ├─ auto-execute ──► Executing
//!     └─ interactive ───► AwaitingDecision ◄──────────────┐
//!                           │  y ► Executing              │
//!                           │  n ► Done(1)                │
//!                           │  r ► Refining ──────────────┤
//!                                                         │
//! Executing ─ ok / no fix ► Done(status)                  │
//!     └─ failed + fix ► AwaitingFixDecision ─ f ► Fixing ─┘
//!                                └─ other ► Done(status)
//! ```
//!
//! The loop in [`LifecycleController::run_with_io`] drives [`LifecycleController::step`]
//! iteratively, so refine and fix cycles never grow the call stack.

use crate::candidate::Candidate;
use crate::command_runner::{CommandRunner, ShellRunner};
use crate::environment::EnvironmentFacts;
use crate::error_classifier::{FailureReason, classify};
use crate::menu::{Decision, FixDecision, Menu};
use crate::model_client::{ModelClient, ModelOutput};
use crate::prompts;
use crate::providers::TerminalProbe;
use anyhow::{Result, anyhow};
use std::io::{self, BufRead, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How the candidate is handled once generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run the candidate without asking.
    AutoExecute,
    /// Print the candidate and stop; stdout is not a terminal.
    Pipe,
    /// Show the decision menu.
    Interactive,
}

impl RunMode {
    /// Picks the mode for this invocation.
    ///
    /// `yolo` wins over everything. Otherwise the menu is used only when
    /// both stdin and stdout are terminals.
    ///
    /// # Example
    ///
    /// ```
    /// use incanto::controller::RunMode;
    /// use incanto::providers::FixedTerminalProbe;
    ///
    /// let piped = FixedTerminalProbe { stdout: false, stdin: true };
    /// assert_eq!(RunMode::select(false, &piped), RunMode::Pipe);
    /// assert_eq!(RunMode::select(true, &piped), RunMode::AutoExecute);
    /// ```
    pub fn select(yolo: bool, probe: &dyn TerminalProbe) -> Self {
        if yolo {
            RunMode::AutoExecute
        } else if probe.is_interactive() {
            RunMode::Interactive
        } else {
            RunMode::Pipe
        }
    }
}

/// Immutable per-invocation data.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub prompt: String,
    pub model: String,
    pub system_prompt: String,
    pub yolo: bool,
    pub fix: bool,
    pub verbose: bool,
}

impl RequestContext {
    pub fn new(
        prompt: impl Into<String>,
        model: impl Into<String>,
        environment: &EnvironmentFacts,
        yolo: bool,
        fix: bool,
        verbose: bool,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            system_prompt: prompts::system_prompt(environment),
            yolo,
            fix,
            verbose,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Generating,
    PresentingComment,
    AwaitingDecision,
    Refining {
        prompt: String,
    },
    Executing,
    AwaitingFixDecision {
        exit_status: i32,
        reason: FailureReason,
        output: String,
    },
    Fixing {
        prompt: String,
        exit_status: i32,
    },
    Done(i32),
}

/// Loop state owned by one invocation.
#[derive(Debug, Default)]
pub struct Session {
    candidate: Option<Candidate>,
    elapsed: Duration,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn candidate(&self) -> Option<&Candidate> {
        self.candidate.as_ref()
    }

    /// Swaps in a whole new candidate.
    pub fn replace_candidate(&mut self, candidate: Candidate) {
        self.candidate = Some(candidate);
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    fn add_elapsed(&mut self, step: Duration) {
        self.elapsed += step;
    }

    fn require_candidate(&self) -> Result<&Candidate> {
        self.candidate
            .as_ref()
            .ok_or_else(|| anyhow!("No command has been generated yet"))
    }
}

/// Drives one request from generation to a final exit status.
///
/// The model and the command runner are injected, so the whole lifecycle can
/// run against fakes.
///
/// # Example
///
/// ```ignore
/// use incanto::controller::{LifecycleController, RequestContext};
/// use incanto::environment::EnvironmentFacts;
/// use incanto::model_client::MockModelClient;
/// use incanto::providers::StdTerminalProbe;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let env = EnvironmentFacts::detect();
///     let context = RequestContext::new("list files", "sonnet", &env, false, true, false);
///     let controller =
///         LifecycleController::with_shell(context, &StdTerminalProbe, Box::new(MockModelClient));
///     std::process::exit(controller.run().await?);
/// }
/// ```
pub struct LifecycleController {
    context: RequestContext,
    mode: RunMode,
    can_prompt: bool,
    model: Box<dyn ModelClient>,
    runner: Box<dyn CommandRunner>,
    menu: Menu,
}

impl LifecycleController {
    /// # Arguments
    ///
    /// * `context` - The request, model name and flags
    /// * `mode` - How the first candidate is handled
    /// * `can_prompt` - Whether answers can be read from the user; the fix
    ///   prompt is only offered when it is set
    /// * `model` - Backend used for generation, refinement and fixes
    /// * `runner` - Executes accepted candidates
    pub fn new(
        context: RequestContext,
        mode: RunMode,
        can_prompt: bool,
        model: Box<dyn ModelClient>,
        runner: Box<dyn CommandRunner>,
    ) -> Self {
        let menu = Menu::new(context.verbose);
        Self {
            context,
            mode,
            can_prompt,
            model,
            runner,
            menu,
        }
    }

    /// Builds a controller that runs commands through the host shell.
    pub fn with_shell(
        context: RequestContext,
        probe: &dyn TerminalProbe,
        model: Box<dyn ModelClient>,
    ) -> Self {
        let mode = RunMode::select(context.yolo, probe);
        let can_prompt = probe.is_interactive();
        Self::new(context, mode, can_prompt, model, Box::new(ShellRunner::new()))
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Runs the lifecycle on the process's standard streams.
    pub async fn run(&self) -> Result<i32> {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut out = io::stdout();
        let mut ui = io::stderr();
        self.run_with_io(&mut input, &mut out, &mut ui).await
    }

    /// Runs the lifecycle to completion and returns the exit status.
    ///
    /// `out` receives the printed candidate or comment, `ui` receives menus
    /// and diagnostics.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal streams fail or the command cannot be
    /// launched. Model failures are not errors; they end with the model's
    /// status.
    pub async fn run_with_io<R: BufRead, W: Write, E: Write>(
        &self,
        input: &mut R,
        out: &mut W,
        ui: &mut E,
    ) -> Result<i32> {
        info!(
            "Starting lifecycle in {:?} mode with model {} for: {}",
            self.mode, self.context.model, self.context.prompt
        );
        let mut session = Session::new();
        let mut state = State::Generating;
        loop {
            if let State::Done(status) = state {
                info!("Lifecycle finished with status {}", status);
                return Ok(status);
            }
            state = self.step(state, &mut session, input, out, ui).await?;
        }
    }

    /// Performs one transition.
    pub async fn step<R: BufRead, W: Write, E: Write>(
        &self,
        state: State,
        session: &mut Session,
        input: &mut R,
        out: &mut W,
        ui: &mut E,
    ) -> Result<State> {
        debug!("Entering state {:?}", state);
        let next = match state {
            State::Generating => self.generate(session, out, ui).await?,
            State::PresentingComment => {
                writeln!(out, "{}", session.require_candidate()?)?;
                State::Done(0)
            }
            State::AwaitingDecision => self.await_decision(session, input, ui)?,
            State::Refining { prompt } => {
                let output = self.invoke_model(session, &prompt, "Refinement", ui).await?;
                if output.is_success() {
                    session.replace_candidate(Candidate::from_model_output(&output.text));
                } else {
                    warn!("Refinement failed with status {}", output.status);
                    self.menu.show_model_failure("Refinement", &output.text, ui)?;
                }
                State::AwaitingDecision
            }
            State::Executing => self.execute(session, ui)?,
            State::AwaitingFixDecision {
                exit_status,
                reason,
                output,
            } => match self.menu.prompt_fix(&reason, input, ui)? {
                FixDecision::Fix => {
                    let prompt = prompts::fix_prompt(
                        &self.context.prompt,
                        session.require_candidate()?,
                        &reason,
                        &output,
                    );
                    State::Fixing { prompt, exit_status }
                }
                FixDecision::Ignore => State::Done(exit_status),
            },
            State::Fixing {
                prompt,
                exit_status,
            } => {
                let output = self.invoke_model(session, &prompt, "Fix", ui).await?;
                if output.is_success() {
                    session.replace_candidate(Candidate::from_model_output(&output.text));
                    State::AwaitingDecision
                } else {
                    warn!("Fix failed with status {}", output.status);
                    self.menu.show_model_failure("Fix", &output.text, ui)?;
                    State::Done(exit_status)
                }
            }
            State::Done(status) => State::Done(status),
        };
        Ok(next)
    }

    async fn generate<W: Write, E: Write>(
        &self,
        session: &mut Session,
        out: &mut W,
        ui: &mut E,
    ) -> Result<State> {
        let output = self
            .invoke_model(session, &self.context.prompt, "Model", ui)
            .await?;
        if !output.is_success() {
            warn!("Model backend failed with status {}", output.status);
            write!(ui, "{}", output.text)?;
            if !output.text.ends_with('\n') {
                writeln!(ui)?;
            }
            return Ok(State::Done(output.status));
        }

        let candidate = Candidate::from_model_output(&output.text);
        let is_comment = candidate.is_comment();
        session.replace_candidate(candidate);

        if is_comment {
            return Ok(State::PresentingComment);
        }
        Ok(match self.mode {
            RunMode::AutoExecute => State::Executing,
            RunMode::Pipe => {
                writeln!(out, "{}", session.require_candidate()?)?;
                State::Done(0)
            }
            RunMode::Interactive => State::AwaitingDecision,
        })
    }

    fn await_decision<R: BufRead, E: Write>(
        &self,
        session: &Session,
        input: &mut R,
        ui: &mut E,
    ) -> Result<State> {
        let candidate = session.require_candidate()?;
        self.menu.show_candidate(candidate, ui)?;

        Ok(match self.menu.prompt_decision(input, ui)? {
            Decision::Execute if candidate.is_comment() => {
                self.menu.show_not_executable(ui)?;
                State::AwaitingDecision
            }
            Decision::Execute => State::Executing,
            Decision::Cancel => {
                self.menu.show_cancelled(ui)?;
                State::Done(1)
            }
            Decision::Refine => {
                let refinement = self.menu.prompt_refinement(input, ui)?;
                if refinement.is_empty() {
                    State::AwaitingDecision
                } else {
                    State::Refining {
                        prompt: prompts::refinement_prompt(
                            &self.context.prompt,
                            candidate,
                            &refinement,
                        ),
                    }
                }
            }
            Decision::Invalid(choice) => {
                self.menu.show_invalid_choice(&choice, ui)?;
                State::AwaitingDecision
            }
        })
    }

    fn execute<E: Write>(&self, session: &mut Session, ui: &mut E) -> Result<State> {
        let candidate = session.require_candidate()?;
        if candidate.is_comment() {
            return Ok(State::PresentingComment);
        }

        let result = self.runner.run(candidate.lines())?;
        session.add_elapsed(result.elapsed);
        self.menu
            .show_elapsed("Command", result.elapsed, session.elapsed(), ui)?;

        match classify(result.exit_status, &result.output) {
            None => Ok(State::Done(result.exit_status)),
            Some(reason) if self.context.fix && self.can_prompt => {
                info!("Command failed ({}), offering fix", reason);
                Ok(State::AwaitingFixDecision {
                    exit_status: result.exit_status,
                    reason,
                    output: result.output,
                })
            }
            Some(reason) => {
                info!("Command failed ({}), fix not available", reason);
                Ok(State::Done(result.exit_status))
            }
        }
    }

    async fn invoke_model<E: Write>(
        &self,
        session: &mut Session,
        user_prompt: &str,
        what: &str,
        ui: &mut E,
    ) -> Result<ModelOutput> {
        let started = Instant::now();
        let output = self
            .model
            .invoke(&self.context.system_prompt, user_prompt, self.context.yolo)
            .await;
        let step = started.elapsed();
        session.add_elapsed(step);
        self.menu.show_elapsed(what, step, session.elapsed(), ui)?;
        Ok(output)
    }
}
