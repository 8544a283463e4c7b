//! Incanto - turn natural-language requests into shell commands.
//!
//! A request goes to a language model, the answer is cleaned up into a
//! candidate command, and the user decides what happens next: run it, refine
//! it with extra instructions, or cancel. When a command fails, the captured
//! output can be fed back to the model for a corrected version.
//!
//! # Architecture
//!
//! - [`controller`] - The lifecycle state machine driving everything else
//! - [`model_client`] - Model backends (Claude CLI, Anthropic API, mock)
//! - [`sanitizer`] - Strips markdown artifacts from model output
//! - [`candidate`] - The proposed command and comment detection
//! - [`error_classifier`] - Heuristic failure detection for executed commands
//! - [`command_runner`] - Runs commands through the host shell with capture
//! - [`menu`] - Interactive prompts
//! - [`prompts`] - System, refinement and fix prompt text
//! - [`environment`] - Host facts embedded in the system prompt
//! - [`config`] - Persisted defaults
//! - [`providers`] - Terminal detection seam
//! - [`http_client`] - HTTP transport for the API backend
//!
//! # Example
//!
//! ```ignore
//! use incanto::controller::{LifecycleController, RequestContext};
//! use incanto::environment::EnvironmentFacts;
//! use incanto::model_client::MockModelClient;
//! use incanto::providers::StdTerminalProbe;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let env = EnvironmentFacts::detect();
//!     let context = RequestContext::new("list files", "sonnet", &env, false, true, false);
//!     let controller =
//!         LifecycleController::with_shell(context, &StdTerminalProbe, Box::new(MockModelClient));
//!     std::process::exit(controller.run().await?);
//! }
//! ```
//!
//! # Run modes
//!
//! ```bash
//! # Interactive menu
//! spell find large files in my home directory
//!
//! # Piped: just print the command
//! spell list files | tee cmd.txt
//!
//! # Auto-execute, offering a fix if it fails
//! spell --yolo --fix show disk usage
//! ```

pub mod candidate;
pub mod command_runner;
pub mod config;
pub mod controller;
pub mod environment;
pub mod error_classifier;
pub mod http_client;
pub mod menu;
pub mod model_client;
pub mod prompts;
pub mod providers;
pub mod sanitizer;
