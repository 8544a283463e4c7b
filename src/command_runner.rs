//! Runs a candidate through the host shell while capturing its output.
//!
//! The command keeps the real terminal so interactive programs render
//! correctly. Output is captured at the same time for failure
//! classification. How the capture happens depends on the platform:
//!
//! - **Linux**: `script -q -e -c <command> <capture-file>`
//! - **macOS / BSD**: `script -q <capture-file> <shell> -c <command>`
//! - **Anything else**, no `script` binary, or no terminal: the shell runs with piped
//!   stdout/stderr that are tee'd to the terminal and into a buffer.
//!
//! The capture file is a [`NamedTempFile`] removed on drop, so it never
//! outlives the run.

use anyhow::{Context, Result};
use io_tee::TeeReader;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Outcome of running a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_status: i32,
    /// Combined stdout and stderr.
    pub output: String,
    pub elapsed: Duration,
}

/// Executes candidate lines through the host shell.
///
/// This abstraction lets the lifecycle controller be tested without
/// spawning real processes.
pub trait CommandRunner {
    fn run(&self, lines: &[String]) -> Result<ExecutionResult>;
}

/// How output is captured while the command keeps the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStrategy {
    LinuxScript,
    BsdScript,
    Piped,
}

impl CaptureStrategy {
    /// Picks the strategy for the running platform.
    ///
    /// Without a terminal there is nothing for `script` to preserve, so
    /// output is simply piped.
    pub fn detect() -> Self {
        let use_script = io::stdout().is_terminal() && which::which("script").is_ok();
        Self::for_platform(std::env::consts::OS, use_script)
    }

    pub fn for_platform(os: &str, use_script: bool) -> Self {
        if !use_script {
            return CaptureStrategy::Piped;
        }
        match os {
            "linux" | "android" => CaptureStrategy::LinuxScript,
            "macos" | "ios" | "freebsd" | "openbsd" | "netbsd" | "dragonfly" => {
                CaptureStrategy::BsdScript
            }
            _ => CaptureStrategy::Piped,
        }
    }
}

/// Production runner backed by the host shell.
///
/// # Example
///
/// ```no_run
/// use incanto::command_runner::{CaptureStrategy, CommandRunner, ShellRunner};
///
/// let runner = ShellRunner::with_strategy(CaptureStrategy::Piped, "sh");
/// let result = runner.run(&["echo hello".to_string()])?;
/// assert_eq!(result.exit_status, 0);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct ShellRunner {
    strategy: CaptureStrategy,
    shell: String,
    /// Program plus leading arguments used in place of a bare `script`.
    script_command: Vec<String>,
    /// Where capture files are created; the system temp dir when `None`.
    capture_dir: Option<PathBuf>,
}

impl ShellRunner {
    /// Creates a runner for the current platform and `$SHELL`.
    pub fn new() -> Self {
        Self::with_strategy(CaptureStrategy::detect(), host_shell())
    }

    pub fn with_strategy(strategy: CaptureStrategy, shell: impl Into<String>) -> Self {
        Self {
            strategy,
            shell: shell.into(),
            script_command: vec!["script".to_string()],
            capture_dir: None,
        }
    }

    /// Uses another `script` implementation, e.g. `["/usr/local/bin/script"]`.
    pub fn with_script_command(mut self, command: Vec<String>) -> Self {
        if !command.is_empty() {
            self.script_command = command;
        }
        self
    }

    /// Creates capture files inside `dir` instead of the system temp dir.
    pub fn with_capture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.capture_dir = Some(dir.into());
        self
    }

    pub fn strategy(&self) -> CaptureStrategy {
        self.strategy
    }

    /// Program and arguments launched for `command` under this strategy.
    fn script_invocation(&self, command: &str, capture_path: &Path) -> (String, Vec<String>) {
        let capture = capture_path.to_string_lossy().to_string();
        let mut args: Vec<String> = self.script_command[1..].to_vec();
        let strategy_args = match self.strategy {
            CaptureStrategy::LinuxScript => vec![
                "-q".to_string(),
                "-e".to_string(),
                "-c".to_string(),
                command.to_string(),
                capture,
            ],
            CaptureStrategy::BsdScript => vec![
                "-q".to_string(),
                capture,
                self.shell.clone(),
                "-c".to_string(),
                command.to_string(),
            ],
            CaptureStrategy::Piped => {
                return (shell_program(&self.shell), shell_args(command));
            }
        };
        args.extend(strategy_args);
        (self.script_command[0].clone(), args)
    }

    fn run_with_script(&self, command: &str) -> Result<(i32, String)> {
        let capture = match &self.capture_dir {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .context("Failed to create capture file")?;
        let (program, args) = self.script_invocation(command, capture.path());
        debug!("Capturing with {} {:?}", program, args);

        let mut cmd = Command::new(&program);
        cmd.args(&args);
        if self.strategy == CaptureStrategy::LinuxScript {
            // util-linux script runs the command with $SHELL
            cmd.env("SHELL", &self.shell);
        }

        let status = cmd
            .status()
            .with_context(|| format!("Failed to run '{}'", program))?;
        let raw = std::fs::read(capture.path()).with_context(|| {
            format!("Failed to read capture file {}", capture.path().display())
        })?;

        Ok((exit_code(status), clean_capture(&String::from_utf8_lossy(&raw))))
    }

    fn run_piped(&self, command: &str) -> Result<(i32, String)> {
        let mut child = Command::new(shell_program(&self.shell))
            .args(shell_args(command))
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'", self.shell))?;

        let child_stderr = child.stderr.take();
        let stderr_thread = thread::spawn(move || -> Vec<u8> {
            let mut captured = Vec::new();
            if let Some(stream) = child_stderr {
                let _ = TeeReader::new(stream, io::stderr()).read_to_end(&mut captured);
            }
            captured
        });

        let mut captured = Vec::new();
        let stdout_read = match child.stdout.take() {
            Some(stream) => TeeReader::new(stream, io::stdout())
                .read_to_end(&mut captured)
                .map(|_| ()),
            None => Ok(()),
        };

        // Reap the child and the stderr reader before reporting a read error.
        let status = child.wait().context("Failed to wait for command");
        let stderr_captured = stderr_thread.join().unwrap_or_default();
        stdout_read.context("Failed to read command output")?;
        let status = status?;
        captured.extend(stderr_captured);
        Ok((exit_code(status), clean_capture(&String::from_utf8_lossy(&captured))))
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, lines: &[String]) -> Result<ExecutionResult> {
        let command = lines.join("\n");
        info!("Executing command with {:?} capture: {}", self.strategy, command);

        let started = Instant::now();
        let (exit_status, output) = match self.strategy {
            CaptureStrategy::LinuxScript | CaptureStrategy::BsdScript => {
                self.run_with_script(&command)?
            }
            CaptureStrategy::Piped => self.run_piped(&command)?,
        };
        let elapsed = started.elapsed();

        info!("Command exited with status {} after {:?}", exit_status, elapsed);
        Ok(ExecutionResult {
            exit_status,
            output,
            elapsed,
        })
    }
}

/// The user's shell, falling back to `sh`.
pub fn host_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| {
            if cfg!(windows) {
                "cmd".to_string()
            } else {
                "sh".to_string()
            }
        })
}

fn shell_program(shell: &str) -> String {
    if cfg!(windows) {
        "cmd".to_string()
    } else {
        shell.to_string()
    }
}

fn shell_args(command: &str) -> Vec<String> {
    if cfg!(windows) {
        vec!["/C".to_string(), command.to_string()]
    } else {
        vec!["-c".to_string(), command.to_string()]
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// Drops carriage returns and the banner lines some `script` builds write.
fn clean_capture(raw: &str) -> String {
    let text = raw.replace('\r', "");
    let mut cleaned = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        if line.starts_with("Script started on") || line.starts_with("Script done on") {
            continue;
        }
        cleaned.push_str(line);
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dir_is_empty(dir: &TempDir) -> bool {
        std::fs::read_dir(dir.path()).unwrap().next().is_none()
    }

    /// Stand-in for `script` that runs `body` through `sh`. With the Linux
    /// argument order the capture file is `$5` and the command is `$4`.
    fn fake_script(body: &str) -> Vec<String> {
        vec![
            "sh".to_string(),
            "-c".to_string(),
            body.to_string(),
            "fake-script".to_string(),
        ]
    }

    #[test]
    fn test_strategy_for_linux_with_script() {
        assert_eq!(
            CaptureStrategy::for_platform("linux", true),
            CaptureStrategy::LinuxScript
        );
    }

    #[test]
    fn test_strategy_for_macos_with_script() {
        assert_eq!(
            CaptureStrategy::for_platform("macos", true),
            CaptureStrategy::BsdScript
        );
        assert_eq!(
            CaptureStrategy::for_platform("freebsd", true),
            CaptureStrategy::BsdScript
        );
    }

    #[test]
    fn test_strategy_without_script_is_piped() {
        assert_eq!(
            CaptureStrategy::for_platform("linux", false),
            CaptureStrategy::Piped
        );
        assert_eq!(
            CaptureStrategy::for_platform("windows", true),
            CaptureStrategy::Piped
        );
    }

    #[test]
    fn test_linux_invocation_order() {
        let runner = ShellRunner::with_strategy(CaptureStrategy::LinuxScript, "/bin/bash");
        let (program, args) =
            runner.script_invocation("ls -la", &PathBuf::from("/tmp/capture"));
        assert_eq!(program, "script");
        assert_eq!(args, vec!["-q", "-e", "-c", "ls -la", "/tmp/capture"]);
    }

    #[test]
    fn test_bsd_invocation_order() {
        let runner = ShellRunner::with_strategy(CaptureStrategy::BsdScript, "/bin/zsh");
        let (program, args) =
            runner.script_invocation("ls -la", &PathBuf::from("/tmp/capture"));
        assert_eq!(program, "script");
        assert_eq!(args, vec!["-q", "/tmp/capture", "/bin/zsh", "-c", "ls -la"]);
    }

    #[test]
    fn test_custom_script_command_prefixes_arguments() {
        let runner = ShellRunner::with_strategy(CaptureStrategy::LinuxScript, "sh")
            .with_script_command(vec!["busybox".to_string(), "script".to_string()]);
        let (program, args) = runner.script_invocation("true", &PathBuf::from("/tmp/c"));
        assert_eq!(program, "busybox");
        assert_eq!(args, vec!["script", "-q", "-e", "-c", "true", "/tmp/c"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_script_capture_is_read_and_file_removed() {
        let dir = TempDir::new().unwrap();
        let runner = ShellRunner::with_strategy(CaptureStrategy::LinuxScript, "sh")
            .with_script_command(fake_script("printf 'captured\\r\\n' > \"$5\"; exit 4"))
            .with_capture_dir(dir.path());

        let result = runner.run(&["ignored".to_string()]).unwrap();

        assert_eq!(result.exit_status, 4);
        assert_eq!(result.output, "captured\n");
        assert!(dir_is_empty(&dir));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_capture_is_an_error() {
        let dir = TempDir::new().unwrap();
        let runner = ShellRunner::with_strategy(CaptureStrategy::LinuxScript, "sh")
            .with_script_command(fake_script("rm -f \"$5\"; echo 'bash: x: command not found'"))
            .with_capture_dir(dir.path());

        let err = runner.run(&["x".to_string()]).unwrap_err();

        assert!(err.to_string().contains("Failed to read capture file"));
        assert!(dir_is_empty(&dir));
    }

    #[test]
    fn test_spawn_failure_removes_capture_file() {
        let dir = TempDir::new().unwrap();
        let runner = ShellRunner::with_strategy(CaptureStrategy::LinuxScript, "sh")
            .with_script_command(vec!["/definitely/not/a/script-binary".to_string()])
            .with_capture_dir(dir.path());

        let err = runner.run(&["ls".to_string()]).unwrap_err();

        assert!(err.to_string().contains("Failed to run"));
        assert!(dir_is_empty(&dir));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_real_script_captures_failure_output() {
        if which::which("script").is_err() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let runner = ShellRunner::with_strategy(CaptureStrategy::LinuxScript, "sh")
            .with_capture_dir(dir.path());

        let result = runner
            .run(&["ls /incanto-missing-path".to_string(), "exit 2".to_string()])
            .unwrap();

        assert_eq!(result.exit_status, 2);
        assert!(result.output.contains("No such file or directory"));
        assert!(!result.output.contains('\r'));
        assert!(dir_is_empty(&dir));
    }

    #[test]
    fn test_clean_capture_strips_carriage_returns_and_banners() {
        let raw = "Script started on 2024-01-01\r\nhello\r\nworld\r\nScript done on 2024-01-01\r\n";
        assert_eq!(clean_capture(raw), "hello\nworld\n");
    }

    #[test]
    fn test_clean_capture_keeps_partial_last_line() {
        assert_eq!(clean_capture("a\nb"), "a\nb");
    }

    #[cfg(unix)]
    #[test]
    fn test_piped_runner_captures_stdout_and_stderr() {
        let runner = ShellRunner::with_strategy(CaptureStrategy::Piped, "sh");
        let result = runner
            .run(&[
                "echo out".to_string(),
                "echo err 1>&2".to_string(),
            ])
            .unwrap();

        assert_eq!(result.exit_status, 0);
        assert!(result.output.contains("out\n"));
        assert!(result.output.contains("err\n"));
    }

    #[cfg(unix)]
    #[test]
    fn test_piped_runner_reports_exit_status() {
        let runner = ShellRunner::with_strategy(CaptureStrategy::Piped, "sh");
        let result = runner.run(&["exit 3".to_string()]).unwrap();
        assert_eq!(result.exit_status, 3);
        assert!(result.output.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_piped_runner_runs_multi_line_command() {
        let runner = ShellRunner::with_strategy(CaptureStrategy::Piped, "sh");
        let result = runner
            .run(&["for i in 1 2; do".to_string(), "  echo $i".to_string(), "done".to_string()])
            .unwrap();
        assert_eq!(result.output, "1\n2\n");
    }
}
