use anyhow::Result;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Runs the `spell` binary against the mock backend with an isolated config.
fn run_spell(config_dir: &Path, args: &[&str]) -> Result<Output> {
    let workdir = TempDir::new()?;
    let output = Command::new(env!("CARGO_BIN_EXE_spell"))
        .args(args)
        .current_dir(workdir.path())
        .env("INCANTO_USE_MOCK", "1")
        .env("INCANTO_CONFIG_DIR", config_dir)
        .env("SHELL", "sh")
        .env_remove("RUST_LOG")
        .stdin(Stdio::null())
        .output()?;
    Ok(output)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_piped_output_is_exactly_the_command() -> Result<()> {
    let config = TempDir::new()?;
    let output = run_spell(config.path(), &["list", "files"])?;

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "ls -la\n");
    Ok(())
}

#[test]
fn test_comment_answer_is_printed() -> Result<()> {
    let config = TempDir::new()?;
    let output = run_spell(config.path(), &["what", "is", "the", "meaning", "of", "life"])?;

    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).starts_with("# "));
    Ok(())
}

#[test]
fn test_backend_failure_status_is_exit_code() -> Result<()> {
    let config = TempDir::new()?;
    let output = run_spell(config.path(), &["please", "fail", "backend"])?;

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("mock backend failure"));
    assert!(stdout(&output).is_empty());
    Ok(())
}

#[test]
fn test_missing_prompt_is_usage_error() -> Result<()> {
    let config = TempDir::new()?;
    let output = run_spell(config.path(), &[])?;

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("No prompt provided"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_yolo_failure_without_terminal_returns_command_status() -> Result<()> {
    let config = TempDir::new()?;
    let output = run_spell(config.path(), &["--yolo", "--fix", "remove", "missing", "file"])?;

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("No such file or directory"));
    assert!(!stderr(&output).contains("[f]ix"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_yolo_success_runs_command() -> Result<()> {
    let config = TempDir::new()?;
    let output = run_spell(config.path(), &["-y", "hello", "world"])?;

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "hello world\n");
    Ok(())
}

#[test]
fn test_set_default_then_show() -> Result<()> {
    let config = TempDir::new()?;

    let set = run_spell(config.path(), &["--set-default", "model=opus"])?;
    assert_eq!(set.status.code(), Some(0));
    assert!(config.path().join("config.toml").exists());

    let show = run_spell(config.path(), &["--show-defaults"])?;
    assert_eq!(show.status.code(), Some(0));
    assert!(stdout(&show).contains("model = opus"));
    Ok(())
}

#[test]
fn test_set_default_unknown_key_is_usage_error() -> Result<()> {
    let config = TempDir::new()?;
    let output = run_spell(config.path(), &["--set-default", "colour=red"])?;

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Unknown setting 'colour'"));
    assert!(!config.path().join("config.toml").exists());
    Ok(())
}

#[test]
fn test_set_default_malformed_is_usage_error() -> Result<()> {
    let config = TempDir::new()?;
    let output = run_spell(config.path(), &["--set-default", "yolo"])?;

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("KEY=VALUE"));
    Ok(())
}
