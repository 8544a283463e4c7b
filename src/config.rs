//! Persisted defaults.
//!
//! Settings live in `config.toml` inside the config directory
//! (`$INCANTO_CONFIG_DIR`, or `~/.incanto`). They are loaded once at start-up
//! and only written by `spell --set-default`; the lifecycle controller never
//! touches them.

use anyhow::{Context, Result, anyhow, bail};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const CONFIG_DIR_ENV: &str = "INCANTO_CONFIG_DIR";
pub const USE_MOCK_ENV: &str = "INCANTO_USE_MOCK";
const CONFIG_FILE: &str = "config.toml";

/// Keys accepted by `--set-default`.
pub const SETTABLE_KEYS: &[&str] = &["model", "yolo", "fix", "backend", "claude_command"];

/// Which model backend to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The `claude` command-line tool.
    #[default]
    Cli,
    /// The Anthropic Messages HTTP API.
    Api,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Cli => f.write_str("cli"),
            Backend::Api => f.write_str("api"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: String,
    pub yolo: bool,
    pub fix: bool,
    pub backend: Backend,
    pub claude_command: String,
    pub anthropic_api_key: Option<String>,
    #[serde(skip)]
    pub use_mock: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "sonnet".to_string(),
            yolo: false,
            fix: true,
            backend: Backend::Cli,
            claude_command: "claude".to_string(),
            anthropic_api_key: None,
            use_mock: false,
        }
    }
}

impl Config {
    /// Loads settings from the config directory, then applies environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_dir(&Self::get_config_dir()?)?;

        if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
            if !api_key.trim().is_empty() {
                config.anthropic_api_key = Some(api_key);
            }
        }
        if std::env::var(USE_MOCK_ENV).is_ok() {
            config.use_mock = true;
        }

        Ok(config)
    }

    /// Reads `config.toml` from `dir`, falling back to defaults when absent.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to_dir(&Self::get_config_dir()?)
    }

    pub fn save_to_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Saved config to: {}", path.display());
        Ok(())
    }

    pub fn get_config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            if !dir.trim().is_empty() {
                return Ok(PathBuf::from(dir));
            }
        }
        let home = home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
        Ok(home.join(".incanto"))
    }

    /// Updates one setting from a `KEY=VALUE` assignment.
    ///
    /// # Errors
    ///
    /// Fails for a malformed assignment, an unknown key, or a value that does
    /// not fit the key. Nothing is changed in that case.
    pub fn apply_assignment(&mut self, assignment: &str) -> Result<()> {
        let (key, value) = parse_assignment(assignment)?;
        match key {
            "model" => {
                if value.is_empty() {
                    bail!("model must not be empty");
                }
                self.model = value.to_string();
            }
            "yolo" => self.yolo = parse_bool(value)?,
            "fix" => self.fix = parse_bool(value)?,
            "backend" => {
                self.backend = match value.to_ascii_lowercase().as_str() {
                    "cli" => Backend::Cli,
                    "api" => Backend::Api,
                    other => bail!("Unknown backend '{}' (expected cli or api)", other),
                }
            }
            "claude_command" => {
                if value.is_empty() {
                    bail!("claude_command must not be empty");
                }
                self.claude_command = value.to_string();
            }
            other => bail!(
                "Unknown setting '{}'. Known settings: {}",
                other,
                SETTABLE_KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// Human-readable summary for `--show-defaults`.
    pub fn describe(&self) -> String {
        let dir = Self::get_config_dir()
            .map(|d| d.join(CONFIG_FILE).display().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        format!(
            "Configuration file: {}\nmodel = {}\nyolo = {}\nfix = {}\nbackend = {}\nclaude_command = {}\nAPI key: {}\n",
            dir,
            self.model,
            self.yolo,
            self.fix,
            self.backend,
            self.claude_command,
            if self.anthropic_api_key.is_some() { "Set" } else { "Not set" },
        )
    }
}

/// Splits `KEY=VALUE`, trimming both sides.
pub fn parse_assignment(assignment: &str) -> Result<(&str, &str)> {
    let (key, value) = assignment
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected KEY=VALUE, got '{}'", assignment))?;
    let key = key.trim();
    if key.is_empty() {
        bail!("Expected KEY=VALUE, got '{}'", assignment);
    }
    Ok((key, value.trim()))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => Err(anyhow!("Expected a boolean, got '{}'", other)),
    }
}
