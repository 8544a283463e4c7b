//! Facts about the host that are embedded into the system prompt.

use std::path::PathBuf;
use tracing::debug;

/// Host facts collected once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentFacts {
    /// e.g. `linux-x86_64`
    pub os: String,
    pub user: String,
    pub group: String,
    pub home_dir: String,
    pub working_dir: String,
    pub is_root: bool,
    /// Basename of the host shell, e.g. `bash` or `fish`.
    pub shell: String,
}

impl EnvironmentFacts {
    /// Collects facts from the running process.
    pub fn detect() -> Self {
        let Identity {
            user,
            group,
            is_root,
        } = Identity::current();

        let facts = Self {
            os: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            user,
            group,
            home_dir: path_display(dirs::home_dir()),
            working_dir: path_display(std::env::current_dir().ok()),
            is_root,
            shell: shell_name(&crate::command_runner::host_shell()),
        };
        debug!("Detected environment: {:?}", facts);
        facts
    }
}

/// Effective user and group of this process.
struct Identity {
    user: String,
    group: String,
    is_root: bool,
}

impl Identity {
    #[cfg(unix)]
    fn current() -> Self {
        use nix::unistd::{Group, User, getegid, geteuid};

        let uid = geteuid();
        let user = User::from_uid(uid)
            .ok()
            .flatten()
            .map(|u| u.name)
            .or_else(env_user)
            .unwrap_or_else(|| "unknown".to_string());
        let group = Group::from_gid(getegid())
            .ok()
            .flatten()
            .map(|g| g.name)
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            user,
            group,
            is_root: uid.is_root(),
        }
    }

    #[cfg(not(unix))]
    fn current() -> Self {
        Self {
            user: env_user().unwrap_or_else(|| "unknown".to_string()),
            group: "unknown".to_string(),
            is_root: false,
        }
    }
}

fn env_user() -> Option<String> {
    ["USER", "USERNAME"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.trim().is_empty())
}

fn path_display(path: Option<PathBuf>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// `/usr/bin/fish` -> `fish`
pub fn shell_name(shell: &str) -> String {
    let trimmed = shell.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("sh")
        .to_string()
}
