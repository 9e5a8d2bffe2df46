//! Agent binary resolution and subprocess launch.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Child;
use tracing::{info, warn};

use crate::ConnectorError;

/// Environment variable overriding the agent binary path.
pub const AGENT_BIN_ENV: &str = "AGENTDECK_AGENT_BIN";

/// Resolve the agent binary path.
/// 1. AGENTDECK_AGENT_BIN env var
/// 2. ~/.claude/local/claude
/// 3. Search PATH via `which`
pub fn resolve_agent_binary() -> Result<PathBuf, ConnectorError> {
    if let Ok(path) = std::env::var(AGENT_BIN_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        warn!(
            component = "agent_command",
            event = "agent.binary.env_not_found",
            path = %path.display(),
            "{AGENT_BIN_ENV} path does not exist, trying fallbacks"
        );
    }

    if let Some(home) = dirs::home_dir() {
        let local_path = home.join(".claude/local/claude");
        if local_path.exists() {
            return Ok(local_path);
        }
    }

    if let Ok(output) = std::process::Command::new("which").arg("claude").output() {
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path.is_empty() && Path::new(&path).exists() {
                return Ok(PathBuf::from(path));
            }
        }
    }

    Err(ConnectorError::Spawn(format!(
        "agent binary not found; install the agent CLI or set {AGENT_BIN_ENV}"
    )))
}

/// Spawn one non-interactive agent invocation with piped stdout/stderr.
/// Stdin is closed: the prompt rides in the argument vector.
pub fn spawn_agent(
    binary: &Path,
    args: &[String],
    cwd: &Path,
) -> Result<Child, ConnectorError> {
    info!(
        component = "agent_command",
        event = "agent.spawn",
        binary = %binary.display(),
        cwd = %cwd.display(),
        arg_count = args.len(),
        "Spawning agent subprocess"
    );

    tokio::process::Command::new(binary)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ConnectorError::Spawn(format!("failed to spawn agent: {e}")))
}
