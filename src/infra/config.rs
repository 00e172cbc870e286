use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const MIN_POLL_INTERVAL_MS: u64 = 250;
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;

const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Error)]
pub enum ResolveStateDirError {
    #[error("could not determine home directory")]
    HomeDirNotFound,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub fn resolve_state_dir() -> Result<PathBuf, ResolveStateDirError> {
    if let Some(override_dir) = std::env::var_os("AGENTBAY_STATE_DIR") {
        return Ok(PathBuf::from(override_dir));
    }

    let Some(home) = home_dir() else {
        return Err(ResolveStateDirError::HomeDirNotFound);
    };

    Ok(home.join(".agentbay"))
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    pub program: String,
    pub args: Vec<String>,
    pub pass_prompt_as_arg: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: Vec::new(),
            pass_prompt_as_arg: true,
        }
    }
}

impl AgentConfig {
    pub fn command_args(&self, prompt: Option<&str>) -> Vec<String> {
        let mut args = self.args.clone();
        if self.pass_prompt_as_arg {
            if let Some(prompt) = prompt.filter(|prompt| !prompt.trim().is_empty()) {
                args.push(prompt.to_string());
            }
        }
        args
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub poll_interval_ms: u64,
    pub review_line_cap: usize,
    pub git_binary: String,
    pub open_command: String,
    pub ide_bridge: bool,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            poll_interval_ms: 2000,
            review_line_cap: crate::domain::DEFAULT_REVIEW_LINE_CAP,
            git_binary: "git".to_string(),
            open_command: default_open_command().to_string(),
            ide_bridge: true,
            log_filter: "info".to_string(),
        }
    }
}

fn default_open_command() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    }
}

impl Config {
    /// Reads `<state_dir>/config.json`; a missing file yields defaults.
    pub fn load(state_dir: &Path) -> Result<Self, ConfigError> {
        let path = state_dir.join(CONFIG_FILE_NAME);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(program) = lookup("AGENTBAY_AGENT").filter(|value| !value.trim().is_empty()) {
            self.agent.program = program;
        }
        if let Some(ms) = lookup("AGENTBAY_POLL_MS").and_then(|value| value.trim().parse().ok()) {
            self.poll_interval_ms = ms;
        }
        if let Some(binary) = lookup("AGENTBAY_GIT_BIN").filter(|value| !value.trim().is_empty()) {
            self.git_binary = binary;
        }
        if let Some(open) = lookup("AGENTBAY_OPEN").filter(|value| !value.trim().is_empty()) {
            self.open_command = open;
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.poll_interval_ms
                .clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS),
        )
    }
}
