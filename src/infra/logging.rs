use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "agentbay.log";
const LOG_ENV_VAR: &str = "AGENTBAY_LOG";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to install log subscriber: {0}")]
    Install(String),
}

pub fn log_file_path(state_dir: &Path) -> PathBuf {
    state_dir.join(LOG_FILE_NAME)
}

/// Sends tracing output to `<state_dir>/agentbay.log`. The TUI owns stdout,
/// so nothing is ever logged to the terminal.
pub fn init_logging(state_dir: &Path, default_filter: &str) -> Result<PathBuf, LoggingError> {
    let path = log_file_path(state_dir);
    std::fs::create_dir_all(state_dir).map_err(|source| LoggingError::Open {
        path: state_dir.display().to_string(),
        source,
    })?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| LoggingError::Open {
            path: path.display().to_string(),
            source,
        })?;

    tracing_subscriber::fmt()
        .with_env_filter(build_filter(
            std::env::var(LOG_ENV_VAR).ok().as_deref(),
            default_filter,
        ))
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .try_init()
        .map_err(|error| LoggingError::Install(error.to_string()))?;

    Ok(path)
}

fn build_filter(from_env: Option<&str>, default_filter: &str) -> EnvFilter {
    from_env
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(default_filter).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
