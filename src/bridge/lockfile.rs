use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const IDE_NAME: &str = "agentbay";

#[derive(Debug, Error)]
pub enum LockfileError {
    #[error("could not determine a data directory for the IDE lockfile")]
    NoDataHome,

    #[error("failed to write lockfile {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Contents of `<data_home>/amp/ide/<port>.json`, read by agent CLIs to find
/// the bridge.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lockfile {
    pub port: u16,
    pub auth_token: String,
    pub pid: u32,
    pub workspace_folders: Vec<String>,
    pub ide_name: String,
}

impl Lockfile {
    pub fn new(port: u16, auth_token: &str, workspace_folders: &[PathBuf]) -> Self {
        Self {
            port,
            auth_token: auth_token.to_string(),
            pid: std::process::id(),
            workspace_folders: workspace_folders
                .iter()
                .map(|folder| folder.display().to_string())
                .collect(),
            ide_name: IDE_NAME.to_string(),
        }
    }
}

pub fn resolve_data_home() -> Result<PathBuf, LockfileError> {
    data_home_from(
        std::env::var_os("AMP_DATA_HOME").map(PathBuf::from),
        std::env::var_os("XDG_DATA_HOME").map(PathBuf::from),
        dirs::home_dir().as_deref(),
        cfg!(target_os = "linux"),
    )
    .ok_or(LockfileError::NoDataHome)
}

fn data_home_from(
    amp_override: Option<PathBuf>,
    xdg_data_home: Option<PathBuf>,
    home: Option<&Path>,
    linux: bool,
) -> Option<PathBuf> {
    if let Some(dir) = amp_override.filter(|dir| !dir.as_os_str().is_empty()) {
        return Some(dir);
    }
    if linux {
        if let Some(dir) = xdg_data_home.filter(|dir| !dir.as_os_str().is_empty()) {
            return Some(dir);
        }
    }
    home.map(|home| home.join(".local").join("share"))
}

pub fn lockfile_path(data_home: &Path, port: u16) -> PathBuf {
    data_home.join("amp").join("ide").join(format!("{port}.json"))
}

/// Writes through a sibling temp file so readers never see a partial file.
pub fn write_lockfile(path: &Path, lockfile: &Lockfile) -> Result<(), LockfileError> {
    let write_error = |source| LockfileError::Write {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }
    let text = serde_json::to_string(lockfile)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, text).map_err(write_error)?;
    std::fs::rename(&tmp, path).map_err(write_error)
}

pub fn remove_lockfile(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
        _ => Ok(()),
    }
}
