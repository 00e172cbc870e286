use crate::domain::{Registry, SessionId};
use crate::infra::{GitCli, ProcessRunner};
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProvisionOutcome {
    DuplicateSession(SessionId),
    UseExisting(PathBuf),
    NeedsWorktreeConfirmation { path: PathBuf, vcs_root: PathBuf },
    NeedsDirectoryConfirmation(PathBuf),
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum NormalizePathError {
    #[error("work area path is empty")]
    Empty,

    #[error("cannot expand ~ without a home directory")]
    NoHome,
}

/// Decides how a work area can be obtained. Never touches the filesystem
/// beyond existence checks.
pub async fn provision<R: ProcessRunner>(
    path: &Path,
    registry: &Registry,
    cwd: &Path,
    git: &GitCli<R>,
) -> ProvisionOutcome {
    if let Some(existing) = registry.owner_of(path) {
        return ProvisionOutcome::DuplicateSession(existing);
    }
    if path.exists() {
        return ProvisionOutcome::UseExisting(path.to_path_buf());
    }
    match git.repo_root(cwd).await {
        Some(vcs_root) => ProvisionOutcome::NeedsWorktreeConfirmation {
            path: path.to_path_buf(),
            vcs_root,
        },
        None => ProvisionOutcome::NeedsDirectoryConfirmation(path.to_path_buf()),
    }
}

/// Trims quotes, expands `~/`, resolves relative paths against `cwd` and
/// folds `.`/`..` components.
pub fn normalize_path(
    raw: &str,
    cwd: &Path,
    home: Option<&Path>,
) -> Result<PathBuf, NormalizePathError> {
    let trimmed = raw.trim().trim_matches(|ch| ch == '"' || ch == '\'').trim();
    if trimmed.is_empty() {
        return Err(NormalizePathError::Empty);
    }

    let expanded = if trimmed == "~" {
        home.ok_or(NormalizePathError::NoHome)?.to_path_buf()
    } else if let Some(rest) = trimmed.strip_prefix("~/") {
        home.ok_or(NormalizePathError::NoHome)?.join(rest)
    } else {
        PathBuf::from(trimmed)
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    };
    Ok(lexical_clean(&absolute))
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub fn create_directory(path: &Path) -> io::Result<()> {
    std::fs::create_dir_all(path)
}

/// `<parent of cwd>/<cwd name>-wt`, offered as the default new work area.
pub fn suggest_work_area(cwd: &Path) -> Option<PathBuf> {
    let name = cwd.file_name()?.to_string_lossy().to_string();
    let parent = cwd.parent()?;
    Some(parent.join(format!("{name}-wt")))
}
