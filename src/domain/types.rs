use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let simple = self.0.simple().to_string();
        f.write_str(&simple[simple.len().saturating_sub(8)..])
    }
}

/// Opaque reference to a terminal owned by the terminal provider.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TerminalHandle(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionStatus {
    Working,
    Done,
    Error,
}

impl SessionStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangeKind {
    Modified,
    Added,
    Deleted,
    Renamed,
}

impl ChangeKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Modified => "modified",
            Self::Added => "added",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Self::Modified => 'M',
            Self::Added => 'A',
            Self::Deleted => 'D',
            Self::Renamed => 'R',
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileChange {
    pub path: String,
    pub additions: u32,
    pub deletions: u32,
    pub kind: ChangeKind,
}

impl FileChange {
    pub fn untracked(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            additions: 0,
            deletions: 0,
            kind: ChangeKind::Added,
        }
    }
}

pub fn change_totals(changes: &[FileChange]) -> (u64, u64) {
    changes.iter().fold((0u64, 0u64), |(adds, dels), change| {
        (
            adds.saturating_add(u64::from(change.additions)),
            dels.saturating_add(u64::from(change.deletions)),
        )
    })
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub label: String,
    pub work_area: PathBuf,
    pub branch: Option<String>,
    pub prompt: Option<String>,
    pub terminal: Option<TerminalHandle>,
    pub status: SessionStatus,
    pub file_changes: Vec<FileChange>,
    pub created_at: SystemTime,
    pub last_activity: SystemTime,
}

impl Session {
    pub fn new(
        work_area: PathBuf,
        prompt: Option<String>,
        label: Option<String>,
        branch: Option<String>,
    ) -> Self {
        let now = SystemTime::now();
        let label = label
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| default_label(&work_area));
        Self {
            id: SessionId::generate(),
            label,
            work_area,
            branch,
            prompt: prompt.filter(|prompt| !prompt.trim().is_empty()),
            terminal: None,
            status: SessionStatus::Working,
            file_changes: Vec::new(),
            created_at: now,
            last_activity: now,
        }
    }
}

pub fn default_label(work_area: &Path) -> String {
    work_area
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| work_area.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_defaults_to_directory_name() {
        let session = Session::new(PathBuf::from("/tmp/repo-wt"), None, None, None);
        assert_eq!(session.label, "repo-wt");
        assert_eq!(session.status, SessionStatus::Working);
        assert!(session.terminal.is_none());
    }

    #[test]
    fn blank_prompt_and_label_are_dropped() {
        let session = Session::new(
            PathBuf::from("/tmp/a"),
            Some("   ".to_string()),
            Some(" ".to_string()),
            None,
        );
        assert_eq!(session.prompt, None);
        assert_eq!(session.label, "a");
    }

    #[test]
    fn ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 8);
    }
}
