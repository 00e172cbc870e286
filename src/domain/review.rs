use crate::domain::{ChangeKind, FileChange, SessionId};

pub const DEFAULT_REVIEW_LINE_CAP: usize = 200;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReviewLineKind {
    Hunk,
    Added,
    Removed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReviewLine {
    pub kind: ReviewLineKind,
    pub text: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReviewFile {
    pub path: String,
    pub kind: ChangeKind,
    pub additions: u32,
    pub deletions: u32,
    pub lines: Vec<ReviewLine>,
    pub hidden_lines: usize,
}

impl ReviewFile {
    /// Keeps hunk headers and added/removed lines, dropping file headers and
    /// context. Lines past `cap` are counted, not kept.
    pub fn from_diff(change: &FileChange, diff: &str, cap: usize) -> Self {
        let mut lines = Vec::new();
        let mut hidden_lines = 0usize;

        let mut in_hunk = false;
        for raw in diff.lines() {
            if raw.starts_with("diff --git ") {
                in_hunk = false;
                continue;
            }
            if raw.starts_with("@@") {
                in_hunk = true;
            }
            let Some(kind) = classify_diff_line(raw, in_hunk) else {
                continue;
            };
            if lines.len() >= cap {
                hidden_lines += 1;
                continue;
            }
            lines.push(ReviewLine {
                kind,
                text: raw.to_string(),
            });
        }

        Self {
            path: change.path.clone(),
            kind: change.kind,
            additions: change.additions,
            deletions: change.deletions,
            lines,
            hidden_lines,
        }
    }
}

/// File headers (`---`/`+++`, `index`, modes) only appear before the first
/// hunk of a file section; inside a hunk the first byte decides.
fn classify_diff_line(line: &str, in_hunk: bool) -> Option<ReviewLineKind> {
    if line.starts_with("@@") {
        return Some(ReviewLineKind::Hunk);
    }
    if !in_hunk {
        return None;
    }
    match line.as_bytes().first() {
        Some(b'+') => Some(ReviewLineKind::Added),
        Some(b'-') => Some(ReviewLineKind::Removed),
        _ => None,
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReviewRow<'a> {
    FileHeader(&'a ReviewFile),
    Line(&'a ReviewLine),
    MoreLines(usize),
    Blank,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReviewView {
    pub session_id: SessionId,
    pub title: String,
    pub files: Vec<ReviewFile>,
}

impl ReviewView {
    pub fn rows(&self) -> Vec<ReviewRow<'_>> {
        let mut rows = Vec::new();
        for (index, file) in self.files.iter().enumerate() {
            if index > 0 {
                rows.push(ReviewRow::Blank);
            }
            rows.push(ReviewRow::FileHeader(file));
            rows.extend(file.lines.iter().map(ReviewRow::Line));
            if file.hidden_lines > 0 {
                rows.push(ReviewRow::MoreLines(file.hidden_lines));
            }
        }
        rows
    }

    /// The file whose section contains `row`.
    pub fn file_at_row(&self, row: usize) -> Option<&ReviewFile> {
        let mut current = None;
        for (index, entry) in self.rows().into_iter().enumerate() {
            if let ReviewRow::FileHeader(file) = entry {
                current = Some(file);
            }
            if index == row {
                return current;
            }
        }
        None
    }

    pub fn row_count(&self) -> usize {
        self.rows().len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.iter().map(|file| file.path.clone()).collect()
    }
}
