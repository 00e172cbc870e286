use crate::domain::{ChangeKind, FileChange};

/// One line of `git diff --numstat` output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NumstatEntry {
    pub path: String,
    pub renamed_from: Option<String>,
    pub additions: u32,
    pub deletions: u32,
    pub binary: bool,
}

/// Parses `<adds>\t<dels>\t<path>` lines. Binary entries (`-\t-\tpath`) are
/// kept with zero counts.
pub fn parse_numstat(output: &str) -> Vec<NumstatEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, '\t');
            let adds = parts.next()?;
            let dels = parts.next()?;
            let raw_path = parts.next()?.trim();
            if raw_path.is_empty() {
                return None;
            }

            let binary = adds == "-" && dels == "-";
            let (additions, deletions) = if binary {
                (0, 0)
            } else {
                (adds.parse().ok()?, dels.parse().ok()?)
            };
            let (path, renamed_from) = match split_rename(raw_path) {
                Some((old, new)) => (new, Some(old)),
                None => (raw_path.to_string(), None),
            };

            Some(NumstatEntry {
                path,
                renamed_from,
                additions,
                deletions,
                binary,
            })
        })
        .collect()
}

/// Expands `old => new` and `dir/{a => b}/file` into `(old, new)`.
pub fn split_rename(raw: &str) -> Option<(String, String)> {
    if let (Some(open), Some(close)) = (raw.find('{'), raw.rfind('}')) {
        if open < close {
            let inner = &raw[open + 1..close];
            let (old_mid, new_mid) = inner.split_once(" => ")?;
            let prefix = &raw[..open];
            let suffix = &raw[close + 1..];
            return Some((
                join_rename_parts(prefix, old_mid, suffix),
                join_rename_parts(prefix, new_mid, suffix),
            ));
        }
    }

    let (old, new) = raw.split_once(" => ")?;
    Some((old.trim().to_string(), new.trim().to_string()))
}

fn join_rename_parts(prefix: &str, middle: &str, suffix: &str) -> String {
    let joined = format!("{prefix}{middle}{suffix}");
    let mut out = String::with_capacity(joined.len());
    let mut last_was_slash = false;
    for ch in joined.chars() {
        if ch == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
        } else {
            last_was_slash = false;
        }
        out.push(ch);
    }
    out.trim_start_matches('/').to_string()
}

pub fn parse_untracked(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Merges tracked differences and untracked files into one change set.
/// `exists` reports whether a path relative to the work area is still on disk.
pub fn build_change_set(
    numstat: Vec<NumstatEntry>,
    untracked: Vec<String>,
    exists: impl Fn(&str) -> bool,
) -> Vec<FileChange> {
    let mut changes: Vec<FileChange> = numstat
        .into_iter()
        .map(|entry| {
            let kind = if entry.renamed_from.is_some() {
                ChangeKind::Renamed
            } else if !entry.binary
                && entry.additions == 0
                && entry.deletions > 0
                && !exists(&entry.path)
            {
                ChangeKind::Deleted
            } else {
                ChangeKind::Modified
            };
            FileChange {
                path: entry.path,
                additions: entry.additions,
                deletions: entry.deletions,
                kind,
            }
        })
        .collect();

    for path in untracked {
        if changes.iter().any(|change| change.path == path) {
            continue;
        }
        changes.push(FileChange::untracked(path));
    }
    changes
}
