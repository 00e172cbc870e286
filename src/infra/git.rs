use crate::domain::{ChangeKind, FileChange, build_change_set, parse_numstat, parse_untracked};
use crate::infra::{ProcessOutput, ProcessRunner};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },

    #[error("git {command} failed: {detail}")]
    CommandFailed { command: String, detail: String },
}

/// Read-only queries plus worktree creation, all through the git CLI.
#[derive(Clone, Debug)]
pub struct GitCli<R> {
    runner: R,
    binary: String,
}

impl<R: ProcessRunner> GitCli<R> {
    pub fn new(runner: R, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    async fn run(&self, cwd: &Path, args: &[&str]) -> Result<ProcessOutput, GitError> {
        let mut full = vec!["-c", "core.quotepath=off"];
        full.extend_from_slice(args);
        self.runner
            .run(&self.binary, &full, cwd)
            .await
            .map_err(|source| GitError::Spawn {
                binary: self.binary.clone(),
                source,
            })
    }

    /// Stdout of a successful command; failures are logged and swallowed.
    async fn query(&self, cwd: &Path, args: &[&str]) -> Option<String> {
        match self.run(cwd, args).await {
            Ok(output) if output.success() => Some(output.stdout),
            Ok(output) => {
                debug!(
                    cwd = %cwd.display(),
                    command = %args.join(" "),
                    detail = %output.failure_detail(),
                    "git query failed"
                );
                None
            }
            Err(error) => {
                debug!(cwd = %cwd.display(), %error, "git query failed");
                None
            }
        }
    }

    /// Tracked differences against HEAD followed by untracked files, scoped
    /// to `work_area` with paths relative to it. Never fails: whatever could
    /// be read is returned.
    pub async fn changes(&self, work_area: &Path) -> Vec<FileChange> {
        let numstat = self
            .query(work_area, &["diff", "--numstat", "--relative", "HEAD"])
            .await
            .map(|stdout| parse_numstat(&stdout))
            .unwrap_or_default();
        let untracked = self
            .query(work_area, &["ls-files", "--others", "--exclude-standard"])
            .await
            .map(|stdout| parse_untracked(&stdout))
            .unwrap_or_default();

        build_change_set(numstat, untracked, |path| work_area.join(path).exists())
    }

    pub async fn current_branch(&self, dir: &Path) -> Option<String> {
        let stdout = self.query(dir, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        let branch = stdout.trim();
        (!branch.is_empty()).then(|| branch.to_string())
    }

    pub async fn repo_root(&self, dir: &Path) -> Option<PathBuf> {
        let stdout = self.query(dir, &["rev-parse", "--show-toplevel"]).await?;
        let root = stdout.trim();
        (!root.is_empty()).then(|| PathBuf::from(root))
    }

    pub async fn add_worktree(&self, vcs_root: &Path, path: &Path) -> Result<(), GitError> {
        let root = vcs_root.to_string_lossy();
        let target = path.to_string_lossy();
        let output = self
            .run(vcs_root, &["-C", &root, "worktree", "add", &target])
            .await?;
        if output.success() {
            return Ok(());
        }
        Err(GitError::CommandFailed {
            command: "worktree add".to_string(),
            detail: output.failure_detail(),
        })
    }

    /// Diff text for one changed file. Untracked files are diffed against
    /// /dev/null, where exit code 1 only means "differences found".
    pub async fn file_diff(&self, work_area: &Path, change: &FileChange) -> Option<String> {
        if change.kind == ChangeKind::Added {
            let output = self
                .run(
                    work_area,
                    &["diff", "--no-index", "--", "/dev/null", &change.path],
                )
                .await
                .ok()?;
            return matches!(output.exit_code, Some(0) | Some(1)).then_some(output.stdout);
        }
        self.query(work_area, &["diff", "HEAD", "--", &change.path])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::TokioProcessRunner;
    use crate::infra::testing::{ScriptedRunner, failed, ok};

    #[tokio::test]
    async fn merges_numstat_and_untracked_output() {
        let runner = ScriptedRunner::new()
            .on("--numstat", ok("4\t2\tsrc/lib.rs\n-\t-\tlogo.png\n"))
            .on("ls-files", ok("notes.md\n"));
        let git = GitCli::new(runner.clone(), "git");
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("src")).expect("mkdir");
        std::fs::write(dir.path().join("src/lib.rs"), "x").expect("write");

        let changes = git.changes(dir.path()).await;
        let summary: Vec<_> = changes
            .iter()
            .map(|c| (c.path.as_str(), c.additions, c.deletions, c.kind))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("src/lib.rs", 4, 2, ChangeKind::Modified),
                ("logo.png", 0, 0, ChangeKind::Modified),
                ("notes.md", 0, 0, ChangeKind::Added),
            ]
        );
        assert_eq!(runner.calls()[0][..2], ["-c".to_string(), "core.quotepath=off".to_string()]);
    }

    #[tokio::test]
    async fn partial_failure_keeps_what_was_read() {
        let runner = ScriptedRunner::new()
            .on("--numstat", failed(128, "fatal: bad revision 'HEAD'"))
            .on("ls-files", ok("first.txt\n"));
        let git = GitCli::new(runner, "git");
        let changes = git.changes(Path::new("/nonexistent")).await;
        assert_eq!(changes, vec![FileChange::untracked("first.txt")]);
    }

    #[tokio::test]
    async fn worktree_failure_carries_stderr() {
        let runner = ScriptedRunner::new().on(
            "worktree",
            failed(128, "fatal: '/tmp/wt' already exists\n"),
        );
        let git = GitCli::new(runner.clone(), "git");
        let err = git
            .add_worktree(Path::new("/repo"), Path::new("/tmp/wt"))
            .await
            .expect_err("failure");
        assert_eq!(
            err.to_string(),
            "git worktree add failed: fatal: '/tmp/wt' already exists"
        );
        let call = &runner.calls()[0];
        assert!(call.ends_with(&[
            "-C".to_string(),
            "/repo".to_string(),
            "worktree".to_string(),
            "add".to_string(),
            "/tmp/wt".to_string(),
        ]));
    }

    #[tokio::test]
    async fn untracked_diff_accepts_exit_code_one() {
        let runner = ScriptedRunner::new().on(
            "--no-index",
            ProcessOutput {
                exit_code: Some(1),
                stdout: "+hello\n".to_string(),
                stderr: String::new(),
            },
        );
        let git = GitCli::new(runner, "git");
        let diff = git
            .file_diff(Path::new("/w"), &FileChange::untracked("new.txt"))
            .await;
        assert_eq!(diff.as_deref(), Some("+hello\n"));
    }

    #[tokio::test]
    async fn real_git_outside_repository_yields_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let git = GitCli::new(TokioProcessRunner, "git");
        assert!(git.changes(dir.path()).await.is_empty());
        assert_eq!(git.current_branch(dir.path()).await, None);
    }

    fn git_setup(dir: &Path, args: &[&str]) -> bool {
        std::process::Command::new("git")
            .args(["-c", "user.name=agentbay", "-c", "user.email=agentbay@localhost"])
            .args(["-c", "commit.gpgsign=false"])
            .args(args)
            .current_dir(dir)
            .output()
            .is_ok_and(|output| output.status.success())
    }

    #[tokio::test]
    async fn real_git_subdirectory_work_area_is_scoped_to_itself() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        if !git_setup(root, &["init", "-q"]) {
            return;
        }
        std::fs::create_dir_all(root.join("sub")).expect("mkdir");
        std::fs::write(root.join("sub/a.txt"), "one\ntwo\n").expect("write");
        std::fs::write(root.join("other.txt"), "x\n").expect("write");
        assert!(git_setup(root, &["add", "."]));
        assert!(git_setup(root, &["commit", "-q", "-m", "init"]));

        std::fs::write(root.join("sub/a.txt"), "one\n").expect("write");
        std::fs::write(root.join("other.txt"), "y\n").expect("write");
        std::fs::write(root.join("sub/new.txt"), "fresh\n").expect("write");

        let git = GitCli::new(TokioProcessRunner, "git");
        let work_area = root.join("sub");
        let changes = git.changes(&work_area).await;
        let summary: Vec<_> = changes
            .iter()
            .map(|c| (c.path.as_str(), c.additions, c.deletions, c.kind))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("a.txt", 0, 1, ChangeKind::Modified),
                ("new.txt", 0, 0, ChangeKind::Added),
            ]
        );

        let diff = git
            .file_diff(&work_area, &changes[0])
            .await
            .expect("tracked diff");
        assert!(diff.lines().any(|line| line == "-two"));
        let diff = git
            .file_diff(&work_area, &changes[1])
            .await
            .expect("untracked diff");
        assert!(diff.lines().any(|line| line == "+fresh"));
    }
}
