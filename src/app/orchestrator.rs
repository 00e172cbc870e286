use crate::app::{SweepReport, TerminalBridge};
use crate::domain::{
    ActionId, ConfirmError, ConfirmRequest, ConfirmationEngine, PollTarget, Popup, PopupId, Registry,
    RegistryError, Resolution, ReviewFile, ReviewView, Session, SessionId, SessionStatus,
    WorkAreaPolicy,
};
use crate::infra::{
    AgentConfig, GitCli, GitError, ProcessRunner, ProvisionOutcome, TerminalError,
    TerminalProvider, TerminalSpec, create_directory, provision,
};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("failed to create worktree {path}: {source}")]
    WorktreeCreation {
        path: String,
        #[source]
        source: GitError,
    },

    #[error("failed to create directory {path}: {source}")]
    DirectoryCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start terminal: {0}")]
    Terminal(#[from] TerminalError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Confirm(#[from] ConfirmError),
}

#[derive(Debug)]
pub enum StartOutcome {
    Created(SessionId),
    NeedsConfirmation(Popup),
    Failed(OrchestratorError),
}

#[derive(Debug)]
pub enum CloseOutcome {
    Ignored,
    Closed(SessionId),
    NeedsConfirmation(Popup),
}

#[derive(Debug)]
pub enum ConfirmationOutcome {
    Ignored,
    Cancelled,
    Created(SessionId),
    Switched(SessionId),
    Closed(SessionId),
    Failed(OrchestratorError),
}

pub struct OrchestratorSettings {
    pub agent: AgentConfig,
    pub cwd: PathBuf,
    pub review_line_cap: usize,
}

/// Owns the session registry, the pending confirmation and every session
/// terminal. All registry mutation goes through here.
pub struct Orchestrator<R, T> {
    registry: Registry,
    confirmations: ConfirmationEngine,
    terminals: TerminalBridge<T>,
    git: GitCli<R>,
    settings: OrchestratorSettings,
    poll_targets: watch::Sender<Vec<PollTarget>>,
    workspace: watch::Sender<Vec<PathBuf>>,
    shutdown: watch::Sender<bool>,
}

impl<R: ProcessRunner, T: TerminalProvider> Orchestrator<R, T> {
    pub fn new(git: GitCli<R>, terminals: T, settings: OrchestratorSettings) -> Self {
        let (poll_targets, _) = watch::channel(Vec::new());
        let (workspace, _) = watch::channel(Vec::new());
        let (shutdown, _) = watch::channel(false);
        Self {
            registry: Registry::new(),
            confirmations: ConfirmationEngine::new(),
            terminals: TerminalBridge::new(terminals),
            git,
            settings,
            poll_targets,
            workspace,
            shutdown,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn terminals(&self) -> &TerminalBridge<T> {
        &self.terminals
    }

    pub fn terminals_mut(&mut self) -> &mut TerminalBridge<T> {
        &mut self.terminals
    }

    pub fn pending_popup(&self) -> Option<&Popup> {
        self.confirmations.pending().map(|pending| &pending.popup)
    }

    pub fn cwd(&self) -> &Path {
        &self.settings.cwd
    }

    pub fn subscribe_poll_targets(&self) -> watch::Receiver<Vec<PollTarget>> {
        self.poll_targets.subscribe()
    }

    pub fn subscribe_workspace(&self) -> watch::Receiver<Vec<PathBuf>> {
        self.workspace.subscribe()
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Runs the provisioner for `work_area` and either creates the session
    /// or raises the matching confirmation.
    pub async fn start_session(&mut self, work_area: PathBuf, prompt: Option<String>) -> StartOutcome {
        if let Some(popup) = self.pending_popup() {
            debug!(popup = %popup.id, "start ignored while a confirmation is pending");
            return StartOutcome::NeedsConfirmation(popup.clone());
        }

        let outcome = provision(&work_area, &self.registry, &self.settings.cwd, &self.git).await;
        info!(work_area = %work_area.display(), ?outcome, "provisioned work area");

        let request = match outcome {
            ProvisionOutcome::UseExisting(path) => {
                return match self
                    .create_session(path, prompt, None, WorkAreaPolicy::Exclusive)
                    .await
                {
                    Ok(id) => StartOutcome::Created(id),
                    Err(error) => StartOutcome::Failed(error),
                };
            }
            ProvisionOutcome::DuplicateSession(existing) => ConfirmRequest::DuplicateSession {
                work_area,
                existing,
                prompt,
            },
            ProvisionOutcome::NeedsWorktreeConfirmation { path, vcs_root } => {
                ConfirmRequest::CreateWorktree {
                    work_area: path,
                    vcs_root,
                    prompt,
                }
            }
            ProvisionOutcome::NeedsDirectoryConfirmation(path) => ConfirmRequest::CreateDirectory {
                work_area: path,
                prompt,
            },
        };
        self.raise(request)
    }

    fn raise(&mut self, request: ConfirmRequest) -> StartOutcome {
        let kind = request.kind();
        match self.confirmations.ask(request) {
            Ok(popup) => {
                info!(popup = %popup.id, kind, "confirmation raised");
                StartOutcome::NeedsConfirmation(popup)
            }
            Err(error) => {
                warn!(%error, kind, "confirmation not raised");
                StartOutcome::Failed(error.into())
            }
        }
    }

    /// Registers a session and gives it a terminal. A terminal failure rolls
    /// the registration back; the id is never reused.
    pub async fn create_session(
        &mut self,
        work_area: PathBuf,
        prompt: Option<String>,
        label: Option<String>,
        policy: WorkAreaPolicy,
    ) -> Result<SessionId, OrchestratorError> {
        let branch = self.git.current_branch(&work_area).await;
        let session = Session::new(work_area, prompt, label, branch);
        let spec = TerminalSpec {
            cwd: session.work_area.clone(),
            program: self.settings.agent.program.clone(),
            args: self.settings.agent.command_args(session.prompt.as_deref()),
        };
        let id = self.registry.insert(session, policy)?;

        match self.terminals.create(spec).await {
            Ok(handle) => {
                self.registry.set_terminal(id, handle);
            }
            Err(error) => {
                self.registry.remove(id);
                warn!(session = %id, %error, "terminal creation failed, session rolled back");
                self.publish();
                return Err(error.into());
            }
        }

        if self.registry.active_id() == Some(id) {
            self.show_active();
        }
        info!(session = %id, "session created");
        self.publish();
        Ok(id)
    }

    pub fn close_session(&mut self, id: SessionId) -> bool {
        let Some(removed) = self.registry.remove(id) else {
            return false;
        };
        if let Some(handle) = removed.session.terminal {
            self.terminals.close(handle);
        }
        if removed.was_active {
            self.show_active();
        }
        info!(session = %id, next_active = ?removed.next_active.map(|id| id.to_string()), "session closed");
        self.publish();
        true
    }

    pub fn switch_session(&mut self, id: SessionId) -> bool {
        if !self.registry.set_active(id) {
            return false;
        }
        self.show_active();
        debug!(session = %id, "session switched");
        true
    }

    /// Working sessions need an explicit confirmation before their terminal
    /// is killed.
    pub fn request_close(&mut self, id: SessionId) -> CloseOutcome {
        let Some(session) = self.registry.get(id) else {
            return CloseOutcome::Ignored;
        };
        if session.status != SessionStatus::Working {
            self.close_session(id);
            return CloseOutcome::Closed(id);
        }
        let request = ConfirmRequest::CloseWorkingSession {
            id,
            label: session.label.clone(),
        };
        match self.raise(request) {
            StartOutcome::NeedsConfirmation(popup) => CloseOutcome::NeedsConfirmation(popup),
            StartOutcome::Created(_) | StartOutcome::Failed(_) => CloseOutcome::Ignored,
        }
    }

    pub async fn resolve_confirmation(
        &mut self,
        popup_id: PopupId,
        action: ActionId,
    ) -> ConfirmationOutcome {
        let resolution = self.confirmations.resolve(popup_id, action);
        debug!(popup = %popup_id, action = action.as_str(), ?resolution, "confirmation answered");

        let (request, action) = match resolution {
            Resolution::Stale | Resolution::Rejected => return ConfirmationOutcome::Ignored,
            Resolution::Cancelled(request) => {
                info!(kind = request.kind(), "confirmation cancelled");
                return ConfirmationOutcome::Cancelled;
            }
            Resolution::Accepted { request, action } => (request, action),
        };

        match (request, action) {
            (ConfirmRequest::DuplicateSession { existing, .. }, ActionId::Switch) => {
                if self.switch_session(existing) {
                    ConfirmationOutcome::Switched(existing)
                } else {
                    ConfirmationOutcome::Ignored
                }
            }
            (
                ConfirmRequest::DuplicateSession {
                    work_area, prompt, ..
                },
                ActionId::StartAnyway,
            ) => {
                self.finish_create(work_area, prompt, WorkAreaPolicy::Shared)
                    .await
            }
            (
                ConfirmRequest::CreateWorktree {
                    work_area,
                    vcs_root,
                    prompt,
                },
                ActionId::CreateWorktree,
            ) => {
                if let Err(source) = self.git.add_worktree(&vcs_root, &work_area).await {
                    warn!(work_area = %work_area.display(), %source, "worktree creation failed");
                    return ConfirmationOutcome::Failed(OrchestratorError::WorktreeCreation {
                        path: work_area.display().to_string(),
                        source,
                    });
                }
                self.finish_create(work_area, prompt, WorkAreaPolicy::Exclusive)
                    .await
            }
            (
                ConfirmRequest::CreateWorktree {
                    work_area, prompt, ..
                }
                | ConfirmRequest::CreateDirectory { work_area, prompt },
                ActionId::CreateDirectory,
            ) => {
                if let Err(source) = create_directory(&work_area) {
                    warn!(work_area = %work_area.display(), %source, "directory creation failed");
                    return ConfirmationOutcome::Failed(OrchestratorError::DirectoryCreation {
                        path: work_area.display().to_string(),
                        source,
                    });
                }
                self.finish_create(work_area, prompt, WorkAreaPolicy::Exclusive)
                    .await
            }
            (ConfirmRequest::CloseWorkingSession { id, .. }, ActionId::CloseSession) => {
                if self.close_session(id) {
                    ConfirmationOutcome::Closed(id)
                } else {
                    ConfirmationOutcome::Ignored
                }
            }
            (request, action) => {
                warn!(kind = request.kind(), action = action.as_str(), "unhandled confirmation");
                ConfirmationOutcome::Ignored
            }
        }
    }

    async fn finish_create(
        &mut self,
        work_area: PathBuf,
        prompt: Option<String>,
        policy: WorkAreaPolicy,
    ) -> ConfirmationOutcome {
        match self.create_session(work_area, prompt, None, policy).await {
            Ok(id) => ConfirmationOutcome::Created(id),
            Err(error) => ConfirmationOutcome::Failed(error),
        }
    }

    /// Applies one poller sweep. Reports for sessions closed in the meantime
    /// are dropped.
    pub fn apply_sweep(&mut self, reports: Vec<SweepReport>) -> bool {
        let now = SystemTime::now();
        let mut changed = false;
        for report in reports {
            if !self.registry.contains(report.id) {
                debug!(session = %report.id, "dropping sweep for closed session");
                continue;
            }
            changed |= self.registry.apply_changes(report.id, report.changes, now);
        }
        if changed {
            self.publish();
        }
        changed
    }

    /// Fresh change set and per-file diffs for one session.
    pub async fn build_review(&self, id: SessionId) -> Option<ReviewView> {
        let session = self.registry.get(id)?;
        let work_area = session.work_area.clone();
        let title = match &session.branch {
            Some(branch) => format!("{} ({branch})", session.label),
            None => session.label.clone(),
        };

        let changes = self.git.changes(&work_area).await;
        let mut files = Vec::with_capacity(changes.len());
        for change in &changes {
            let diff = self.git.file_diff(&work_area, change).await.unwrap_or_default();
            files.push(ReviewFile::from_diff(change, &diff, self.settings.review_line_cap));
        }
        Some(ReviewView {
            session_id: id,
            title,
            files,
        })
    }

    pub fn work_area_of(&self, id: SessionId) -> Option<PathBuf> {
        self.registry.get(id).map(|session| session.work_area.clone())
    }

    pub fn send_input(&mut self, bytes: &[u8]) {
        if let Err(error) = self.terminals.send_to_visible(bytes) {
            debug!(%error, "terminal input dropped");
        }
    }

    /// Stops background tasks and kills every session terminal.
    pub fn shutdown(&mut self) {
        let _ = self.shutdown.send(true);
        let ids: Vec<_> = self.registry.order().to_vec();
        for id in ids {
            self.close_session(id);
        }
        info!("orchestrator shut down");
    }

    fn show_active(&mut self) {
        let handle = self.registry.active().and_then(|session| session.terminal);
        self.terminals.show(handle);
    }

    fn publish(&self) {
        let targets = self.registry.poll_targets();
        self.poll_targets.send_if_modified(|current| {
            if *current == targets {
                return false;
            }
            *current = targets;
            true
        });
        let folders = self.registry.work_areas();
        self.workspace.send_if_modified(|current| {
            if *current == folders {
                return false;
            }
            *current = folders;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::terminal_bridge::testing::FakeTerminals;
    use crate::domain::{ChangeKind, FileChange};
    use crate::infra::testing::{ScriptedRunner, failed, ok};

    type TestOrchestrator = Orchestrator<ScriptedRunner, FakeTerminals>;

    fn orchestrator(runner: ScriptedRunner, cwd: &Path) -> TestOrchestrator {
        Orchestrator::new(
            GitCli::new(runner, "git"),
            FakeTerminals::default(),
            OrchestratorSettings {
                agent: AgentConfig::default(),
                cwd: cwd.to_path_buf(),
                review_line_cap: 50,
            },
        )
    }

    fn assert_consistent(orchestrator: &TestOrchestrator) {
        orchestrator.registry().check_invariants().expect("invariants");
        let mut areas: Vec<_> = orchestrator
            .registry()
            .iter()
            .map(|session| session.work_area.clone())
            .collect();
        let before = areas.len();
        areas.sort();
        areas.dedup();
        assert_eq!(areas.len(), before);
    }

    #[tokio::test]
    async fn existing_directory_creates_session_with_terminal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedRunner::new().on("--abbrev-ref", ok("feature/x\n"));
        let mut orch = orchestrator(runner, dir.path());

        let StartOutcome::Created(id) = orch
            .start_session(dir.path().to_path_buf(), Some("fix tests".to_string()))
            .await
        else {
            panic!("expected session");
        };

        let session = orch.registry().get(id).expect("session");
        assert_eq!(session.branch.as_deref(), Some("feature/x"));
        assert_eq!(session.status, SessionStatus::Working);
        assert!(session.terminal.is_some());
        assert_eq!(orch.registry().active_id(), Some(id));
        assert_eq!(orch.terminals().visible(), session.terminal);

        let spec = &orch.terminals().provider().created[0];
        assert_eq!(spec.program, "claude");
        assert_eq!(spec.args, vec!["fix tests".to_string()]);
        assert_eq!(spec.cwd, dir.path());
        assert_eq!(*orch.subscribe_workspace().borrow(), vec![dir.path().to_path_buf()]);
    }

    #[tokio::test]
    async fn duplicate_work_area_offers_switch_or_start_anyway() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut orch = orchestrator(ScriptedRunner::new(), dir.path());
        let StartOutcome::Created(first) = orch.start_session(dir.path().to_path_buf(), None).await
        else {
            panic!("expected session");
        };
        let other = tempfile::tempdir().expect("tempdir");
        let StartOutcome::Created(second) = orch.start_session(other.path().to_path_buf(), None).await
        else {
            panic!("expected session");
        };
        orch.switch_session(second);

        let StartOutcome::NeedsConfirmation(popup) =
            orch.start_session(dir.path().to_path_buf(), None).await
        else {
            panic!("expected duplicate confirmation");
        };
        assert!(popup.offers(ActionId::Switch));
        assert!(popup.offers(ActionId::StartAnyway));

        let outcome = orch.resolve_confirmation(popup.id, ActionId::Switch).await;
        assert!(matches!(outcome, ConfirmationOutcome::Switched(id) if id == first));
        assert_eq!(orch.registry().active_id(), Some(first));
        assert_eq!(orch.registry().len(), 2);

        let StartOutcome::NeedsConfirmation(popup) =
            orch.start_session(dir.path().to_path_buf(), None).await
        else {
            panic!("expected duplicate confirmation");
        };
        let outcome = orch.resolve_confirmation(popup.id, ActionId::StartAnyway).await;
        let ConfirmationOutcome::Created(third) = outcome else {
            panic!("expected second session on the same work area");
        };
        assert_ne!(third, first);
        assert_eq!(orch.registry().len(), 3);
        assert_eq!(orch.registry().get(third).map(|s| s.work_area.clone()), Some(dir.path().to_path_buf()));
        orch.registry().check_invariants().expect("invariants");
    }

    #[tokio::test]
    async fn cancelled_worktree_confirmation_changes_nothing() {
        let cwd = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedRunner::new().on("--show-toplevel", ok("/src/repo\n"));
        let mut orch = orchestrator(runner.clone(), cwd.path());
        let target = cwd.path().join("repo-wt");

        let StartOutcome::NeedsConfirmation(popup) = orch.start_session(target.clone(), None).await
        else {
            panic!("expected worktree confirmation");
        };
        assert!(popup.offers(ActionId::CreateWorktree));

        let outcome = orch.resolve_confirmation(popup.id, ActionId::Cancel).await;
        assert!(matches!(outcome, ConfirmationOutcome::Cancelled));
        assert!(orch.registry().is_empty());
        assert!(orch.pending_popup().is_none());
        assert!(!target.exists());
        assert_eq!(runner.calls_with("worktree"), 0);
    }

    #[tokio::test]
    async fn confirmed_worktree_runs_git_then_creates_session() {
        let cwd = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedRunner::new()
            .on("--show-toplevel", ok("/src/repo\n"))
            .on("worktree", ok("Preparing worktree\n"));
        let mut orch = orchestrator(runner.clone(), cwd.path());
        let target = cwd.path().join("repo-wt");

        let StartOutcome::NeedsConfirmation(popup) = orch.start_session(target.clone(), None).await
        else {
            panic!("expected worktree confirmation");
        };
        let outcome = orch.resolve_confirmation(popup.id, ActionId::CreateWorktree).await;
        let ConfirmationOutcome::Created(id) = outcome else {
            panic!("expected session");
        };
        assert_eq!(orch.work_area_of(id), Some(target.clone()));
        let worktree_call = runner
            .calls()
            .into_iter()
            .find(|args| args.iter().any(|arg| arg == "worktree"))
            .expect("worktree call");
        assert!(worktree_call.contains(&target.display().to_string()));
    }

    #[tokio::test]
    async fn failed_worktree_reports_error_without_session() {
        let cwd = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedRunner::new()
            .on("--show-toplevel", ok("/src/repo\n"))
            .on("worktree", failed(128, "fatal: invalid reference"));
        let mut orch = orchestrator(runner, cwd.path());

        let StartOutcome::NeedsConfirmation(popup) =
            orch.start_session(cwd.path().join("wt"), None).await
        else {
            panic!("expected worktree confirmation");
        };
        let outcome = orch.resolve_confirmation(popup.id, ActionId::CreateWorktree).await;
        assert!(matches!(
            outcome,
            ConfirmationOutcome::Failed(OrchestratorError::WorktreeCreation { .. })
        ));
        assert!(orch.registry().is_empty());
        assert!(orch.pending_popup().is_none());
    }

    #[tokio::test]
    async fn directory_confirmation_creates_directory() {
        let cwd = tempfile::tempdir().expect("tempdir");
        let mut orch = orchestrator(ScriptedRunner::new(), cwd.path());
        let target = cwd.path().join("scratch/area");

        let StartOutcome::NeedsConfirmation(popup) = orch.start_session(target.clone(), None).await
        else {
            panic!("expected directory confirmation");
        };
        assert!(!popup.offers(ActionId::CreateWorktree));

        let stale = orch.resolve_confirmation(PopupId(popup.id.0 + 100), ActionId::CreateDirectory).await;
        assert!(matches!(stale, ConfirmationOutcome::Ignored));
        let unoffered = orch.resolve_confirmation(popup.id, ActionId::Switch).await;
        assert!(matches!(unoffered, ConfirmationOutcome::Ignored));
        assert!(orch.pending_popup().is_some());

        let outcome = orch.resolve_confirmation(popup.id, ActionId::CreateDirectory).await;
        assert!(matches!(outcome, ConfirmationOutcome::Created(_)));
        assert!(target.is_dir());
    }

    #[tokio::test]
    async fn terminal_failure_rolls_back_registration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut fake = FakeTerminals::default();
        fake.fail_next = true;
        let mut orch = Orchestrator::new(
            GitCli::new(ScriptedRunner::new(), "git"),
            fake,
            OrchestratorSettings {
                agent: AgentConfig::default(),
                cwd: dir.path().to_path_buf(),
                review_line_cap: 50,
            },
        );

        let outcome = orch.start_session(dir.path().to_path_buf(), None).await;
        assert!(matches!(
            outcome,
            StartOutcome::Failed(OrchestratorError::Terminal(_))
        ));
        assert!(orch.registry().is_empty());
        assert_eq!(orch.registry().active_id(), None);

        let retry = orch.start_session(dir.path().to_path_buf(), None).await;
        assert!(matches!(retry, StartOutcome::Created(_)));
    }

    #[tokio::test]
    async fn closing_working_session_requires_confirmation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut orch = orchestrator(ScriptedRunner::new(), dir.path());
        let StartOutcome::Created(id) = orch.start_session(dir.path().to_path_buf(), None).await
        else {
            panic!("expected session");
        };

        let CloseOutcome::NeedsConfirmation(popup) = orch.request_close(id) else {
            panic!("expected close confirmation");
        };
        assert!(matches!(
            orch.resolve_confirmation(popup.id, ActionId::Cancel).await,
            ConfirmationOutcome::Cancelled
        ));
        assert!(orch.registry().contains(id));

        let CloseOutcome::NeedsConfirmation(popup) = orch.request_close(id) else {
            panic!("expected close confirmation");
        };
        let outcome = orch.resolve_confirmation(popup.id, ActionId::CloseSession).await;
        assert!(matches!(outcome, ConfirmationOutcome::Closed(closed) if closed == id));
        assert!(orch.registry().is_empty());
        assert_eq!(orch.terminals().visible(), None);
        assert_eq!(orch.terminals().provider().closed.len(), 1);

        assert!(matches!(orch.request_close(id), CloseOutcome::Ignored));
        assert!(!orch.close_session(id));
    }

    #[tokio::test]
    async fn closing_active_session_shows_neighbour() {
        let mut orch = orchestrator(ScriptedRunner::new(), Path::new("/"));
        let dirs: Vec<_> = (0..3).map(|_| tempfile::tempdir().expect("tempdir")).collect();
        let mut ids = Vec::new();
        for dir in &dirs {
            let StartOutcome::Created(id) = orch.start_session(dir.path().to_path_buf(), None).await
            else {
                panic!("expected session");
            };
            ids.push(id);
            assert_consistent(&orch);
        }

        orch.switch_session(ids[1]);
        assert!(orch.close_session(ids[1]));
        assert_eq!(orch.registry().active_id(), Some(ids[2]));
        let expected = orch.registry().get(ids[2]).and_then(|s| s.terminal);
        assert_eq!(orch.terminals().visible(), expected);
        assert_consistent(&orch);

        assert!(orch.close_session(ids[2]));
        assert_eq!(orch.registry().active_id(), Some(ids[0]));
        assert!(orch.close_session(ids[0]));
        assert_eq!(orch.registry().active_id(), None);
        assert_eq!(orch.terminals().visible(), None);
    }

    #[tokio::test]
    async fn sweep_for_closed_session_is_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut orch = orchestrator(ScriptedRunner::new(), dir.path());
        let StartOutcome::Created(id) = orch.start_session(dir.path().to_path_buf(), None).await
        else {
            panic!("expected session");
        };
        let change = FileChange {
            path: "src/lib.rs".to_string(),
            additions: 3,
            deletions: 0,
            kind: ChangeKind::Modified,
        };

        assert!(orch.apply_sweep(vec![SweepReport {
            id,
            changes: vec![change.clone()],
        }]));
        assert!(!orch.apply_sweep(vec![SweepReport {
            id,
            changes: vec![change.clone()],
        }]));

        orch.close_session(id);
        assert!(!orch.apply_sweep(vec![SweepReport {
            id,
            changes: vec![change],
        }]));
        assert!(orch.registry().get(id).is_none());
        assert!(orch.subscribe_poll_targets().borrow().is_empty());
    }

    #[tokio::test]
    async fn review_fetches_fresh_diffs() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("lib.rs"), "fn new() {}\n").expect("write");
        let runner = ScriptedRunner::new()
            .on("--numstat", ok("1\t1\tlib.rs\n"))
            .on("diff", ok("--- a/lib.rs\n+++ b/lib.rs\n@@ -1 +1 @@\n-fn old() {}\n+fn new() {}\n"));
        let mut orch = orchestrator(runner, dir.path());
        let StartOutcome::Created(id) = orch.start_session(dir.path().to_path_buf(), None).await
        else {
            panic!("expected session");
        };

        let review = orch.build_review(id).await.expect("review");
        assert_eq!(review.files.len(), 1);
        assert_eq!(review.files[0].path, "lib.rs");
        assert_eq!(review.files[0].lines.len(), 3);
        assert!(orch.build_review(SessionId::generate()).await.is_none());
    }

    #[tokio::test]
    async fn shutdown_closes_everything() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut orch = orchestrator(ScriptedRunner::new(), dir.path());
        let shutdown = orch.subscribe_shutdown();
        orch.start_session(dir.path().to_path_buf(), None).await;
        orch.shutdown();
        assert!(*shutdown.borrow());
        assert!(orch.registry().is_empty());
        assert!(orch.terminals().provider().open.is_empty());
    }
}
