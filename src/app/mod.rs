mod form;
mod keys;
mod orchestrator;
mod poller;
mod terminal_bridge;

pub use form::{FormField, FormIntent, SessionForm, TextField};
pub use keys::{key_to_bytes, paste_to_bytes};
pub use orchestrator::{
    CloseOutcome, ConfirmationOutcome, Orchestrator, OrchestratorError, OrchestratorSettings,
    StartOutcome,
};
pub use poller::{SweepReport, run_change_poller};
pub use terminal_bridge::TerminalBridge;

use crate::domain::{
    ActionId, Popup, PopupId, Registry, ReviewView, SessionId, SidebarAction, SidebarInput,
    SidebarIntent, SidebarUiState,
};
use crate::infra::{ProcessRunner, TerminalProvider};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

const REVIEW_PAGE_ROWS: usize = 10;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Focus {
    Sidebar,
    Terminal,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PopupDialog {
    pub popup: Popup,
    pub selected: usize,
}

impl PopupDialog {
    pub fn new(popup: Popup) -> Self {
        Self { popup, selected: 0 }
    }

    fn selected_action(&self) -> Option<ActionId> {
        self.popup.actions.get(self.selected).map(|action| action.id)
    }

    fn move_selection(&mut self, forward: bool) {
        let len = self.popup.actions.len();
        if len == 0 {
            return;
        }
        self.selected = if forward {
            (self.selected + 1) % len
        } else {
            (self.selected + len - 1) % len
        };
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReviewOverlay {
    pub view: ReviewView,
    pub cursor: usize,
}

impl ReviewOverlay {
    pub fn new(view: ReviewView) -> Self {
        Self { view, cursor: 0 }
    }

    fn move_cursor(&mut self, delta: isize) {
        let last = self.view.row_count().saturating_sub(1);
        self.cursor = self.cursor.saturating_add_signed(delta).min(last);
    }
}

#[derive(Clone, Debug)]
pub struct AppModel {
    pub sidebar: SidebarUiState,
    pub focus: Focus,
    pub form: Option<SessionForm>,
    pub popup: Option<PopupDialog>,
    pub review: Option<ReviewOverlay>,
    pub help_open: bool,
    pub notice: Option<String>,
    pub bridge_status: Option<String>,
    pub suggested_work_area: String,
}

impl AppModel {
    pub fn new(suggested_work_area: impl Into<String>) -> Self {
        Self {
            sidebar: SidebarUiState::default(),
            focus: Focus::Sidebar,
            form: None,
            popup: None,
            review: None,
            help_open: false,
            notice: None,
            bridge_status: None,
            suggested_work_area: suggested_work_area.into(),
        }
    }

    /// Re-aligns UI-local state after the registry or the pending
    /// confirmation changed underneath it.
    pub fn sync(&mut self, registry: &Registry, pending: Option<&Popup>) {
        self.sidebar.clamp(registry.len());
        if registry.is_empty() {
            self.focus = Focus::Sidebar;
        }
        match pending {
            Some(popup) => {
                let stale = self
                    .popup
                    .as_ref()
                    .is_none_or(|dialog| dialog.popup.id != popup.id);
                if stale {
                    self.popup = Some(PopupDialog::new(popup.clone()));
                }
            }
            None => self.popup = None,
        }
        if let Some(review) = &self.review {
            if !registry.contains(review.view.session_id) {
                self.review = None;
            }
        }
    }

    pub fn session_switched(&mut self, registry: &Registry, id: SessionId) {
        self.sidebar.select(registry, id);
        self.focus = Focus::Terminal;
    }

    /// A freshly created session takes over the terminal pane, so typed
    /// input reaches its agent rather than the previously active one.
    pub fn session_created<R: ProcessRunner, T: TerminalProvider>(
        &mut self,
        orchestrator: &mut Orchestrator<R, T>,
        id: SessionId,
    ) {
        if !orchestrator.switch_session(id) {
            return;
        }
        self.session_switched(orchestrator.registry(), id);
        self.notice = Some(format!("session {id} started"));
    }

    pub fn open_form(&mut self) {
        self.form = Some(SessionForm::new(&self.suggested_work_area));
    }
}

#[derive(Clone, Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Paste(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AppCommand {
    None,
    Quit,
    StartSession {
        work_area: String,
        prompt: Option<String>,
    },
    RequestClose(SessionId),
    SwitchSession(SessionId),
    OpenReview(SessionId),
    OpenWorkArea(SessionId),
    OpenFile {
        session: SessionId,
        path: String,
    },
    ResolveConfirmation {
        popup: PopupId,
        action: ActionId,
    },
    SendToTerminal(Vec<u8>),
}

pub fn update(model: AppModel, registry: &Registry, event: AppEvent) -> (AppModel, AppCommand) {
    match event {
        AppEvent::Key(key) => update_on_key(model, registry, key),
        AppEvent::Paste(text) => update_on_paste(model, text),
    }
}

fn update_on_key(model: AppModel, registry: &Registry, key: KeyEvent) -> (AppModel, AppCommand) {
    let mut model = model;
    model.notice = None;

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && key.code == KeyCode::Char('q') {
        return (model, AppCommand::Quit);
    }

    if model.popup.is_some() {
        return update_popup(model, key);
    }
    if model.form.is_some() {
        return update_form(model, key);
    }
    if model.review.is_some() {
        return update_review(model, key);
    }
    if model.help_open {
        model.help_open = false;
        return (model, AppCommand::None);
    }

    match key.code {
        KeyCode::F(1) => {
            model.help_open = true;
            return (model, AppCommand::None);
        }
        KeyCode::Char('g') if ctrl => {
            model.sidebar.visible = true;
            model.focus = Focus::Sidebar;
            return (model, AppCommand::None);
        }
        KeyCode::Char('t') if ctrl => {
            model.sidebar.visible = !model.sidebar.visible;
            if !model.sidebar.visible {
                model.focus = Focus::Terminal;
            }
            return (model, AppCommand::None);
        }
        _ => {}
    }

    match model.focus {
        Focus::Sidebar => update_sidebar(model, registry, key),
        Focus::Terminal => {
            let command = key_to_bytes(key).map_or(AppCommand::None, AppCommand::SendToTerminal);
            (model, command)
        }
    }
}

fn update_sidebar(model: AppModel, registry: &Registry, key: KeyEvent) -> (AppModel, AppCommand) {
    let mut model = model;
    let input = match key.code {
        KeyCode::Up | KeyCode::Char('k') => SidebarInput::Up,
        KeyCode::Down | KeyCode::Char('j') => SidebarInput::Down,
        KeyCode::Tab => SidebarInput::CycleAction,
        KeyCode::Esc => SidebarInput::Escape,
        KeyCode::Enter => SidebarInput::Confirm,
        KeyCode::Char('n') => SidebarInput::Trigger(SidebarAction::New),
        KeyCode::Char('x') => SidebarInput::Trigger(SidebarAction::Close),
        KeyCode::Char('r') => SidebarInput::Trigger(SidebarAction::Review),
        KeyCode::Char('o') => SidebarInput::Trigger(SidebarAction::Open),
        _ => return (model, AppCommand::None),
    };

    let command = match model.sidebar.handle(registry, input) {
        SidebarIntent::None => AppCommand::None,
        SidebarIntent::NewSession => {
            model.open_form();
            AppCommand::None
        }
        SidebarIntent::Close(id) => AppCommand::RequestClose(id),
        SidebarIntent::Review(id) => AppCommand::OpenReview(id),
        SidebarIntent::Open(id) => AppCommand::OpenWorkArea(id),
        SidebarIntent::Switch(id) => AppCommand::SwitchSession(id),
        SidebarIntent::Blur => {
            if registry.active_id().is_some() {
                model.focus = Focus::Terminal;
            }
            AppCommand::None
        }
    };
    (model, command)
}

fn update_popup(model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    let mut model = model;
    let Some(dialog) = model.popup.as_mut() else {
        return (model, AppCommand::None);
    };

    let action = match key.code {
        KeyCode::Left | KeyCode::BackTab => {
            dialog.move_selection(false);
            None
        }
        KeyCode::Right | KeyCode::Tab => {
            dialog.move_selection(true);
            None
        }
        KeyCode::Enter => dialog.selected_action(),
        KeyCode::Esc => dialog
            .popup
            .offers(ActionId::Cancel)
            .then_some(ActionId::Cancel),
        KeyCode::Char(ch) => dialog.popup.action_for_hotkey(ch),
        _ => None,
    };

    let Some(action) = action else {
        return (model, AppCommand::None);
    };
    let popup = dialog.popup.id;
    model.popup = None;
    (model, AppCommand::ResolveConfirmation { popup, action })
}

fn update_form(model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    let mut model = model;
    let Some(form) = model.form.as_mut() else {
        return (model, AppCommand::None);
    };

    match form.handle_key(key) {
        FormIntent::None => (model, AppCommand::None),
        FormIntent::Cancel => {
            model.form = None;
            (model, AppCommand::None)
        }
        FormIntent::Submit { work_area, prompt } => {
            model.form = None;
            (model, AppCommand::StartSession { work_area, prompt })
        }
    }
}

fn update_review(model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    let mut model = model;
    let Some(review) = model.review.as_mut() else {
        return (model, AppCommand::None);
    };

    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => {
            model.review = None;
        }
        KeyCode::Up | KeyCode::Char('k') => review.move_cursor(-1),
        KeyCode::Down | KeyCode::Char('j') => review.move_cursor(1),
        KeyCode::PageUp => review.move_cursor(-(REVIEW_PAGE_ROWS as isize)),
        KeyCode::PageDown => review.move_cursor(REVIEW_PAGE_ROWS as isize),
        KeyCode::Home => review.cursor = 0,
        KeyCode::End => review.move_cursor(isize::MAX),
        KeyCode::Enter | KeyCode::Char('o') => {
            if let Some(file) = review.view.file_at_row(review.cursor) {
                let command = AppCommand::OpenFile {
                    session: review.view.session_id,
                    path: file.path.clone(),
                };
                return (model, command);
            }
        }
        _ => {}
    }
    (model, AppCommand::None)
}

fn update_on_paste(model: AppModel, text: String) -> (AppModel, AppCommand) {
    let mut model = model;
    if model.popup.is_some() || model.review.is_some() || model.help_open {
        return (model, AppCommand::None);
    }
    if let Some(form) = model.form.as_mut() {
        form.paste(&text);
        return (model, AppCommand::None);
    }
    match model.focus {
        Focus::Terminal => (model, AppCommand::SendToTerminal(paste_to_bytes(&text))),
        Focus::Sidebar => (model, AppCommand::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ChangeKind, ConfirmRequest, ConfirmationEngine, FileChange, ReviewFile, Session,
        WorkAreaPolicy,
    };
    use std::path::PathBuf;

    fn press(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(ch: char) -> AppEvent {
        AppEvent::Key(KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL))
    }

    fn registry_with(count: usize) -> (Registry, Vec<SessionId>) {
        let mut registry = Registry::new();
        let ids = (0..count)
            .map(|index| {
                let session = Session::new(PathBuf::from(format!("/w/{index}")), None, None, None);
                registry
                    .insert(session, WorkAreaPolicy::Exclusive)
                    .expect("insert")
            })
            .collect();
        (registry, ids)
    }

    fn run(model: AppModel, registry: &Registry, events: Vec<AppEvent>) -> (AppModel, AppCommand) {
        let mut model = model;
        let mut command = AppCommand::None;
        for event in events {
            (model, command) = update(model, registry, event);
        }
        (model, command)
    }

    #[test]
    fn ctrl_q_quits_from_anywhere() {
        let (registry, _) = registry_with(0);
        let mut model = AppModel::new("/w/repo-wt");
        model.open_form();
        let (_, command) = update(model, &registry, ctrl('q'));
        assert_eq!(command, AppCommand::Quit);
    }

    #[test]
    fn enter_on_list_switches_and_hands_focus_over() {
        let (registry, ids) = registry_with(3);
        let model = AppModel::new("");
        let (model, command) = run(
            model,
            &registry,
            vec![press(KeyCode::Down), press(KeyCode::Enter)],
        );
        assert_eq!(command, AppCommand::SwitchSession(ids[1]));

        let mut model = model;
        model.session_switched(&registry, ids[1]);
        assert_eq!(model.focus, Focus::Terminal);

        let (_, command) = update(model, &registry, ctrl('c'));
        assert_eq!(command, AppCommand::SendToTerminal(vec![0x03]));
    }

    #[test]
    fn action_shortcuts_target_selected_session() {
        let (registry, ids) = registry_with(2);
        let model = AppModel::new("");
        let (model, command) = run(
            model,
            &registry,
            vec![press(KeyCode::Down), press(KeyCode::Char('x'))],
        );
        assert_eq!(command, AppCommand::RequestClose(ids[1]));
        let (model, command) = update(model, &registry, press(KeyCode::Char('r')));
        assert_eq!(command, AppCommand::OpenReview(ids[1]));
        let (_, command) = update(model, &registry, press(KeyCode::Char('o')));
        assert_eq!(command, AppCommand::OpenWorkArea(ids[1]));
    }

    #[test]
    fn new_action_opens_form_and_submit_starts_session() {
        let (registry, _) = registry_with(0);
        let model = AppModel::new("/w/repo-wt");
        let (model, command) = run(
            model,
            &registry,
            vec![press(KeyCode::Down), press(KeyCode::Enter)],
        );
        assert_eq!(command, AppCommand::None);
        assert!(model.form.is_some());

        let (model, command) = update(model, &registry, press(KeyCode::Enter));
        assert!(model.form.is_none());
        assert_eq!(
            command,
            AppCommand::StartSession {
                work_area: "/w/repo-wt".to_string(),
                prompt: None,
            }
        );
    }

    #[test]
    fn escape_on_list_blurs_only_with_a_session() {
        let (empty, _) = registry_with(0);
        let (model, _) = update(AppModel::new(""), &empty, press(KeyCode::Esc));
        assert_eq!(model.focus, Focus::Sidebar);

        let (mut registry, ids) = registry_with(1);
        registry.set_active(ids[0]);
        let (model, _) = update(AppModel::new(""), &registry, press(KeyCode::Esc));
        assert_eq!(model.focus, Focus::Terminal);

        let (model, _) = update(model, &registry, ctrl('g'));
        assert_eq!(model.focus, Focus::Sidebar);
        let (model, _) = update(model, &registry, ctrl('t'));
        assert!(!model.sidebar.visible);
        assert_eq!(model.focus, Focus::Terminal);
    }

    #[test]
    fn popup_keys_resolve_offered_actions_only() {
        let (registry, ids) = registry_with(1);
        let mut engine = ConfirmationEngine::new();
        let popup = engine
            .ask(ConfirmRequest::DuplicateSession {
                work_area: PathBuf::from("/w/0"),
                existing: ids[0],
                prompt: None,
            })
            .expect("ask");

        let mut model = AppModel::new("");
        model.sync(&registry, Some(&popup));
        let (model, command) = update(model, &registry, press(KeyCode::Char('w')));
        assert_eq!(command, AppCommand::None);
        assert!(model.popup.is_some());

        let (model, command) = run(
            model,
            &registry,
            vec![press(KeyCode::Right), press(KeyCode::Enter)],
        );
        assert_eq!(
            command,
            AppCommand::ResolveConfirmation {
                popup: popup.id,
                action: popup.actions[1].id,
            }
        );
        assert!(model.popup.is_none());

        let mut model = model;
        model.sync(&registry, Some(&popup));
        let (_, command) = update(model, &registry, press(KeyCode::Esc));
        assert_eq!(
            command,
            AppCommand::ResolveConfirmation {
                popup: popup.id,
                action: ActionId::Cancel,
            }
        );
    }

    #[test]
    fn review_enter_opens_file_under_cursor() {
        let (registry, ids) = registry_with(1);
        let change = |path: &str| FileChange {
            path: path.to_string(),
            additions: 1,
            deletions: 0,
            kind: ChangeKind::Modified,
        };
        let view = ReviewView {
            session_id: ids[0],
            title: "0".to_string(),
            files: vec![
                ReviewFile::from_diff(&change("a.rs"), "@@ -1 +1 @@\n+a\n", 10),
                ReviewFile::from_diff(&change("b.rs"), "@@ -1 +1 @@\n+b\n", 10),
            ],
        };
        let mut model = AppModel::new("");
        model.review = Some(ReviewOverlay::new(view));

        let (model, command) = run(
            model,
            &registry,
            vec![press(KeyCode::PageDown), press(KeyCode::Enter)],
        );
        assert_eq!(
            command,
            AppCommand::OpenFile {
                session: ids[0],
                path: "b.rs".to_string(),
            }
        );
        let (model, _) = update(model, &registry, press(KeyCode::Esc));
        assert!(model.review.is_none());
    }

    #[test]
    fn sync_drops_review_of_closed_session_and_clamps_selection() {
        let (mut registry, ids) = registry_with(2);
        let mut model = AppModel::new("");
        model.sidebar.selected_index = 1;
        model.review = Some(ReviewOverlay::new(ReviewView {
            session_id: ids[1],
            title: String::new(),
            files: Vec::new(),
        }));

        registry.remove(ids[1]);
        model.sync(&registry, None);
        assert!(model.review.is_none());
        assert_eq!(model.sidebar.selected_index, 0);
    }

    #[test]
    fn paste_goes_to_form_or_terminal() {
        let (registry, _) = registry_with(1);
        let mut model = AppModel::new("");
        model.open_form();
        let (model, command) = update(model, &registry, AppEvent::Paste("/tmp/x".to_string()));
        assert_eq!(command, AppCommand::None);
        assert_eq!(model.form.as_ref().map(|f| f.work_area.text.as_str()), Some("/tmp/x"));

        let mut model = model;
        model.form = None;
        model.focus = Focus::Terminal;
        let (_, command) = update(model, &registry, AppEvent::Paste("hi".to_string()));
        assert_eq!(command, AppCommand::SendToTerminal(b"\x1b[200~hi\x1b[201~".to_vec()));
    }

    #[tokio::test]
    async fn created_session_receives_terminal_input() {
        use super::terminal_bridge::testing::FakeTerminals;
        use crate::infra::testing::ScriptedRunner;
        use crate::infra::{AgentConfig, GitCli};

        let first_dir = tempfile::tempdir().expect("tempdir");
        let second_dir = tempfile::tempdir().expect("tempdir");
        let mut orchestrator = Orchestrator::new(
            GitCli::new(ScriptedRunner::new(), "git"),
            FakeTerminals::default(),
            OrchestratorSettings {
                agent: AgentConfig::default(),
                cwd: first_dir.path().to_path_buf(),
                review_line_cap: 50,
            },
        );
        let mut model = AppModel::new("/w/repo-wt");

        for dir in [&first_dir, &second_dir] {
            let StartOutcome::Created(id) =
                orchestrator.start_session(dir.path().to_path_buf(), None).await
            else {
                panic!("expected session");
            };
            model.session_created(&mut orchestrator, id);
            model.sync(orchestrator.registry(), orchestrator.pending_popup());
        }

        let second = orchestrator.registry().order()[1];
        assert_eq!(orchestrator.registry().active_id(), Some(second));
        assert_eq!(model.focus, Focus::Terminal);
        assert_eq!(model.sidebar.selected_index, 1);

        let (_, command) = update(model, orchestrator.registry(), press(KeyCode::Char('y')));
        let AppCommand::SendToTerminal(bytes) = command else {
            panic!("expected terminal input");
        };
        orchestrator.send_input(&bytes);

        let second_terminal = orchestrator
            .registry()
            .get(second)
            .and_then(|session| session.terminal)
            .expect("terminal");
        let sent = &orchestrator.terminals().provider().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent.get(&second_terminal).map(Vec::as_slice), Some(&b"y"[..]));
    }
}
