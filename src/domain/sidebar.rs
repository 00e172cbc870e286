use crate::domain::{Registry, SessionId, change_totals};

pub const FILE_ROWS_PER_SESSION: usize = 6;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SidebarAction {
    New,
    Close,
    Review,
    Open,
}

impl SidebarAction {
    pub const ALL: [SidebarAction; 4] = [Self::New, Self::Close, Self::Review, Self::Open];

    pub fn label(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Close => "Close",
            Self::Review => "Review",
            Self::Open => "Open",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::New => 0,
            Self::Close => 1,
            Self::Review => 2,
            Self::Open => 3,
        }
    }

    fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SidebarInput {
    Up,
    Down,
    CycleAction,
    Escape,
    Confirm,
    Trigger(SidebarAction),
}

/// What the sidebar asks the orchestrator to do. The sidebar never mutates
/// the registry itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SidebarIntent {
    None,
    NewSession,
    Close(SessionId),
    Review(SessionId),
    Open(SessionId),
    Switch(SessionId),
    Blur,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SidebarUiState {
    pub selected_index: usize,
    pub focused_action: Option<SidebarAction>,
    pub visible: bool,
}

impl Default for SidebarUiState {
    fn default() -> Self {
        Self {
            selected_index: 0,
            focused_action: None,
            visible: true,
        }
    }
}

impl SidebarUiState {
    pub fn handle(&mut self, registry: &Registry, input: SidebarInput) -> SidebarIntent {
        let len = registry.len();
        self.clamp(len);

        match input {
            SidebarInput::Up => {
                match self.focused_action {
                    Some(_) => self.focused_action = None,
                    None => self.selected_index = self.selected_index.saturating_sub(1),
                }
                SidebarIntent::None
            }
            SidebarInput::Down => {
                if self.focused_action.is_none() {
                    if len == 0 || self.selected_index + 1 >= len {
                        self.focused_action = Some(SidebarAction::New);
                    } else {
                        self.selected_index += 1;
                    }
                }
                SidebarIntent::None
            }
            SidebarInput::CycleAction => {
                self.focused_action = Some(match self.focused_action {
                    Some(action) => action.next(),
                    None => SidebarAction::New,
                });
                SidebarIntent::None
            }
            SidebarInput::Escape => {
                if self.focused_action.take().is_some() {
                    SidebarIntent::None
                } else {
                    SidebarIntent::Blur
                }
            }
            SidebarInput::Confirm => match self.focused_action {
                Some(action) => self.trigger(registry, action),
                None => registry
                    .id_at(self.selected_index)
                    .map_or(SidebarIntent::None, SidebarIntent::Switch),
            },
            SidebarInput::Trigger(action) => self.trigger(registry, action),
        }
    }

    pub fn selected_id(&self, registry: &Registry) -> Option<SessionId> {
        let len = registry.len();
        if len == 0 {
            return None;
        }
        registry.id_at(self.selected_index.min(len - 1))
    }

    pub fn select(&mut self, registry: &Registry, id: SessionId) {
        if let Some(position) = registry.position(id) {
            self.selected_index = position;
            self.focused_action = None;
        }
    }

    pub fn clamp(&mut self, len: usize) {
        self.selected_index = self.selected_index.min(len.saturating_sub(1));
    }

    fn trigger(&self, registry: &Registry, action: SidebarAction) -> SidebarIntent {
        if action == SidebarAction::New {
            return SidebarIntent::NewSession;
        }
        let Some(id) = self.selected_id(registry) else {
            return SidebarIntent::None;
        };
        match action {
            SidebarAction::New => SidebarIntent::NewSession,
            SidebarAction::Close => SidebarIntent::Close(id),
            SidebarAction::Review => SidebarIntent::Review(id),
            SidebarAction::Open => SidebarIntent::Open(id),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SidebarRow {
    Header {
        id: SessionId,
        label: String,
        branch: Option<String>,
        status: &'static str,
        additions: u64,
        deletions: u64,
        active: bool,
        selected: bool,
    },
    File {
        symbol: char,
        additions: u32,
        deletions: u32,
        path: String,
    },
    MoreFiles(usize),
    Empty,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SidebarButton {
    pub action: SidebarAction,
    pub label: &'static str,
    pub focused: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SidebarView {
    pub rows: Vec<SidebarRow>,
    pub buttons: Vec<SidebarButton>,
    pub list_focused: bool,
}

pub fn render_sidebar(registry: &Registry, state: &SidebarUiState) -> SidebarView {
    let selected = state.selected_id(registry);
    let active = registry.active_id();
    let mut rows = Vec::new();

    for session in registry.iter() {
        let (additions, deletions) = change_totals(&session.file_changes);
        rows.push(SidebarRow::Header {
            id: session.id,
            label: session.label.clone(),
            branch: session.branch.clone(),
            status: session.status.label(),
            additions,
            deletions,
            active: active == Some(session.id),
            selected: selected == Some(session.id),
        });

        for change in session.file_changes.iter().take(FILE_ROWS_PER_SESSION) {
            rows.push(SidebarRow::File {
                symbol: change.kind.symbol(),
                additions: change.additions,
                deletions: change.deletions,
                path: change.path.clone(),
            });
        }
        let hidden = session
            .file_changes
            .len()
            .saturating_sub(FILE_ROWS_PER_SESSION);
        if hidden > 0 {
            rows.push(SidebarRow::MoreFiles(hidden));
        }
    }

    if rows.is_empty() {
        rows.push(SidebarRow::Empty);
    }

    let buttons = SidebarAction::ALL
        .iter()
        .map(|action| SidebarButton {
            action: *action,
            label: action.label(),
            focused: state.focused_action == Some(*action),
        })
        .collect();

    SidebarView {
        rows,
        buttons,
        list_focused: state.focused_action.is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChangeKind, FileChange, Session, WorkAreaPolicy};
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn registry_with(count: usize) -> (Registry, Vec<SessionId>) {
        let mut registry = Registry::new();
        let ids = (0..count)
            .map(|index| {
                let session = Session::new(PathBuf::from(format!("/w/s{index}")), None, None, None);
                registry
                    .insert(session, WorkAreaPolicy::Exclusive)
                    .expect("insert")
            })
            .collect();
        (registry, ids)
    }

    #[test]
    fn down_past_last_row_focuses_first_action() {
        let (registry, _ids) = registry_with(3);
        let mut state = SidebarUiState {
            selected_index: 2,
            ..SidebarUiState::default()
        };

        assert_eq!(state.handle(&registry, SidebarInput::Down), SidebarIntent::None);
        assert_eq!(state.focused_action, Some(SidebarAction::New));
        assert_eq!(state.selected_index, 2);

        assert_eq!(state.handle(&registry, SidebarInput::Up), SidebarIntent::None);
        assert_eq!(state.focused_action, None);
        assert_eq!(state.selected_index, 2);
    }

    #[test]
    fn down_on_empty_list_focuses_actions() {
        let registry = Registry::new();
        let mut state = SidebarUiState::default();
        state.handle(&registry, SidebarInput::Down);
        assert_eq!(state.focused_action, Some(SidebarAction::New));
        assert_eq!(
            state.handle(&registry, SidebarInput::Confirm),
            SidebarIntent::NewSession
        );
    }

    #[test]
    fn cycle_wraps_through_actions() {
        let registry = Registry::new();
        let mut state = SidebarUiState::default();
        let mut seen = Vec::new();
        for _ in 0..5 {
            state.handle(&registry, SidebarInput::CycleAction);
            seen.push(state.focused_action);
        }
        assert_eq!(
            seen,
            vec![
                Some(SidebarAction::New),
                Some(SidebarAction::Close),
                Some(SidebarAction::Review),
                Some(SidebarAction::Open),
                Some(SidebarAction::New),
            ]
        );
    }

    #[test]
    fn confirm_on_list_switches_to_selected() {
        let (registry, ids) = registry_with(2);
        let mut state = SidebarUiState::default();
        state.handle(&registry, SidebarInput::Down);
        assert_eq!(
            state.handle(&registry, SidebarInput::Confirm),
            SidebarIntent::Switch(ids[1])
        );
    }

    #[test]
    fn actions_target_selected_session_or_do_nothing() {
        let (registry, ids) = registry_with(1);
        let mut state = SidebarUiState::default();
        assert_eq!(
            state.handle(&registry, SidebarInput::Trigger(SidebarAction::Close)),
            SidebarIntent::Close(ids[0])
        );

        let empty = Registry::new();
        assert_eq!(
            state.handle(&empty, SidebarInput::Trigger(SidebarAction::Review)),
            SidebarIntent::None
        );
        assert_eq!(state.handle(&empty, SidebarInput::Confirm), SidebarIntent::None);
    }

    #[test]
    fn escape_leaves_actions_then_blurs() {
        let (registry, _ids) = registry_with(1);
        let mut state = SidebarUiState::default();
        state.handle(&registry, SidebarInput::CycleAction);
        assert_eq!(state.handle(&registry, SidebarInput::Escape), SidebarIntent::None);
        assert_eq!(state.focused_action, None);
        assert_eq!(state.handle(&registry, SidebarInput::Escape), SidebarIntent::Blur);
    }

    #[test]
    fn stale_selection_is_clamped_after_close() {
        let (mut registry, ids) = registry_with(3);
        let mut state = SidebarUiState {
            selected_index: 2,
            ..SidebarUiState::default()
        };
        registry.remove(ids[2]).expect("remove");
        assert_eq!(state.selected_id(&registry), Some(ids[1]));
        state.handle(&registry, SidebarInput::Up);
        assert_eq!(state.selected_index, 0);
    }

    #[test]
    fn render_is_pure_and_truncates_file_rows() {
        let (mut registry, ids) = registry_with(2);
        let changes = (0..9)
            .map(|index| FileChange {
                path: format!("src/f{index}.rs"),
                additions: 2,
                deletions: 1,
                kind: ChangeKind::Modified,
            })
            .collect();
        registry.apply_changes(ids[0], changes, SystemTime::now());
        let state = SidebarUiState::default();

        let first = render_sidebar(&registry, &state);
        let second = render_sidebar(&registry, &state);
        assert_eq!(first, second);

        assert!(matches!(
            &first.rows[0],
            SidebarRow::Header { additions: 18, deletions: 9, active: true, selected: true, .. }
        ));
        let file_rows = first
            .rows
            .iter()
            .filter(|row| matches!(row, SidebarRow::File { .. }))
            .count();
        assert_eq!(file_rows, FILE_ROWS_PER_SESSION);
        assert!(first.rows.contains(&SidebarRow::MoreFiles(3)));
        assert_eq!(first.buttons.len(), 4);
        assert!(first.list_focused);
    }

    #[test]
    fn empty_registry_renders_placeholder() {
        let view = render_sidebar(&Registry::new(), &SidebarUiState::default());
        assert_eq!(view.rows, vec![SidebarRow::Empty]);
    }
}
