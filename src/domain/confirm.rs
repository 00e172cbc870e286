use crate::domain::SessionId;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PopupId(pub u64);

impl fmt::Display for PopupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "popup-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ActionId {
    Cancel,
    StartAnyway,
    Switch,
    CreateWorktree,
    CreateDirectory,
    CloseSession,
}

impl ActionId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cancel => "cancel",
            Self::StartAnyway => "start-anyway",
            Self::Switch => "switch",
            Self::CreateWorktree => "create-worktree",
            Self::CreateDirectory => "create-directory",
            Self::CloseSession => "close-session",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "cancel" => Some(Self::Cancel),
            "start-anyway" => Some(Self::StartAnyway),
            "switch" => Some(Self::Switch),
            "create-worktree" => Some(Self::CreateWorktree),
            "create-directory" => Some(Self::CreateDirectory),
            "close-session" => Some(Self::CloseSession),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Cancel => "Cancel",
            Self::StartAnyway => "Start anyway",
            Self::Switch => "Go to existing",
            Self::CreateWorktree => "Worktree",
            Self::CreateDirectory => "Directory",
            Self::CloseSession => "Kill session",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PopupAction {
    pub id: ActionId,
    pub label: &'static str,
}

impl PopupAction {
    fn new(id: ActionId) -> Self {
        Self {
            id,
            label: id.label(),
        }
    }

    pub fn hotkey(&self) -> Option<char> {
        self.label
            .chars()
            .next()
            .map(|ch| ch.to_ascii_lowercase())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Popup {
    pub id: PopupId,
    pub title: String,
    pub message: String,
    pub actions: Vec<PopupAction>,
}

impl Popup {
    pub fn offers(&self, action: ActionId) -> bool {
        self.actions.iter().any(|candidate| candidate.id == action)
    }

    pub fn action_for_hotkey(&self, key: char) -> Option<ActionId> {
        let key = key.to_ascii_lowercase();
        self.actions
            .iter()
            .find(|action| action.hotkey() == Some(key))
            .map(|action| action.id)
    }
}

/// Everything needed to resume a suspended flow once the user answers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfirmRequest {
    DuplicateSession {
        work_area: PathBuf,
        existing: SessionId,
        prompt: Option<String>,
    },
    CreateWorktree {
        work_area: PathBuf,
        vcs_root: PathBuf,
        prompt: Option<String>,
    },
    CreateDirectory {
        work_area: PathBuf,
        prompt: Option<String>,
    },
    CloseWorkingSession {
        id: SessionId,
        label: String,
    },
}

impl ConfirmRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateSession { .. } => "duplicate-session",
            Self::CreateWorktree { .. } => "create-worktree",
            Self::CreateDirectory { .. } => "create-directory",
            Self::CloseWorkingSession { .. } => "close-working-session",
        }
    }

    fn actions(&self) -> Vec<PopupAction> {
        let ids: &[ActionId] = match self {
            Self::DuplicateSession { .. } => {
                &[ActionId::Switch, ActionId::StartAnyway, ActionId::Cancel]
            }
            Self::CreateWorktree { .. } => &[
                ActionId::CreateWorktree,
                ActionId::CreateDirectory,
                ActionId::Cancel,
            ],
            Self::CreateDirectory { .. } => &[ActionId::CreateDirectory, ActionId::Cancel],
            Self::CloseWorkingSession { .. } => &[ActionId::CloseSession, ActionId::Cancel],
        };
        ids.iter().copied().map(PopupAction::new).collect()
    }

    fn title_and_message(&self) -> (String, String) {
        match self {
            Self::DuplicateSession {
                work_area,
                existing,
                ..
            } => (
                "Work area already in use".to_string(),
                format!(
                    "Session {existing} already runs in {}. Switch to it or start a second session there?",
                    work_area.display()
                ),
            ),
            Self::CreateWorktree {
                work_area,
                vcs_root,
                ..
            } => (
                "Create worktree?".to_string(),
                format!(
                    "{} does not exist. Add it as a git worktree of {}?",
                    work_area.display(),
                    vcs_root.display()
                ),
            ),
            Self::CreateDirectory { work_area, .. } => (
                "Create directory?".to_string(),
                format!("{} does not exist. Create it?", work_area.display()),
            ),
            Self::CloseWorkingSession { label, .. } => (
                "Close session?".to_string(),
                format!("{label} is still working. Its terminal will be killed."),
            ),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingConfirmation {
    pub popup: Popup,
    pub request: ConfirmRequest,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfirmError {
    #[error("confirmation {0} is still waiting for an answer")]
    AlreadyPending(PopupId),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Resolution {
    /// No pending confirmation matches the popup id.
    Stale,
    /// The action is unknown or was not offered; the confirmation stays pending.
    Rejected,
    Cancelled(ConfirmRequest),
    Accepted {
        request: ConfirmRequest,
        action: ActionId,
    },
}

#[derive(Debug, Default)]
pub struct ConfirmationEngine {
    pending: Option<PendingConfirmation>,
    next_popup_id: u64,
}

impl ConfirmationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&PendingConfirmation> {
        self.pending.as_ref()
    }

    pub fn ask(&mut self, request: ConfirmRequest) -> Result<Popup, ConfirmError> {
        if let Some(pending) = &self.pending {
            return Err(ConfirmError::AlreadyPending(pending.popup.id));
        }

        self.next_popup_id += 1;
        let (title, message) = request.title_and_message();
        let popup = Popup {
            id: PopupId(self.next_popup_id),
            title,
            message,
            actions: request.actions(),
        };
        self.pending = Some(PendingConfirmation {
            popup: popup.clone(),
            request,
        });
        Ok(popup)
    }

    pub fn resolve(&mut self, popup_id: PopupId, action: ActionId) -> Resolution {
        let Some(pending) = &self.pending else {
            return Resolution::Stale;
        };
        if pending.popup.id != popup_id {
            return Resolution::Stale;
        }
        if !pending.popup.offers(action) {
            return Resolution::Rejected;
        }

        let Some(pending) = self.pending.take() else {
            return Resolution::Stale;
        };
        match action {
            ActionId::Cancel => Resolution::Cancelled(pending.request),
            action => Resolution::Accepted {
                request: pending.request,
                action,
            },
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn worktree_request() -> ConfirmRequest {
        ConfirmRequest::CreateWorktree {
            work_area: PathBuf::from("/src/repo-wt"),
            vcs_root: PathBuf::from("/src/repo"),
            prompt: Some("fix the tests".to_string()),
        }
    }

    #[test]
    fn only_one_confirmation_at_a_time() {
        let mut engine = ConfirmationEngine::new();
        let popup = engine.ask(worktree_request()).expect("first");
        let err = engine
            .ask(ConfirmRequest::CreateDirectory {
                work_area: PathBuf::from("/tmp/x"),
                prompt: None,
            })
            .expect_err("second");
        assert_eq!(err, ConfirmError::AlreadyPending(popup.id));
    }

    #[test]
    fn cancel_clears_pending_exactly_once() {
        let mut engine = ConfirmationEngine::new();
        let popup = engine.ask(worktree_request()).expect("ask");
        assert_eq!(
            engine.resolve(popup.id, ActionId::Cancel),
            Resolution::Cancelled(worktree_request())
        );
        assert!(engine.pending().is_none());
        assert_eq!(engine.resolve(popup.id, ActionId::Cancel), Resolution::Stale);
    }

    #[test]
    fn unoffered_or_unknown_actions_keep_pending() {
        let mut engine = ConfirmationEngine::new();
        let popup = engine.ask(worktree_request()).expect("ask");
        assert_eq!(engine.resolve(popup.id, ActionId::Switch), Resolution::Rejected);
        assert_eq!(ActionId::parse("rm-rf"), None);
        assert!(engine.pending().is_some());

        assert_eq!(
            engine.resolve(
                popup.id,
                ActionId::parse("create-worktree").expect("known action")
            ),
            Resolution::Accepted {
                request: worktree_request(),
                action: ActionId::CreateWorktree,
            }
        );
        assert!(engine.pending().is_none());
    }

    #[test]
    fn stale_popup_id_is_ignored() {
        let mut engine = ConfirmationEngine::new();
        let first = engine.ask(worktree_request()).expect("ask");
        engine.resolve(first.id, ActionId::Cancel);
        let second = engine.ask(worktree_request()).expect("ask again");
        assert_ne!(first.id, second.id);
        assert_eq!(engine.resolve(first.id, ActionId::CreateWorktree), Resolution::Stale);
        assert!(engine.pending().is_some());
    }

    #[test]
    fn action_ids_round_trip_through_strings() {
        for id in [
            ActionId::Cancel,
            ActionId::StartAnyway,
            ActionId::Switch,
            ActionId::CreateWorktree,
            ActionId::CreateDirectory,
            ActionId::CloseSession,
        ] {
            assert_eq!(ActionId::parse(id.as_str()), Some(id));
        }
        assert_eq!(ActionId::parse("Cancel"), None);
    }

    #[test]
    fn popup_hotkeys_are_unique_per_popup() {
        let mut engine = ConfirmationEngine::new();
        let popup = engine
            .ask(ConfirmRequest::DuplicateSession {
                work_area: PathBuf::from("/w"),
                existing: SessionId::generate(),
                prompt: None,
            })
            .expect("ask");
        assert_eq!(popup.action_for_hotkey('g'), Some(ActionId::Switch));
        assert_eq!(popup.action_for_hotkey('S'), Some(ActionId::StartAnyway));
        assert_eq!(popup.action_for_hotkey('c'), Some(ActionId::Cancel));
        assert_eq!(popup.action_for_hotkey('z'), None);
    }
}
