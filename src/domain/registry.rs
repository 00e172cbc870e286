use crate::domain::{FileChange, Session, SessionId, SessionStatus, TerminalHandle};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WorkAreaPolicy {
    Exclusive,
    Shared,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum RegistryError {
    #[error("work area already owned by session {0}")]
    WorkAreaOwned(SessionId),
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum RegistryInvariantError {
    #[error("order contains a duplicate id {0}")]
    DuplicateOrderEntry(SessionId),

    #[error("order and session map disagree")]
    OrderMismatch,

    #[error("active session {0} is not registered")]
    DanglingActive(SessionId),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemovedSession {
    pub session: Session,
    pub was_active: bool,
    pub next_active: Option<SessionId>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PollTarget {
    pub id: SessionId,
    pub work_area: PathBuf,
}

#[derive(Clone, Debug, Default)]
pub struct Registry {
    sessions: HashMap<SessionId, Session>,
    order: Vec<SessionId>,
    active: Option<SessionId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn order(&self) -> &[SessionId] {
        &self.order
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.active
    }

    pub fn active(&self) -> Option<&Session> {
        self.active.and_then(|id| self.sessions.get(&id))
    }

    pub fn position(&self, id: SessionId) -> Option<usize> {
        self.order.iter().position(|candidate| *candidate == id)
    }

    pub fn id_at(&self, index: usize) -> Option<SessionId> {
        self.order.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.order.iter().filter_map(|id| self.sessions.get(id))
    }

    pub fn owner_of(&self, work_area: &Path) -> Option<SessionId> {
        self.iter()
            .find(|session| session.work_area == work_area)
            .map(|session| session.id)
    }

    pub fn work_areas(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        self.iter()
            .filter(|session| seen.insert(session.work_area.clone()))
            .map(|session| session.work_area.clone())
            .collect()
    }

    /// Appends a session to the list; the first session becomes active.
    pub fn insert(
        &mut self,
        session: Session,
        policy: WorkAreaPolicy,
    ) -> Result<SessionId, RegistryError> {
        if policy == WorkAreaPolicy::Exclusive {
            if let Some(owner) = self.owner_of(&session.work_area) {
                return Err(RegistryError::WorkAreaOwned(owner));
            }
        }

        let id = session.id;
        self.sessions.insert(id, session);
        self.order.push(id);
        if self.active.is_none() {
            self.active = Some(id);
        }
        Ok(id)
    }

    /// Removes a session. When it was active, the session now occupying the
    /// same list position (or the new last entry) becomes active.
    pub fn remove(&mut self, id: SessionId) -> Option<RemovedSession> {
        let position = self.position(id)?;
        let session = self.sessions.remove(&id)?;
        self.order.remove(position);

        let was_active = self.active == Some(id);
        if was_active {
            self.active = self
                .order
                .get(position)
                .or_else(|| self.order.last())
                .copied();
        }

        Some(RemovedSession {
            session,
            was_active,
            next_active: self.active,
        })
    }

    pub fn set_active(&mut self, id: SessionId) -> bool {
        if !self.sessions.contains_key(&id) {
            return false;
        }
        self.active = Some(id);
        true
    }

    pub fn set_terminal(&mut self, id: SessionId, handle: TerminalHandle) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                session.terminal = Some(handle);
                true
            }
            None => false,
        }
    }

    /// Replaces a session's change set. Returns false when the session is gone
    /// or the set is unchanged.
    pub fn apply_changes(
        &mut self,
        id: SessionId,
        changes: Vec<FileChange>,
        now: SystemTime,
    ) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            return false;
        };
        if session.file_changes == changes {
            return false;
        }
        session.file_changes = changes;
        session.last_activity = now;
        true
    }

    pub fn poll_targets(&self) -> Vec<PollTarget> {
        self.iter()
            .filter(|session| {
                session.status == SessionStatus::Working || !session.file_changes.is_empty()
            })
            .map(|session| PollTarget {
                id: session.id,
                work_area: session.work_area.clone(),
            })
            .collect()
    }

    pub fn check_invariants(&self) -> Result<(), RegistryInvariantError> {
        let mut seen = HashSet::new();
        for id in &self.order {
            if !seen.insert(*id) {
                return Err(RegistryInvariantError::DuplicateOrderEntry(*id));
            }
        }
        if seen.len() != self.sessions.len() || !seen.iter().all(|id| self.sessions.contains_key(id))
        {
            return Err(RegistryInvariantError::OrderMismatch);
        }
        if let Some(active) = self.active {
            if !seen.contains(&active) {
                return Err(RegistryInvariantError::DanglingActive(active));
            }
        }
        Ok(())
    }
}
