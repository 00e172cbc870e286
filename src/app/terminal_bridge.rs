use crate::domain::TerminalHandle;
use crate::infra::{TerminalError, TerminalProvider, TerminalSnapshot, TerminalSpec};
use tracing::debug;

/// Tracks which session terminal is on screen and routes input to it.
pub struct TerminalBridge<T> {
    provider: T,
    visible: Option<TerminalHandle>,
}

impl<T: TerminalProvider> TerminalBridge<T> {
    pub fn new(provider: T) -> Self {
        Self {
            provider,
            visible: None,
        }
    }

    pub fn provider(&self) -> &T {
        &self.provider
    }

    pub fn visible(&self) -> Option<TerminalHandle> {
        self.visible
    }

    pub async fn create(&mut self, spec: TerminalSpec) -> Result<TerminalHandle, TerminalError> {
        self.provider.create(spec).await
    }

    pub fn show(&mut self, handle: Option<TerminalHandle>) {
        if self.visible != handle {
            debug!(?handle, "visible terminal changed");
        }
        self.visible = handle;
    }

    pub fn close(&mut self, handle: TerminalHandle) {
        if self.visible == Some(handle) {
            self.visible = None;
        }
        self.provider.close(handle);
    }

    /// Sends bytes to the visible terminal. Without one, input is dropped.
    pub fn send_to_visible(&mut self, bytes: &[u8]) -> Result<(), TerminalError> {
        match self.visible {
            Some(handle) => self.provider.send(handle, bytes),
            None => Ok(()),
        }
    }

    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.provider.resize(rows, cols);
    }

    pub fn visible_snapshot(&self) -> Option<TerminalSnapshot> {
        self.visible
            .and_then(|handle| self.provider.snapshot(handle))
    }
}
