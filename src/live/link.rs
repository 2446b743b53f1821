//! Holds at most one live session at a time.

use crate::live::session::{SessionHandle, SessionStatus};
use tracing::debug;

/// Open/close control for the live dialogue of one UI instance.
///
/// A new session is only spawned after the previous one has fully torn down,
/// so hardware and connection are never held twice.
#[derive(Default)]
pub struct LiveLink {
    current: Option<SessionHandle>,
}

impl LiveLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any running session with the one `spawn` starts.
    pub async fn open<F>(&mut self, spawn: F)
    where
        F: FnOnce() -> SessionHandle,
    {
        self.close().await;
        self.current = Some(spawn());
    }

    /// Stop the current session and wait for its teardown. No-op when idle.
    pub async fn close(&mut self) {
        if let Some(mut handle) = self.current.take() {
            debug!(status = %handle.status(), "closing live session");
            handle.stop();
            handle.join().await;
        }
    }

    /// Open when idle, close when live. Returns whether a session is now live.
    pub async fn toggle<F>(&mut self, spawn: F) -> bool
    where
        F: FnOnce() -> SessionHandle,
    {
        if self.is_live() {
            self.close().await;
            false
        } else {
            self.open(spawn).await;
            true
        }
    }

    /// Whether a non-terminal session is held.
    pub fn is_live(&self) -> bool {
        self.current.as_ref().is_some_and(SessionHandle::is_live)
    }

    /// Status of the held session, `Idle` when there is none.
    pub fn status(&self) -> SessionStatus {
        self.current
            .as_ref()
            .map(SessionHandle::status)
            .unwrap_or_default()
    }

    pub fn handle(&self) -> Option<&SessionHandle> {
        self.current.as_ref()
    }
}
