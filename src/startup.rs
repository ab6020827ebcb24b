//! Startup state tracking
//!
//! The backend moves `Start -> ProbingFirmware -> Initialized`, or to
//! `Failed` from any non-terminal state. `Failed` is terminal.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StartupState {
    Start,
    ProbingFirmware,
    Initialized,
    Failed,
}

impl StartupState {
    pub fn is_terminal(self) -> bool {
        self == StartupState::Failed
    }
}

/// Why startup failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupFailure {
    /// Permanent: the firmware is too old
    FirmwareIncompatible(String),
    /// Possibly transient: the device could not be reached or misbehaved
    ConnectionLost(String),
}

#[derive(Debug)]
struct Inner {
    state: StartupState,
    failure: Option<StartupFailure>,
}

#[derive(Debug)]
pub struct StartupStateHandler {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl Default for StartupStateHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl StartupStateHandler {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: StartupState::Start,
                failure: None,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // State stays consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> StartupState {
        self.lock().state
    }

    pub fn failure(&self) -> Option<StartupFailure> {
        self.lock().failure.clone()
    }

    /// Move forward to `next`. Returns false when the transition is not
    /// allowed (backwards, or out of `Failed`).
    pub fn advance(&self, next: StartupState) -> bool {
        if next == StartupState::Failed {
            warn!("use fail() to enter the failed state");
            return false;
        }

        let mut inner = self.lock();
        if inner.state.is_terminal() || next <= inner.state {
            debug!(from = ?inner.state, to = ?next, "ignoring startup transition");
            return false;
        }

        debug!(from = ?inner.state, to = ?next, "startup state changed");
        inner.state = next;
        self.changed.notify_all();
        true
    }

    /// Enter the terminal failed state. Returns false if already failed or
    /// initialization had completed.
    pub fn fail(&self, failure: StartupFailure) -> bool {
        let mut inner = self.lock();
        if matches!(inner.state, StartupState::Failed | StartupState::Initialized) {
            return false;
        }

        warn!(from = ?inner.state, reason = ?failure, "startup failed");
        inner.state = StartupState::Failed;
        inner.failure = Some(failure);
        self.changed.notify_all();
        true
    }

    /// Block until `target` (or a later state) is reached, startup fails, or
    /// `timeout` elapses. Returns whether `target` was reached.
    pub fn wait_for_state(&self, target: StartupState, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |inner| {
                inner.state < target && !inner.state.is_terminal()
            })
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        guard.state >= target && (target == StartupState::Failed || !guard.state.is_terminal())
    }
}
