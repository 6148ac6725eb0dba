//! Shared state cells: the speaking gate and the session lifecycle.
//!
//! Both cells are backed by [`tokio::sync::watch`] so readers can either take
//! a snapshot or await a predicate without polling. Every mutation goes through
//! a single read-modify-write on the channel, so concurrent writers never
//! interleave incoherently.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Whether audio output is currently playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Speaking,
}

/// Shared "the assistant is talking" signal.
///
/// Set by the playback sequencer around each payload; read by transcript
/// intake (self-listening suppression) and by reply units waiting for a turn.
#[derive(Debug, Clone)]
pub struct SpeakingGate {
    tx: Arc<watch::Sender<GateState>>,
}

impl Default for SpeakingGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeakingGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(GateState::Idle);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> GateState {
        *self.tx.borrow()
    }

    pub fn is_speaking(&self) -> bool {
        self.state() == GateState::Speaking
    }

    /// Mark output as playing until the returned guard is dropped.
    #[must_use = "the gate returns to idle as soon as the guard is dropped"]
    pub fn begin_speaking(&self) -> SpeakingGuard {
        self.tx.send_replace(GateState::Speaking);
        SpeakingGuard {
            tx: Arc::clone(&self.tx),
        }
    }

    /// Resolve once the gate is idle.
    pub async fn wait_idle(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|s| *s == GateState::Idle).await;
    }
}

/// Clears the speaking gate when dropped, on every exit path.
#[derive(Debug)]
pub struct SpeakingGuard {
    tx: Arc<watch::Sender<GateState>>,
}

impl Drop for SpeakingGuard {
    fn drop(&mut self) {
        self.tx.send_replace(GateState::Idle);
    }
}

/// Lifecycle of the single conversation this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Ending,
    Ended,
}

/// Shared session lifecycle cell.
///
/// Transitions are one-way: `Active -> Ending -> Ended`.
#[derive(Debug, Clone)]
pub struct SessionCell {
    tx: Arc<watch::Sender<SessionState>>,
}

impl Default for SessionCell {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::Active);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> SessionState {
        *self.tx.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Move `Active -> Ending`.
    ///
    /// Returns `true` only for the caller that performed the transition;
    /// repeated calls are no-ops.
    pub fn begin_ending(&self, reason: &str) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            if *state == SessionState::Active {
                *state = SessionState::Ending;
                true
            } else {
                false
            }
        });
        if changed {
            info!("session ending ({reason})");
        } else {
            debug!("session already leaving active state, ignoring ({reason})");
        }
        changed
    }

    /// Move `Ending -> Ended`. Returns `false` from any other state.
    pub fn mark_ended(&self) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            if *state == SessionState::Ending {
                *state = SessionState::Ended;
                true
            } else {
                false
            }
        });
        if changed {
            info!("session ended");
        }
        changed
    }

    /// Resolve once the session has left `Active`.
    pub async fn wait_until_inactive(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|s| *s != SessionState::Active).await;
    }

    /// Observe lifecycle changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}
