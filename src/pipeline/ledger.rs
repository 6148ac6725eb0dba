//! Append-only conversation history shared by reply units.

use crate::pipeline::messages::Turn;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Default)]
struct LedgerInner {
    turns: Vec<Turn>,
    sealed: bool,
}

/// Ordered log of user and assistant turns.
///
/// Each append is one locked push, so readers never see a partial turn.
/// Once sealed (at session end) further appends are rejected.
#[derive(Debug, Clone, Default)]
pub struct ConversationLedger {
    inner: Arc<Mutex<LedgerInner>>,
}

impl ConversationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a turn. Returns `false` if the ledger is sealed.
    pub fn append(&self, turn: Turn) -> bool {
        let mut inner = self.lock();
        if inner.sealed {
            debug!("ledger sealed, dropping {:?} turn", turn.role);
            return false;
        }
        inner.turns.push(turn);
        true
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Turn> {
        let inner = self.lock();
        let start = inner.turns.len().saturating_sub(n);
        inner.turns[start..].to_vec()
    }

    /// A copy of every turn, oldest first.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.lock().turns.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject all further appends.
    pub fn seal(&self) {
        self.lock().sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }
}
