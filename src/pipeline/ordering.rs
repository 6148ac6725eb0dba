//! Per-utterance sequencing of assistant replies.
//!
//! Every finalized utterance takes a [`ReplyTicket`]. In strict mode a reply
//! unit waits until all earlier tickets are released before it may record or
//! speak its reply, so generation still overlaps but replies come out in
//! utterance order. Tickets release themselves on drop; an early return or a
//! failure never stalls the units behind it.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

#[derive(Debug)]
struct OrderInner {
    strict: bool,
    next: AtomicU64,
    /// Released tickets that are ahead of `serving`.
    released: Mutex<BTreeSet<u64>>,
    /// Lowest ticket not yet released.
    serving: watch::Sender<u64>,
}

/// Issues reply tickets.
#[derive(Debug, Clone)]
pub struct ReplyOrder {
    inner: Arc<OrderInner>,
}

impl ReplyOrder {
    /// `strict = false` keeps tickets but makes [`ReplyTicket::wait_turn`] a no-op.
    pub fn new(strict: bool) -> Self {
        let (serving, _rx) = watch::channel(0);
        Self {
            inner: Arc::new(OrderInner {
                strict,
                next: AtomicU64::new(0),
                released: Mutex::new(BTreeSet::new()),
                serving,
            }),
        }
    }

    pub fn issue(&self) -> ReplyTicket {
        let seq = self.inner.next.fetch_add(1, Ordering::Relaxed);
        ReplyTicket {
            seq,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Lowest ticket still outstanding.
    pub fn serving(&self) -> u64 {
        *self.inner.serving.borrow()
    }
}

/// A place in the reply sequence.
#[derive(Debug)]
pub struct ReplyTicket {
    seq: u64,
    inner: Arc<OrderInner>,
}

impl ReplyTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Resolve once every earlier ticket has been released.
    pub async fn wait_turn(&self) {
        if !self.inner.strict {
            return;
        }
        let mut rx = self.inner.serving.subscribe();
        let seq = self.seq;
        let _ = rx.wait_for(|serving| *serving >= seq).await;
    }
}

impl Drop for ReplyTicket {
    fn drop(&mut self) {
        let mut released = self
            .inner
            .released
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        released.insert(self.seq);
        self.inner.serving.send_if_modified(|serving| {
            let mut advanced = false;
            while released.remove(&*serving) {
                *serving += 1;
                advanced = true;
            }
            advanced
        });
    }
}
