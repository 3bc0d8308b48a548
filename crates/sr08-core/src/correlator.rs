//! Command/response correlation.
//!
//! The ring's command interface is fire-and-forget; replies come back on an
//! unordered notification stream mixed with unsolicited traffic. The
//! [`Correlator`] pairs outbound commands with their eventual replies using
//! a FIFO queue of expectations.
//!
//! The queue is deliberately a queue and not a keyed map: only the *head*
//! entry is eligible to match an incoming notification. A later-queued
//! expectation can never steal a match intended for an earlier one, which
//! encodes strict workflow ordering as a structural invariant rather than
//! a convention every caller must remember.
//!
//! The correlator has no timer. An expectation that never resolves must be
//! abandoned by its caller via [`Correlator::abandon`], typically after a
//! timeout owned by the sequencer.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use sr08_types::CommandKey;

/// Opaque handle identifying a registered expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectationId(u64);

struct PendingExpectation {
    id: u64,
    key: CommandKey,
    tx: oneshot::Sender<Value>,
}

#[derive(Default)]
struct Inner {
    queue: VecDeque<PendingExpectation>,
    next_id: u64,
}

/// Matches incoming notifications against outstanding expectations.
///
/// All mutation happens under one mutex with no await points inside the
/// critical section, so the transport's producer context and the workflow
/// task serialize cleanly through it.
#[derive(Default)]
pub struct Correlator {
    inner: Mutex<Inner>,
}

impl Correlator {
    /// Create an empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an expectation for a reply with the given key.
    ///
    /// Register *before* dispatching the command: the reply can arrive
    /// before the dispatch call returns, and an unregistered reply is
    /// silently dropped as unsolicited traffic.
    pub fn register(&self, key: CommandKey) -> (ExpectationId, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().expect("correlator lock poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        trace!(%key, id, "registering expectation");
        inner.queue.push_back(PendingExpectation { id, key, tx });
        (ExpectationId(id), rx)
    }

    /// Remove an expectation that will no longer be awaited.
    ///
    /// Returns `true` if the entry was still queued. Callers must do this
    /// on timeout or cancellation so a late reply cannot resolve a
    /// continuation no one is waiting on.
    pub fn abandon(&self, id: ExpectationId) -> bool {
        let mut inner = self.inner.lock().expect("correlator lock poisoned");
        let before = inner.queue.len();
        inner.queue.retain(|p| p.id != id.0);
        before != inner.queue.len()
    }

    /// Feed one incoming notification.
    ///
    /// Normalizes `raw_key`; if it equals the key of the head entry, the
    /// head is dequeued and resolved with the payload. Anything else is
    /// ignored; unmatched notifications are normal traffic, and other
    /// subsystems (the aggregation gate) observe the same stream
    /// independently.
    ///
    /// Returns `true` if an expectation was resolved.
    pub fn on_notification(&self, raw_key: &str, payload: &Value) -> bool {
        let key = CommandKey::new(raw_key);
        let resolved = {
            let mut inner = self.inner.lock().expect("correlator lock poisoned");
            match inner.queue.front() {
                Some(head) if head.key == key => inner.queue.pop_front(),
                _ => None,
            }
        };
        match resolved {
            Some(pending) => {
                debug!(%key, "resolved head expectation");
                // Receiver may already be gone if the awaiting task timed
                // out between our dequeue and its abandon; that's fine.
                let _ = pending.tx.send(payload.clone());
                true
            }
            None => false,
        }
    }

    /// Number of outstanding expectations.
    pub fn pending(&self) -> usize {
        self.inner.lock().expect("correlator lock poisoned").queue.len()
    }

    /// Drop every outstanding expectation (link teardown).
    pub fn clear(&self) {
        self.inner
            .lock()
            .expect("correlator lock poisoned")
            .queue
            .clear();
    }
}
