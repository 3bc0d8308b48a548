//! Connection supervision and bounded reconnection.
//!
//! The supervisor owns the link state and the reconnection policy. It is a
//! deliberately *local* policy: it never decides when to reconnect.
//! Callers (the sequencer, the orchestrator) invoke [`ensure_connected`]
//! as a precondition before doing work that needs the link.
//!
//! [`ensure_connected`]: ConnectionSupervisor::ensure_connected

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::transport::{ConnectionState, Transport};

/// Reconnection policy knobs.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Maximum number of connect attempts per `ensure_connected` call.
    pub max_attempts: u32,
    /// How often to poll the link state while an attempt is pending.
    pub poll_interval: Duration,
    /// How long to wait for one attempt to come up before giving up on it.
    pub attempt_timeout: Duration,
    /// Pause between attempts.
    pub retry_pause: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            poll_interval: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(10),
            retry_pause: Duration::from_secs(2),
        }
    }
}

/// Owns link state and re-establishes a dropped link with bounded retries.
///
/// Single writer of [`ConnectionState`]; everyone else reads through
/// [`watch`](ConnectionSupervisor::watch). Transport link callbacks are fed
/// in via [`note_link_state`](ConnectionSupervisor::note_link_state) by the
/// event router, so state transitions stay serialized through one owner.
pub struct ConnectionSupervisor<T: Transport> {
    transport: Arc<T>,
    peer: RwLock<Option<String>>,
    state_tx: watch::Sender<ConnectionState>,
    /// Re-entrancy guard: only one reconnection sequence runs at a time.
    reconnecting: AtomicBool,
    options: SupervisorOptions,
}

impl<T: Transport> ConnectionSupervisor<T> {
    /// Create a supervisor with default options.
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_options(transport, SupervisorOptions::default())
    }

    /// Create a supervisor with custom options.
    pub fn with_options(transport: Arc<T>, options: SupervisorOptions) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            peer: RwLock::new(None),
            state_tx,
            reconnecting: AtomicBool::new(false),
            options,
        }
    }

    /// Remember the peer MAC address to reconnect to.
    pub fn set_peer(&self, mac: &str) {
        *self.peer.write().expect("peer lock poisoned") = Some(mac.to_string());
    }

    /// The remembered peer, if any.
    pub fn peer(&self) -> Option<String> {
        self.peer.read().expect("peer lock poisoned").clone()
    }

    /// Forget the remembered peer.
    pub fn forget_peer(&self) {
        *self.peer.write().expect("peer lock poisoned") = None;
    }

    /// Current link state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to link state changes.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Record a link state reported by the transport.
    pub fn note_link_state(&self, state: ConnectionState) {
        if self.state() != state {
            debug!(?state, "link state changed");
        }
        self.state_tx.send_replace(state);
    }

    /// Ensure the link is up, reconnecting with bounded retries if not.
    ///
    /// Returns `true` immediately when already connected, `false` when no
    /// peer is remembered or all attempts are exhausted. If another caller
    /// is already reconnecting, waits for that sequence to settle and
    /// reports its outcome instead of starting a second one.
    pub async fn ensure_connected(&self) -> bool {
        if self.state() == ConnectionState::Connected {
            return true;
        }

        let Some(peer) = self.peer() else {
            warn!("cannot reconnect: no remembered peer address");
            return false;
        };

        if self
            .reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("reconnection already in flight; observing its outcome");
            return self.await_in_flight().await;
        }

        let connected = self.reconnect_loop(&peer).await;
        self.reconnecting.store(false, Ordering::SeqCst);
        connected
    }

    /// Wait for an in-flight reconnection sequence to settle.
    async fn await_in_flight(&self) -> bool {
        while self.reconnecting.load(Ordering::SeqCst) {
            sleep(self.options.poll_interval).await;
        }
        self.state() == ConnectionState::Connected
    }

    async fn reconnect_loop(&self, peer: &str) -> bool {
        for attempt in 1..=self.options.max_attempts {
            info!(peer, attempt, max = self.options.max_attempts, "connect attempt");
            self.note_link_state(ConnectionState::Connecting);

            if let Err(e) = self.transport.connect(peer).await {
                warn!(peer, attempt, error = %e, "connect request rejected");
            }

            // The connect request is fire-and-forget; poll the link state
            // until it comes up or the attempt times out.
            let deadline = Instant::now() + self.options.attempt_timeout;
            loop {
                if self.state() == ConnectionState::Connected {
                    info!(peer, attempt, "link established");
                    return true;
                }
                if Instant::now() >= deadline {
                    break;
                }
                sleep(self.options.poll_interval).await;
            }

            warn!(peer, attempt, "connect attempt timed out");
            if attempt < self.options.max_attempts {
                sleep(self.options.retry_pause).await;
            }
        }

        // Don't leave the state stuck at Connecting after giving up.
        if self.state() == ConnectionState::Connecting {
            self.note_link_state(ConnectionState::Disconnected);
        }
        warn!(peer, "reconnection exhausted after {} attempts", self.options.max_attempts);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::transport::TransportEvent;

    fn fast_options() -> SupervisorOptions {
        SupervisorOptions {
            max_attempts: 5,
            poll_interval: Duration::from_millis(5),
            attempt_timeout: Duration::from_millis(30),
            retry_pause: Duration::from_millis(5),
        }
    }

    /// Forward transport link events into the supervisor, as the event
    /// router does in the full engine.
    fn pump_link_events<T: Transport>(
        supervisor: Arc<ConnectionSupervisor<T>>,
        transport: &Arc<T>,
    ) -> tokio::task::JoinHandle<()> {
        let mut rx = transport.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                if let TransportEvent::Link(state) = event {
                    supervisor.note_link_state(state);
                }
            }
        })
    }

    #[tokio::test]
    async fn test_already_connected_short_circuits() {
        let transport = Arc::new(MockTransport::new());
        let supervisor = Arc::new(ConnectionSupervisor::with_options(
            Arc::clone(&transport),
            fast_options(),
        ));
        supervisor.note_link_state(ConnectionState::Connected);

        assert!(supervisor.ensure_connected().await);
        assert_eq!(transport.connect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_no_peer_returns_false() {
        let transport = Arc::new(MockTransport::new());
        let supervisor = Arc::new(ConnectionSupervisor::with_options(
            Arc::clone(&transport),
            fast_options(),
        ));

        assert!(!supervisor.ensure_connected().await);
        assert_eq!(transport.connect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_reconnects_when_link_comes_up() {
        let transport = Arc::new(MockTransport::new());
        let supervisor = Arc::new(ConnectionSupervisor::with_options(
            Arc::clone(&transport),
            fast_options(),
        ));
        let _pump = pump_link_events(Arc::clone(&supervisor), &transport);
        supervisor.set_peer("AA:BB:CC:DD:EE:FF");

        assert!(supervisor.ensure_connected().await);
        assert_eq!(supervisor.state(), ConnectionState::Connected);
        assert_eq!(transport.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_exactly_five_attempts_when_connect_never_succeeds() {
        let transport = Arc::new(MockTransport::new());
        transport.refuse_connections(true);
        let supervisor = Arc::new(ConnectionSupervisor::with_options(
            Arc::clone(&transport),
            fast_options(),
        ));
        let _pump = pump_link_events(Arc::clone(&supervisor), &transport);
        supervisor.set_peer("AA:BB:CC:DD:EE:FF");

        assert!(!supervisor.ensure_connected().await);
        // Bounded: no 6th attempt.
        assert_eq!(transport.connect_attempts(), 5);
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_next_connects(2);
        let supervisor = Arc::new(ConnectionSupervisor::with_options(
            Arc::clone(&transport),
            fast_options(),
        ));
        let _pump = pump_link_events(Arc::clone(&supervisor), &transport);
        supervisor.set_peer("AA:BB:CC:DD:EE:FF");

        assert!(supervisor.ensure_connected().await);
        assert_eq!(transport.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_sequence() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_next_connects(1);
        let supervisor = Arc::new(ConnectionSupervisor::with_options(
            Arc::clone(&transport),
            fast_options(),
        ));
        let _pump = pump_link_events(Arc::clone(&supervisor), &transport);
        supervisor.set_peer("AA:BB:CC:DD:EE:FF");

        let a = {
            let s = Arc::clone(&supervisor);
            tokio::spawn(async move { s.ensure_connected().await })
        };
        let b = {
            let s = Arc::clone(&supervisor);
            tokio::spawn(async move { s.ensure_connected().await })
        };

        assert!(a.await.unwrap());
        assert!(b.await.unwrap());
        // Two callers, one reconnection sequence: the failed first attempt
        // plus the successful second one.
        assert_eq!(transport.connect_attempts(), 2);
    }
}
