//! Scriptable fakes for development and testing.
//!
//! [`MockTransport`] emulates the ring's fire-and-forget command interface
//! and notification stream, [`MockCollector`] scripts collector responses
//! status by status, and [`MemorySink`] keeps records in a vec. All three
//! are plain library types so the CLI can run a full engine against them
//! without hardware or a backend.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use rand::Rng;
use serde_json::{Value, json};
use tracing::debug;

use sr08_types::{CommandKey, HealthPayload, HealthRecord, TokenPair};

use crate::collector::{CollectorApi, CollectorError};
use crate::commands;
use crate::error::Result;
use crate::sink::{RecordSink, SinkError};
use crate::transport::{ConnectionState, Transport, TransportEvent, TransportEvents};

/// Emulated ring transport.
///
/// `connect` emits `Connecting` and, unless scripted to fail, `Connected`.
/// `send` records the command and answers it from the scripted reply queue
/// for its key; with auto-measurements enabled, unanswered measurement
/// commands get plausible generated readings instead.
pub struct MockTransport {
    events: tokio::sync::broadcast::Sender<TransportEvent>,
    connect_attempts: AtomicU32,
    remaining_failures: AtomicU32,
    remaining_send_failures: AtomicU32,
    refuse: AtomicBool,
    auto: AtomicBool,
    sent: Mutex<Vec<String>>,
    replies: Mutex<HashMap<String, VecDeque<Value>>>,
}

impl MockTransport {
    /// Create a mock transport with no scripted behavior.
    pub fn new() -> Self {
        let (events, _) = tokio::sync::broadcast::channel(64);
        Self {
            events,
            connect_attempts: AtomicU32::new(0),
            remaining_failures: AtomicU32::new(0),
            remaining_send_failures: AtomicU32::new(0),
            refuse: AtomicBool::new(false),
            auto: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(HashMap::new()),
        }
    }

    /// Make every future connect attempt fail to come up.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Make the next `n` connect attempts fail to come up.
    pub fn fail_next_connects(&self, n: u32) {
        self.remaining_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` command dispatches return a transport error.
    pub fn fail_next_sends(&self, n: u32) {
        self.remaining_send_failures.store(n, Ordering::SeqCst);
    }

    /// Number of connect attempts observed so far.
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// Answer unanswered measurement commands with generated readings.
    pub fn auto_measurements(&self, enabled: bool) {
        self.auto.store(enabled, Ordering::SeqCst);
    }

    /// Queue a reply payload for the given command key. Replies for the
    /// same key are consumed in order.
    pub fn queue_reply(&self, command: &str, payload: Value) {
        let key = CommandKey::new(command);
        self.replies
            .lock()
            .expect("replies lock poisoned")
            .entry(key.as_str().to_string())
            .or_default()
            .push_back(payload);
    }

    /// Emit an unsolicited notification, as the ring does on its own.
    pub fn push_notification(&self, key: &str, payload: Value) {
        let _ = self.events.send(TransportEvent::Notification {
            key: key.to_string(),
            payload,
        });
    }

    /// Emit a link state change directly.
    pub fn set_link(&self, state: ConnectionState) {
        let _ = self.events.send(TransportEvent::Link(state));
    }

    /// Emit a low battery notice.
    pub fn push_low_battery(&self) {
        let _ = self.events.send(TransportEvent::LowBattery);
    }

    /// Every command dispatched so far, in order.
    pub fn sent_commands(&self) -> Vec<String> {
        self.sent.lock().expect("sent lock poisoned").clone()
    }

    fn generated_reply(command: &str) -> Option<Value> {
        let mut rng = rand::rng();
        match command {
            c if c == commands::HEART_RATE_START => {
                Some(json!({"heart_rate": rng.random_range(55..95)}))
            }
            c if c == commands::SPO2_START => Some(json!({"spo2": rng.random_range(94..100)})),
            c if c == commands::STEP_COUNT || c == commands::STEP_COUNT_ALT => {
                Some(json!({"step_count": rng.random_range(0..20_000)}))
            }
            c if c == commands::DEVICE_INFO => {
                Some(json!({"battery": rng.random_range(20..100), "firmware": "R08_2.1"}))
            }
            c if c == commands::CHARGING_STATUS => {
                Some(json!({"battery": rng.random_range(20..100), "charging_state": 0}))
            }
            _ => None,
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, peer: &str) -> Result<()> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        debug!(peer, "mock connect");
        let _ = self.events.send(TransportEvent::Link(ConnectionState::Connecting));

        if self.refuse.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(());
        }

        let _ = self.events.send(TransportEvent::Link(ConnectionState::Connected));
        Ok(())
    }

    async fn disconnect(&self, peer: &str) -> Result<()> {
        debug!(peer, "mock disconnect");
        let _ = self.events.send(TransportEvent::Link(ConnectionState::Disconnected));
        Ok(())
    }

    async fn send(&self, command: &str) -> Result<()> {
        self.sent
            .lock()
            .expect("sent lock poisoned")
            .push(command.to_string());

        if self
            .remaining_send_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(crate::error::Error::transport("command dispatch rejected"));
        }

        let key = CommandKey::new(command);
        let scripted = self
            .replies
            .lock()
            .expect("replies lock poisoned")
            .get_mut(key.as_str())
            .and_then(VecDeque::pop_front);
        let reply = match scripted {
            Some(payload) => Some(payload),
            None if self.auto.load(Ordering::SeqCst) => Self::generated_reply(command),
            None => None,
        };
        if let Some(payload) = reply {
            let _ = self.events.send(TransportEvent::Notification {
                key: key.as_str().to_string(),
                payload,
            });
        }
        Ok(())
    }

    fn subscribe(&self) -> TransportEvents {
        self.events.subscribe()
    }
}

/// Scripted collector backend.
///
/// `upload` pops the next scripted status (defaulting to 200 when the
/// script runs dry) and records the bearer token it was called with.
pub struct MockCollector {
    statuses: Mutex<VecDeque<u16>>,
    uploads: Mutex<Vec<HealthPayload>>,
    tokens_seen: Mutex<Vec<String>>,
    refresh_ok: AtomicBool,
    refresh_calls: AtomicU32,
}

impl MockCollector {
    /// Create a collector that accepts everything.
    pub fn new() -> Self {
        Self {
            statuses: Mutex::new(VecDeque::new()),
            uploads: Mutex::new(Vec::new()),
            tokens_seen: Mutex::new(Vec::new()),
            refresh_ok: AtomicBool::new(true),
            refresh_calls: AtomicU32::new(0),
        }
    }

    /// Script the statuses of upcoming uploads, in order.
    pub fn script_statuses(&self, statuses: &[u16]) {
        self.statuses
            .lock()
            .expect("statuses lock poisoned")
            .extend(statuses.iter().copied());
    }

    /// Whether the refresh endpoint should succeed.
    pub fn set_refresh_ok(&self, ok: bool) {
        self.refresh_ok.store(ok, Ordering::SeqCst);
    }

    /// Number of upload calls observed.
    pub fn upload_count(&self) -> u32 {
        self.uploads.lock().expect("uploads lock poisoned").len() as u32
    }

    /// Every uploaded payload, in order.
    pub fn uploads(&self) -> Vec<HealthPayload> {
        self.uploads.lock().expect("uploads lock poisoned").clone()
    }

    /// The bearer token each upload carried, in order.
    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen
            .lock()
            .expect("tokens lock poisoned")
            .clone()
    }

    /// Number of refresh calls observed.
    pub fn refresh_count(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CollectorApi for MockCollector {
    async fn upload(
        &self,
        payload: &HealthPayload,
        access_token: &str,
    ) -> std::result::Result<u16, CollectorError> {
        self.uploads
            .lock()
            .expect("uploads lock poisoned")
            .push(payload.clone());
        self.tokens_seen
            .lock()
            .expect("tokens lock poisoned")
            .push(access_token.to_string());
        let status = self
            .statuses
            .lock()
            .expect("statuses lock poisoned")
            .pop_front()
            .unwrap_or(200);
        Ok(status)
    }

    async fn refresh(
        &self,
        _user_id: &str,
        _refresh_token: &str,
    ) -> std::result::Result<TokenPair, CollectorError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.refresh_ok.load(Ordering::SeqCst) {
            Ok(TokenPair {
                access_token: "refreshed-access".to_string(),
                refresh_token: "refreshed-refresh".to_string(),
            })
        } else {
            Err(CollectorError::RefreshRejected(401))
        }
    }
}

/// In-memory record sink.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<HealthRecord>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every appended record, oldest first.
    pub fn records(&self) -> Vec<HealthRecord> {
        self.records.lock().expect("records lock poisoned").clone()
    }
}

impl RecordSink for MemorySink {
    fn append(&self, record: &HealthRecord) -> std::result::Result<(), SinkError> {
        self.records
            .lock()
            .expect("records lock poisoned")
            .push(record.clone());
        Ok(())
    }

    fn list_recent(&self, limit: usize) -> std::result::Result<Vec<HealthRecord>, SinkError> {
        let records = self.records.lock().expect("records lock poisoned");
        Ok(records.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
pub(crate) fn engine_parts(
    transport: &std::sync::Arc<MockTransport>,
) -> (
    crate::sequencer::Sequencer<MockTransport>,
    std::sync::Arc<crate::supervisor::ConnectionSupervisor<MockTransport>>,
    std::sync::Arc<crate::correlator::Correlator>,
    tokio::task::JoinHandle<()>,
) {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::correlator::Correlator;
    use crate::sequencer::{Sequencer, SequencerOptions};
    use crate::supervisor::{ConnectionSupervisor, SupervisorOptions};

    let supervisor = Arc::new(ConnectionSupervisor::with_options(
        Arc::clone(transport),
        SupervisorOptions {
            max_attempts: 5,
            poll_interval: Duration::from_millis(5),
            attempt_timeout: Duration::from_millis(100),
            retry_pause: Duration::from_millis(5),
        },
    ));
    let correlator = Arc::new(Correlator::new());

    let pump = {
        let mut rx = transport.subscribe();
        let supervisor = Arc::clone(&supervisor);
        let correlator = Arc::clone(&correlator);
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                match event {
                    TransportEvent::Notification { key, payload } => {
                        correlator.on_notification(&key, &payload);
                    }
                    TransportEvent::Link(state) => supervisor.note_link_state(state),
                    TransportEvent::LowBattery => {}
                }
            }
        })
    };

    let sequencer = Sequencer::new(
        Arc::clone(transport),
        Arc::clone(&correlator),
        Arc::clone(&supervisor),
        SequencerOptions::default(),
    );
    (sequencer, supervisor, correlator, pump)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_reply_consumed_in_order() {
        let transport = MockTransport::new();
        let mut rx = transport.subscribe();
        transport.queue_reply("GET77", json!({"heart_rate": 70}));
        transport.queue_reply("GET77", json!({"heart_rate": 75}));

        transport.send("GET77").await.unwrap();
        transport.send("GET77").await.unwrap();
        transport.send("GET77").await.unwrap();

        let first = rx.recv().await.unwrap();
        match first {
            TransportEvent::Notification { payload, .. } => {
                assert_eq!(payload["heart_rate"], 70);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let second = rx.recv().await.unwrap();
        match second {
            TransportEvent::Notification { payload, .. } => {
                assert_eq!(payload["heart_rate"], 75);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        // Third send had nothing scripted and auto mode is off.
        assert!(rx.try_recv().is_err());
        assert_eq!(transport.sent_commands().len(), 3);
    }

    #[tokio::test]
    async fn test_auto_measurements_generate_plausible_readings() {
        let transport = MockTransport::new();
        transport.auto_measurements(true);
        let mut rx = transport.subscribe();

        transport.send(commands::HEART_RATE_START).await.unwrap();
        match rx.recv().await.unwrap() {
            TransportEvent::Notification { key, payload } => {
                assert_eq!(key, "GET77");
                let bpm = payload["heart_rate"].as_i64().unwrap();
                assert!((55..95).contains(&bpm));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_failures_then_success() {
        let transport = MockTransport::new();
        transport.fail_next_connects(1);
        let mut rx = transport.subscribe();

        transport.connect("AA:BB").await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            TransportEvent::Link(ConnectionState::Connecting)
        ));
        assert!(rx.try_recv().is_err());

        transport.connect("AA:BB").await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            TransportEvent::Link(ConnectionState::Connecting)
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            TransportEvent::Link(ConnectionState::Connected)
        ));
        assert_eq!(transport.connect_attempts(), 2);
    }

    #[test]
    fn test_memory_sink_lists_newest_first() {
        let sink = MemorySink::new();
        let a = HealthRecord::new(70, 96, 100, 80, sr08_types::ChargingState::NotCharging);
        let b = HealthRecord::new(75, 98, 200, 79, sr08_types::ChargingState::NotCharging);
        sink.append(&a).unwrap();
        sink.append(&b).unwrap();

        let recent = sink.list_recent(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].step_count, 200);
    }
}
