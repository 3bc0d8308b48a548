//! Collection orchestrator.
//!
//! Ties the engine together: routes transport events to the correlator and
//! the aggregation gate, runs the periodic background collection cycle, and
//! enforces the cycle-level guarantees. Cycles never overlap (a tick that
//! lands mid-cycle is skipped) and a finalized record is always persisted
//! locally before any upload attempt.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sr08_types::{ChargingState, CommandKey, HealthRecord, TokenPair, metric};

use crate::collector::CollectorApi;
use crate::commands;
use crate::correlator::Correlator;
use crate::delivery::{DeliveryOptions, DeliveryPipeline, DeliveryResult};
use crate::events::{AppEvent, EventDispatcher, EventReceiver};
use crate::gate::{AggregationGate, CycleCompletion, GateOptions};
use crate::readings::{extract_health_log, extract_metrics};
use crate::sequencer::{Sequencer, SequencerOptions, Workflow, WorkflowError};
use crate::sink::RecordSink;
use crate::supervisor::{ConnectionSupervisor, SupervisorOptions};
use crate::transport::{ConnectionState, Transport, TransportEvent};
use crate::workflows;

/// Where a cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Connecting,
    Sequencing,
    Aggregating,
    Persisting,
    Delivering,
    Aborted,
}

/// Why a cycle aborted before producing a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The link could not be established.
    NotConnected,
    /// The collection workflow timed out at the given step.
    WorkflowTimeout { step: usize },
    /// The transport failed mid-workflow.
    Transport(String),
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "link unavailable"),
            Self::WorkflowTimeout { step } => write!(f, "workflow timed out at step {step}"),
            Self::Transport(msg) => write!(f, "transport failure: {msg}"),
        }
    }
}

/// Terminal outcome of one collection cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Record persisted and accepted by the collector.
    Delivered(HealthRecord),
    /// Record persisted locally; upload did not succeed.
    StoredOnly {
        record: HealthRecord,
        delivery: DeliveryResult,
    },
    /// A cycle was already running; this request did nothing.
    Skipped,
    /// The cycle aborted before finalizing a record.
    Aborted(AbortReason),
}

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Background cycle period. The default is short; production callers
    /// supply their own period (the CLI reads it from configuration).
    pub cycle_period: Duration,
    pub supervisor: SupervisorOptions,
    pub sequencer: SequencerOptions,
    pub gate: GateOptions,
    pub delivery: DeliveryOptions,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            cycle_period: Duration::from_secs(10),
            supervisor: SupervisorOptions::default(),
            sequencer: SequencerOptions::default(),
            gate: GateOptions::default(),
            delivery: DeliveryOptions::default(),
        }
    }
}

/// Runs the collection engine: event routing, the periodic cycle, and the
/// user-triggered workflows.
pub struct Orchestrator<T: Transport, C: CollectorApi, S: RecordSink> {
    transport: Arc<T>,
    correlator: Arc<Correlator>,
    supervisor: Arc<ConnectionSupervisor<T>>,
    sequencer: Sequencer<T>,
    gate: Arc<AggregationGate>,
    delivery: Arc<DeliveryPipeline<C>>,
    sink: Arc<S>,
    events: EventDispatcher,
    /// Cycle overlap guard.
    busy: AtomicBool,
    phase: Mutex<CyclePhase>,
    shutdown: CancellationToken,
    cycle_period: Duration,
}

impl<T: Transport, C: CollectorApi, S: RecordSink> Orchestrator<T, C, S> {
    /// Create an orchestrator with default options.
    pub fn new(
        transport: Arc<T>,
        collector: Arc<C>,
        sink: Arc<S>,
        user_id: &str,
        tokens: TokenPair,
    ) -> Self {
        Self::with_options(
            transport,
            collector,
            sink,
            user_id,
            tokens,
            OrchestratorOptions::default(),
        )
    }

    /// Create an orchestrator with custom options.
    pub fn with_options(
        transport: Arc<T>,
        collector: Arc<C>,
        sink: Arc<S>,
        user_id: &str,
        tokens: TokenPair,
        options: OrchestratorOptions,
    ) -> Self {
        let correlator = Arc::new(Correlator::new());
        let supervisor = Arc::new(ConnectionSupervisor::with_options(
            Arc::clone(&transport),
            options.supervisor,
        ));
        let sequencer = Sequencer::new(
            Arc::clone(&transport),
            Arc::clone(&correlator),
            Arc::clone(&supervisor),
            options.sequencer,
        );
        let delivery = Arc::new(DeliveryPipeline::with_options(
            collector,
            user_id,
            tokens,
            options.delivery,
        ));
        Self {
            transport,
            correlator,
            supervisor,
            sequencer,
            gate: Arc::new(AggregationGate::with_options(options.gate)),
            delivery,
            sink,
            events: EventDispatcher::default(),
            busy: AtomicBool::new(false),
            phase: Mutex::new(CyclePhase::Idle),
            shutdown: CancellationToken::new(),
            cycle_period: options.cycle_period,
        }
    }

    /// Spawn the event router and the periodic cycle scheduler.
    pub fn start(self: &Arc<Self>) {
        // Subscribe before spawning so no event emitted after this call
        // can slip past the router.
        let rx = self.transport.subscribe();
        tokio::spawn(Arc::clone(self).route_events(rx));
        tokio::spawn(Arc::clone(self).run_schedule());
        info!(period = ?self.cycle_period, "collection engine started");
    }

    /// Stop the background tasks.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// The connection supervisor (peer management, link state).
    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor<T>> {
        &self.supervisor
    }

    /// Current cycle phase.
    pub fn phase(&self) -> CyclePhase {
        *self.phase.lock().expect("phase lock poisoned")
    }

    /// Remember a peer and bring the link up.
    pub async fn connect(&self, mac: &str) -> bool {
        self.supervisor.set_peer(mac);
        self.supervisor.ensure_connected().await
    }

    /// Tear the link down; the peer stays remembered.
    pub async fn disconnect(&self) -> crate::error::Result<()> {
        if let Some(peer) = self.supervisor.peer() {
            self.transport.disconnect(&peer).await?;
        }
        self.correlator.clear();
        Ok(())
    }

    /// Run the first-pairing setup workflow.
    pub async fn run_initial_setup(&self) -> Result<(), WorkflowError> {
        self.run_workflow(&workflows::initial_setup()).await
    }

    /// Run a user-triggered spot measurement.
    pub async fn measure_now(&self) -> Result<(), WorkflowError> {
        self.run_workflow(&workflows::instant_measurement()).await
    }

    /// Run an arbitrary workflow outside a collection cycle.
    pub async fn run_workflow(&self, workflow: &Workflow) -> Result<(), WorkflowError> {
        self.sequencer.run(workflow).await
    }

    /// Run one full collection cycle now.
    ///
    /// Returns [`CycleOutcome::Skipped`] without side effects if a cycle is
    /// already in flight.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self.busy.swap(true, Ordering::SeqCst) {
            debug!("cycle already in flight; skipping");
            return CycleOutcome::Skipped;
        }
        let outcome = self.run_cycle_inner().await;
        self.set_phase(CyclePhase::Idle);
        self.busy.store(false, Ordering::SeqCst);
        outcome
    }

    async fn run_cycle_inner(&self) -> CycleOutcome {
        // Arm the cycle-scoped state before any notification can arrive.
        self.delivery.begin_cycle();
        self.gate.begin_cycle(&metric::REQUIRED);

        self.set_phase(CyclePhase::Connecting);
        if !self.supervisor.ensure_connected().await {
            return self.abort(AbortReason::NotConnected);
        }

        self.set_phase(CyclePhase::Sequencing);
        if let Err(e) = self.sequencer.run(&workflows::background_collection()).await {
            let reason = match e {
                WorkflowError::NotConnected => AbortReason::NotConnected,
                WorkflowError::Timeout { step, .. } => AbortReason::WorkflowTimeout { step },
                WorkflowError::Transport(err) => AbortReason::Transport(err.to_string()),
            };
            return self.abort(reason);
        }

        self.set_phase(CyclePhase::Aggregating);
        if let CycleCompletion::Partial { missing } = self.gate.await_completion().await {
            // A partial cycle still produces a record; absent metrics read
            // as zero and fail validation downstream where it matters.
            warn!(?missing, "finalizing cycle with missing metrics");
        }
        let record = self.finalize_record();

        self.set_phase(CyclePhase::Persisting);
        if let Err(e) = self.sink.append(&record) {
            // Upload still proceeds; local persistence is best-effort
            // relative to delivery, not a gate on it.
            warn!(error = %e, "failed to persist record locally");
        }

        self.set_phase(CyclePhase::Delivering);
        let delivery = if self.delivery.already_sent() {
            DeliveryResult::AlreadySent
        } else {
            self.delivery.deliver(&record).await
        };

        self.events.send(AppEvent::CycleCompleted {
            record: record.clone(),
        });
        match delivery {
            DeliveryResult::Delivered => CycleOutcome::Delivered(record),
            other => {
                info!(delivery = ?other, "record stored locally without upload");
                CycleOutcome::StoredOnly {
                    record,
                    delivery: other,
                }
            }
        }
    }

    fn abort(&self, reason: AbortReason) -> CycleOutcome {
        self.set_phase(CyclePhase::Aborted);
        warn!(%reason, "collection cycle aborted");
        self.events.send(AppEvent::CycleAborted {
            reason: reason.to_string(),
        });
        CycleOutcome::Aborted(reason)
    }

    fn set_phase(&self, phase: CyclePhase) {
        *self.phase.lock().expect("phase lock poisoned") = phase;
    }

    /// Build the cycle's record from whatever the gate collected. Missing
    /// values read as zero; out-of-range values saturate.
    fn finalize_record(&self) -> HealthRecord {
        let snapshot = self.gate.snapshot();
        let get = |key: &str| snapshot.get(key).copied().unwrap_or(0);
        let charging = ChargingState::from_code(get(metric::CHARGING_STATE))
            .unwrap_or(ChargingState::NotCharging);
        HealthRecord::new(
            get(metric::HEART_RATE).clamp(0, u16::MAX as i64) as u16,
            get(metric::SPO2).clamp(0, u8::MAX as i64) as u8,
            get(metric::STEP_COUNT).clamp(0, u32::MAX as i64) as u32,
            get(metric::BATTERY).clamp(0, 100) as u8,
            charging,
        )
    }

    async fn route_events(self: Arc<Self>, mut rx: crate::transport::TransportEvents) {
        loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Ok(TransportEvent::Notification { key, payload }) => {
                    self.correlator.on_notification(&key, &payload);
                    let key = CommandKey::new(&key);
                    if key.as_str() == commands::HEALTH_LOG {
                        for entry in extract_health_log(&payload) {
                            self.events.send(AppEvent::HealthLogEntry { entry });
                        }
                    }
                    for (name, value) in extract_metrics(&key, &payload) {
                        self.gate.observe(&name, value);
                        self.events.send(AppEvent::Metric { name, value });
                    }
                }
                Ok(TransportEvent::Link(state)) => {
                    self.supervisor.note_link_state(state);
                    if state == ConnectionState::Disconnected {
                        // Outstanding expectations cannot resolve across a
                        // link teardown.
                        self.correlator.clear();
                    }
                    self.events.send(AppEvent::Connection { state });
                }
                Ok(TransportEvent::LowBattery) => {
                    self.events.send(AppEvent::BatteryLow);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event router lagged; notifications dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("event router stopped");
    }

    async fn run_schedule(self: Arc<Self>) {
        let mut ticks = tokio::time::interval(self.cycle_period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticks.tick() => {
                    let outcome = self.run_cycle().await;
                    debug!(?outcome, "scheduled cycle finished");
                }
            }
        }
        debug!("cycle scheduler stopped");
    }
}
