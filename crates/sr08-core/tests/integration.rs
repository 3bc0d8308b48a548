//! End-to-end engine tests against the scriptable mocks.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use sr08_core::commands;
use sr08_core::{
    Action, AppEvent, CycleOutcome, DeliveryOptions, DeliveryResult, GateOptions,
    MemorySink, MockCollector, MockTransport, Orchestrator, OrchestratorOptions, SequencerOptions,
    SupervisorOptions, dispatch,
};
use sr08_types::{ChargingState, TokenPair};

fn fast_options() -> OrchestratorOptions {
    OrchestratorOptions {
        cycle_period: Duration::from_secs(3600),
        supervisor: SupervisorOptions {
            max_attempts: 5,
            poll_interval: Duration::from_millis(5),
            attempt_timeout: Duration::from_millis(100),
            retry_pause: Duration::from_millis(5),
        },
        sequencer: SequencerOptions {
            step_timeout: Duration::from_millis(200),
        },
        gate: GateOptions {
            poll_interval: Duration::from_millis(5),
            completion_timeout: Duration::from_millis(200),
        },
        delivery: DeliveryOptions {
            max_attempts: 3,
            server_backoff_unit: Duration::from_millis(2),
            transport_backoff: Duration::from_millis(2),
        },
    }
}

fn engine(
    transport: &Arc<MockTransport>,
) -> (
    Arc<Orchestrator<MockTransport, MockCollector, MemorySink>>,
    Arc<MockCollector>,
    Arc<MemorySink>,
) {
    let collector = Arc::new(MockCollector::new());
    let sink = Arc::new(MemorySink::new());
    let orchestrator = Arc::new(Orchestrator::with_options(
        Arc::clone(transport),
        Arc::clone(&collector),
        Arc::clone(&sink),
        "user-42",
        TokenPair {
            access_token: "access-0".to_string(),
            refresh_token: "refresh-0".to_string(),
        },
        fast_options(),
    ));
    orchestrator.start();
    (orchestrator, collector, sink)
}

fn queue_full_sweep(transport: &MockTransport) {
    transport.queue_reply(commands::DEVICE_INFO, json!({"battery": 80}));
    transport.queue_reply(commands::STEP_COUNT, json!({"step_count": 1200}));
    transport.queue_reply(commands::HEART_RATE_START, json!({"heart_rate": 72}));
    transport.queue_reply(commands::SPO2_START, json!({"spo2": 97}));
    transport.queue_reply(
        commands::CHARGING_STATUS,
        json!({"battery": 79, "charging_state": 2}),
    );
}

#[tokio::test]
async fn collect_now_action_runs_a_full_cycle() {
    let transport = Arc::new(MockTransport::new());
    queue_full_sweep(&transport);
    let (orchestrator, collector, sink) = engine(&transport);

    let reply = dispatch(
        &orchestrator,
        Action::Connect {
            mac: "AA:BB:CC:DD:EE:FF".to_string(),
        },
    )
    .await;
    assert!(reply.success);

    let reply = dispatch(&orchestrator, Action::CollectNow).await;
    assert!(reply.success, "detail: {:?}", reply.detail);

    // Commands went out in workflow order.
    assert_eq!(
        transport.sent_commands(),
        vec!["GET0", "GET17", "GET77", "GET81", "GET88"]
    );

    // Persisted locally and uploaded exactly once.
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].heart_rate, 72);
    assert_eq!(records[0].charging_state, ChargingState::Full);
    // The later battery reading from GET88 wins over the GET0 one.
    assert_eq!(records[0].battery, 79);
    assert_eq!(collector.upload_count(), 1);

    let uploads = collector.uploads();
    assert_eq!(uploads[0].user_id, "user-42");
    assert_eq!(uploads[0].charging_state, 2);
    orchestrator.shutdown();
}

#[tokio::test]
async fn metric_events_stream_while_the_cycle_runs() {
    let transport = Arc::new(MockTransport::new());
    queue_full_sweep(&transport);
    let (orchestrator, _collector, _sink) = engine(&transport);
    let mut events = orchestrator.subscribe();
    orchestrator.supervisor().set_peer("AA:BB:CC:DD:EE:FF");

    let outcome = orchestrator.run_cycle().await;
    assert!(matches!(outcome, CycleOutcome::Delivered(_)));

    let mut metric_names = Vec::new();
    let mut completed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            AppEvent::Metric { name, .. } => metric_names.push(name),
            AppEvent::CycleCompleted { .. } => completed = true,
            _ => {}
        }
    }
    for expected in ["heartRate", "spo2", "stepCount", "battery", "chargingState"] {
        assert!(
            metric_names.iter().any(|n| n == expected),
            "missing metric event {expected}"
        );
    }
    assert!(completed);
    orchestrator.shutdown();
}

#[tokio::test]
async fn cycle_without_reachable_ring_aborts_and_uploads_nothing() {
    let transport = Arc::new(MockTransport::new());
    transport.refuse_connections(true);
    let (orchestrator, collector, sink) = engine(&transport);
    orchestrator.supervisor().set_peer("AA:BB:CC:DD:EE:FF");

    let reply = dispatch(&orchestrator, Action::CollectNow).await;
    assert!(!reply.success);

    assert_eq!(transport.connect_attempts(), 5);
    assert!(transport.sent_commands().is_empty());
    assert!(sink.records().is_empty());
    assert_eq!(collector.upload_count(), 0);
    orchestrator.shutdown();
}

#[tokio::test]
async fn rejected_uploads_fall_back_to_local_storage() {
    let transport = Arc::new(MockTransport::new());
    queue_full_sweep(&transport);
    let (orchestrator, collector, sink) = engine(&transport);
    orchestrator.supervisor().set_peer("AA:BB:CC:DD:EE:FF");
    collector.script_statuses(&[503, 503, 503]);

    let outcome = orchestrator.run_cycle().await;
    match outcome {
        CycleOutcome::StoredOnly { delivery, .. } => {
            assert_eq!(delivery, DeliveryResult::Exhausted)
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(sink.records().len(), 1);
    assert_eq!(collector.upload_count(), 3);

    // The next cycle is unaffected by the previous failure.
    queue_full_sweep(&transport);
    let outcome = orchestrator.run_cycle().await;
    assert!(matches!(outcome, CycleOutcome::Delivered(_)));
    assert_eq!(sink.records().len(), 2);
    orchestrator.shutdown();
}

#[tokio::test]
async fn stale_token_refresh_is_transparent_to_the_cycle() {
    let transport = Arc::new(MockTransport::new());
    queue_full_sweep(&transport);
    let (orchestrator, collector, _sink) = engine(&transport);
    orchestrator.supervisor().set_peer("AA:BB:CC:DD:EE:FF");
    collector.script_statuses(&[401, 200]);

    let outcome = orchestrator.run_cycle().await;
    assert!(matches!(outcome, CycleOutcome::Delivered(_)));
    assert_eq!(collector.refresh_count(), 1);
    assert_eq!(collector.tokens_seen(), vec!["access-0", "refreshed-access"]);
    orchestrator.shutdown();
}

#[tokio::test]
async fn instant_measurement_runs_outside_the_cycle() {
    let transport = Arc::new(MockTransport::new());
    transport.auto_measurements(true);
    let (orchestrator, collector, sink) = engine(&transport);
    orchestrator.supervisor().set_peer("AA:BB:CC:DD:EE:FF");

    let reply = dispatch(&orchestrator, Action::MeasureNow).await;
    assert!(reply.success, "detail: {:?}", reply.detail);
    assert_eq!(
        transport.sent_commands(),
        vec!["GET77", "GET81", "GET17"]
    );
    // A spot measurement is not a collection cycle.
    assert!(sink.records().is_empty());
    assert_eq!(collector.upload_count(), 0);
    orchestrator.shutdown();
}
