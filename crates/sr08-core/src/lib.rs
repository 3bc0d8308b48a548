//! Collection engine for SR08 smart health rings.
//!
//! This crate drives an SR08 ring over a fire-and-forget command transport:
//! it pairs outbound commands with their replies, runs multi-step workflows,
//! supervises the link with bounded reconnection, aggregates per-cycle
//! metrics, and delivers finalized records to a collector backend with
//! local-first persistence.
//!
//! # Architecture
//!
//! - [`Correlator`]: FIFO head-only matching of replies to commands
//! - [`Sequencer`]: strict in-order execution of workflow steps
//! - [`ConnectionSupervisor`]: link state and bounded reconnection
//! - [`AggregationGate`]: per-cycle metric completeness tracking
//! - [`DeliveryPipeline`]: validated upload with retry and token refresh
//! - [`Orchestrator`]: event routing and the periodic collection cycle
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sr08_core::{HttpCollector, MemorySink, MockTransport, Orchestrator};
//! use sr08_types::TokenPair;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(MockTransport::new());
//!     transport.auto_measurements(true);
//!     let collector = Arc::new(HttpCollector::new(
//!         "https://collector.example/v2/upload",
//!         "https://collector.example/v2/auth/refresh",
//!     )?);
//!     let tokens = TokenPair {
//!         access_token: "access".into(),
//!         refresh_token: "refresh".into(),
//!     };
//!
//!     let orchestrator = Arc::new(Orchestrator::new(
//!         transport,
//!         collector,
//!         Arc::new(MemorySink::new()),
//!         "user-42",
//!         tokens,
//!     ));
//!     orchestrator.start();
//!     orchestrator.connect("AA:BB:CC:DD:EE:FF").await;
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod commands;
pub mod controller;
pub mod correlator;
pub mod delivery;
pub mod error;
pub mod events;
pub mod gate;
pub mod mock;
pub mod orchestrator;
pub mod readings;
pub mod sequencer;
pub mod sink;
pub mod supervisor;
pub mod transport;
pub mod validation;
pub mod workflows;

pub use collector::{CollectorApi, CollectorError, HttpCollector};
pub use controller::{Action, ActionReply, dispatch};
pub use correlator::{Correlator, ExpectationId};
pub use delivery::{DeliveryOptions, DeliveryPipeline, DeliveryResult};
pub use error::{Error, Result};
pub use events::{AppEvent, EventDispatcher, EventReceiver, EventSender};
pub use gate::{AggregationGate, CycleCompletion, GateOptions};
pub use mock::{MemorySink, MockCollector, MockTransport};
pub use orchestrator::{
    AbortReason, CycleOutcome, CyclePhase, Orchestrator, OrchestratorOptions,
};
pub use readings::{extract_health_log, extract_metrics};
pub use sequencer::{
    Completion, Sequencer, SequencerOptions, Step, Workflow, WorkflowError,
};
pub use sink::{RecordSink, SinkError};
pub use supervisor::{ConnectionSupervisor, SupervisorOptions};
pub use transport::{ConnectionState, Transport, TransportEvent, TransportEvents};
pub use validation::{ValidationError, validate_record};
