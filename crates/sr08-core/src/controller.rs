//! Action surface for host applications.
//!
//! The host (CLI, IPC bridge) drives the engine through serializable
//! [`Action`] values and gets an [`ActionReply`] back. Keeping this
//! surface data-shaped means the same dispatch works locally and across a
//! process boundary.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::collector::CollectorApi;
use crate::orchestrator::{CycleOutcome, Orchestrator};
use crate::sink::RecordSink;
use crate::transport::Transport;

/// A request from the host application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Action {
    /// Remember a peer address and bring the link up.
    Connect { mac: String },
    /// Tear the link down; the peer stays remembered.
    Disconnect,
    /// Run a spot measurement.
    MeasureNow,
    /// Run the first-pairing setup workflow.
    RunInitialSetup,
    /// Run one collection cycle immediately.
    CollectNow,
}

/// Outcome of one dispatched action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReply {
    pub success: bool,
    /// Human-readable failure detail, absent on success.
    pub detail: Option<String>,
}

impl ActionReply {
    fn ok() -> Self {
        Self {
            success: true,
            detail: None,
        }
    }

    fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: Some(detail.into()),
        }
    }
}

/// Dispatch one action against the engine.
pub async fn dispatch<T, C, S>(orchestrator: &Orchestrator<T, C, S>, action: Action) -> ActionReply
where
    T: Transport,
    C: CollectorApi,
    S: RecordSink,
{
    info!(?action, "dispatching action");
    match action {
        Action::Connect { mac } => {
            if orchestrator.connect(&mac).await {
                ActionReply::ok()
            } else {
                ActionReply::failed(format!("could not connect to {mac}"))
            }
        }
        Action::Disconnect => match orchestrator.disconnect().await {
            Ok(()) => ActionReply::ok(),
            Err(e) => ActionReply::failed(e.to_string()),
        },
        Action::MeasureNow => match orchestrator.measure_now().await {
            Ok(()) => ActionReply::ok(),
            Err(e) => ActionReply::failed(e.to_string()),
        },
        Action::RunInitialSetup => match orchestrator.run_initial_setup().await {
            Ok(()) => ActionReply::ok(),
            Err(e) => ActionReply::failed(e.to_string()),
        },
        Action::CollectNow => match orchestrator.run_cycle().await {
            CycleOutcome::Delivered(_) | CycleOutcome::StoredOnly { .. } => ActionReply::ok(),
            CycleOutcome::Skipped => ActionReply::failed("a collection cycle is already running"),
            CycleOutcome::Aborted(reason) => ActionReply::failed(reason.to_string()),
        },
    }
}
