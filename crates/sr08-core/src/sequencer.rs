//! Ordered execution of multi-step device workflows.
//!
//! A workflow is a list of steps run strictly in order: step N+1 never
//! dispatches before step N's completion condition is satisfied. A step
//! completes either when a correlated reply arrives ([`Completion::AwaitReply`])
//! or after a fixed settling delay ([`Completion::SettleFor`]) for commands
//! whose acknowledgement is not observable or not required.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use sr08_types::CommandKey;

use crate::correlator::Correlator;
use crate::error::Error;
use crate::supervisor::ConnectionSupervisor;
use crate::transport::Transport;

/// How a step is considered complete.
#[derive(Debug, Clone)]
pub enum Completion {
    /// Wait for a notification whose normalized key matches.
    AwaitReply(CommandKey),
    /// Wait a fixed settling delay; no reply expected.
    SettleFor(Duration),
}

/// One command dispatch plus its completion condition.
#[derive(Debug, Clone)]
pub struct Step {
    /// The command tag to send.
    pub command: &'static str,
    /// The completion condition.
    pub completion: Completion,
}

impl Step {
    /// A step that awaits the reply echoing its own command key.
    pub fn awaited(command: &'static str) -> Self {
        Self {
            command,
            completion: Completion::AwaitReply(CommandKey::new(command)),
        }
    }

    /// A step that settles after a fixed delay.
    pub fn settled(command: &'static str, delay: Duration) -> Self {
        Self {
            command,
            completion: Completion::SettleFor(delay),
        }
    }
}

/// An ordered sequence of steps, executed start-to-finish or aborted.
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Name used in logs.
    pub name: &'static str,
    /// Steps in dispatch order.
    pub steps: Vec<Step>,
}

/// Why a workflow run failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkflowError {
    /// The connection supervisor could not bring the link up.
    #[error("link unavailable before workflow start")]
    NotConnected,

    /// A step's reply did not arrive within the per-step timeout.
    #[error("step {step} ({key}) timed out")]
    Timeout {
        /// Zero-based index of the step that timed out.
        step: usize,
        /// The key the step was waiting for.
        key: CommandKey,
    },

    /// The transport failed a dispatch.
    #[error(transparent)]
    Transport(#[from] Error),
}

/// Sequencer tuning knobs.
#[derive(Debug, Clone)]
pub struct SequencerOptions {
    /// Timeout for each awaited reply.
    pub step_timeout: Duration,
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(30),
        }
    }
}

/// Runs workflows against the transport, in strict step order.
pub struct Sequencer<T: Transport> {
    transport: Arc<T>,
    correlator: Arc<Correlator>,
    supervisor: Arc<ConnectionSupervisor<T>>,
    options: SequencerOptions,
}

impl<T: Transport> Sequencer<T> {
    /// Create a sequencer.
    pub fn new(
        transport: Arc<T>,
        correlator: Arc<Correlator>,
        supervisor: Arc<ConnectionSupervisor<T>>,
        options: SequencerOptions,
    ) -> Self {
        Self {
            transport,
            correlator,
            supervisor,
            options,
        }
    }

    /// Execute a workflow.
    ///
    /// An empty workflow completes immediately. If the link is down, the
    /// supervisor's `ensure_connected` gate must succeed before any step
    /// dispatches; otherwise the run fails with [`WorkflowError::NotConnected`].
    /// A step timeout aborts the remaining steps.
    pub async fn run(&self, workflow: &Workflow) -> Result<(), WorkflowError> {
        if workflow.steps.is_empty() {
            return Ok(());
        }

        if !self.supervisor.ensure_connected().await {
            warn!(workflow = workflow.name, "link unavailable; workflow not started");
            return Err(WorkflowError::NotConnected);
        }

        info!(workflow = workflow.name, steps = workflow.steps.len(), "running workflow");

        for (index, step) in workflow.steps.iter().enumerate() {
            match &step.completion {
                Completion::AwaitReply(key) => {
                    // Register before dispatching: the reply can beat the
                    // dispatch call's return.
                    let (id, rx) = self.correlator.register(key.clone());
                    if let Err(e) = self.transport.send(step.command).await {
                        self.correlator.abandon(id);
                        return Err(WorkflowError::Transport(e));
                    }
                    match timeout(self.options.step_timeout, rx).await {
                        Ok(Ok(_payload)) => {
                            debug!(workflow = workflow.name, step = index, %key, "step acknowledged");
                        }
                        Ok(Err(_)) => {
                            // Correlator was cleared under us (link teardown).
                            return Err(WorkflowError::Transport(Error::Cancelled));
                        }
                        Err(_) => {
                            self.correlator.abandon(id);
                            warn!(workflow = workflow.name, step = index, %key, "step timed out");
                            return Err(WorkflowError::Timeout {
                                step: index,
                                key: key.clone(),
                            });
                        }
                    }
                }
                Completion::SettleFor(delay) => {
                    self.transport.send(step.command).await?;
                    debug!(workflow = workflow.name, step = index, ?delay, "settling");
                    sleep(*delay).await;
                }
            }
        }

        info!(workflow = workflow.name, "workflow complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands;
    use crate::mock::{MockTransport, engine_parts};
    use serde_json::json;

    #[tokio::test]
    async fn test_empty_workflow_completes_immediately() {
        let transport = Arc::new(MockTransport::new());
        let (sequencer, _supervisor, _correlator, _pump) = engine_parts(&transport);

        let workflow = Workflow {
            name: "empty",
            steps: Vec::new(),
        };
        // No connection needed for an empty workflow.
        sequencer.run(&workflow).await.unwrap();
        assert!(transport.sent_commands().is_empty());
    }

    #[tokio::test]
    async fn test_not_connected_without_peer() {
        let transport = Arc::new(MockTransport::new());
        let (sequencer, _supervisor, _correlator, _pump) = engine_parts(&transport);

        let workflow = Workflow {
            name: "measure",
            steps: vec![Step::awaited(commands::HEART_RATE_START)],
        };
        let err = sequencer.run(&workflow).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotConnected));
        // No step may execute before the connection gate passes.
        assert!(transport.sent_commands().is_empty());
    }

    #[tokio::test]
    async fn test_steps_run_in_order_with_auto_replies() {
        let transport = Arc::new(MockTransport::new());
        let (sequencer, supervisor, _correlator, _pump) = engine_parts(&transport);
        supervisor.set_peer("AA:BB:CC:DD:EE:FF");

        transport.queue_reply(commands::HEART_RATE_START, json!({"heart_rate": 72}));
        transport.queue_reply(commands::SPO2_START, json!({"spo2": "98|97"}));
        transport.queue_reply(commands::STEP_COUNT, json!({"step_count": 1200}));

        let workflow = Workflow {
            name: "instant-measurement",
            steps: vec![
                Step::awaited(commands::HEART_RATE_START),
                Step::awaited(commands::SPO2_START),
                Step::awaited(commands::STEP_COUNT),
            ],
        };
        sequencer.run(&workflow).await.unwrap();

        assert_eq!(
            transport.sent_commands(),
            vec![
                commands::HEART_RATE_START.to_string(),
                commands::SPO2_START.to_string(),
                commands::STEP_COUNT.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_step_timeout_aborts_remaining_steps() {
        let transport = Arc::new(MockTransport::new());
        let (sequencer, supervisor, correlator, _pump) = engine_parts(&transport);
        supervisor.set_peer("AA:BB:CC:DD:EE:FF");

        // First step acknowledged, second never answered.
        transport.queue_reply(commands::DEVICE_INFO, json!({"battery": 80}));

        let workflow = Workflow {
            name: "partial",
            steps: vec![
                Step::awaited(commands::DEVICE_INFO),
                Step::awaited(commands::HEART_RATE_START),
                Step::awaited(commands::SPO2_START),
            ],
        };
        let sequencer = Sequencer {
            options: SequencerOptions {
                step_timeout: Duration::from_millis(30),
            },
            ..sequencer
        };

        let err = sequencer.run(&workflow).await.unwrap_err();
        match err {
            WorkflowError::Timeout { step, .. } => assert_eq!(step, 1),
            other => panic!("unexpected error: {other:?}"),
        }
        // The third step never dispatched.
        assert_eq!(transport.sent_commands().len(), 2);
        // The timed-out expectation was removed, not left to rot.
        assert_eq!(correlator.pending(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_aborts_and_cleans_up() {
        let transport = Arc::new(MockTransport::new());
        let (sequencer, supervisor, correlator, _pump) = engine_parts(&transport);
        supervisor.set_peer("AA:BB:CC:DD:EE:FF");
        transport.fail_next_sends(1);

        let workflow = Workflow {
            name: "measure",
            steps: vec![
                Step::awaited(commands::HEART_RATE_START),
                Step::awaited(commands::SPO2_START),
            ],
        };
        let err = sequencer.run(&workflow).await.unwrap_err();
        match err {
            WorkflowError::Transport(e) => {
                assert!(e.to_string().contains("command dispatch rejected"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The second step never dispatched and the failed step's
        // expectation was removed.
        assert_eq!(transport.sent_commands().len(), 1);
        assert_eq!(correlator.pending(), 0);
    }

    #[tokio::test]
    async fn test_settling_step_needs_no_reply() {
        let transport = Arc::new(MockTransport::new());
        let (sequencer, supervisor, _correlator, _pump) = engine_parts(&transport);
        supervisor.set_peer("AA:BB:CC:DD:EE:FF");

        let workflow = Workflow {
            name: "configure",
            steps: vec![Step::settled(commands::SET_TIME, Duration::from_millis(5))],
        };
        sequencer.run(&workflow).await.unwrap();
        assert_eq!(transport.sent_commands(), vec![commands::SET_TIME.to_string()]);
    }
}
