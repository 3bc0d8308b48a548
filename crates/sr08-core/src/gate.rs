//! Aggregation gate: cycle completeness tracking.
//!
//! A collection cycle is complete when every *required* metric key has been
//! observed at least once since the cycle began. Values arrive in any order
//! and may repeat (last write wins). Completion is detected both by a
//! completion callback fired at the observation site and by a poll inside
//! [`AggregationGate::await_completion`]; the two paths are serialized
//! through one mutex so completion is reported exactly once per cycle.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// Gate tuning knobs.
#[derive(Debug, Clone)]
pub struct GateOptions {
    /// Poll cadence of the completion check.
    pub poll_interval: Duration,
    /// How long to wait for completeness before settling for a partial set.
    pub completion_timeout: Duration,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            completion_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of waiting for a cycle to fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleCompletion {
    /// Every required key was observed.
    Complete,
    /// The wait timed out with keys still missing.
    Partial { missing: Vec<String> },
}

type CompletionCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Inner {
    required: HashSet<String>,
    collected: HashMap<String, i64>,
    completed: bool,
    on_complete: Option<CompletionCallback>,
}

/// Tracks which metrics the current cycle has collected.
#[derive(Default)]
pub struct AggregationGate {
    inner: Mutex<Inner>,
    notify: Notify,
    options: GateOptions,
}

impl AggregationGate {
    /// Create a gate with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a gate with custom options.
    pub fn with_options(options: GateOptions) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            options,
        }
    }

    /// Start a new cycle requiring the given keys.
    ///
    /// Discards everything from the previous cycle, including any leftover
    /// completion callback.
    pub fn begin_cycle(&self, required: &[&str]) {
        let mut inner = self.inner.lock().expect("gate lock poisoned");
        inner.required = required.iter().map(|k| (*k).to_string()).collect();
        inner.collected.clear();
        inner.completed = false;
        inner.on_complete = None;
        debug!(required = required.len(), "aggregation cycle started");
    }

    /// Register a callback fired once, at the observation that completes
    /// the cycle. The callback runs outside the gate lock.
    pub fn on_complete(&self, callback: impl Fn() + Send + Sync + 'static) {
        let mut inner = self.inner.lock().expect("gate lock poisoned");
        inner.on_complete = Some(Arc::new(callback));
    }

    /// Record one observed metric value. Repeats overwrite; keys outside
    /// the required set are stored but never affect completeness.
    pub fn observe(&self, name: &str, value: i64) {
        let callback = {
            let mut inner = self.inner.lock().expect("gate lock poisoned");
            inner.collected.insert(name.to_string(), value);
            let complete = !inner.required.is_empty()
                && inner
                    .required
                    .iter()
                    .all(|k| inner.collected.contains_key(k));
            if complete && !inner.completed {
                inner.completed = true;
                inner.on_complete.clone()
            } else {
                None
            }
        };
        if let Some(callback) = callback {
            info!("aggregation cycle complete");
            callback();
        }
        self.notify.notify_waiters();
    }

    /// Wait until the cycle is complete or the completion timeout elapses.
    ///
    /// Wakes on every observation and additionally polls at the configured
    /// cadence. On timeout the pending callback is dropped so a straggler
    /// observation cannot fire it after the cycle has been finalized as
    /// partial.
    pub async fn await_completion(&self) -> CycleCompletion {
        let deadline = Instant::now() + self.options.completion_timeout;
        loop {
            if self.is_complete() {
                return CycleCompletion::Complete;
            }
            if Instant::now() >= deadline {
                break;
            }
            let tick = Instant::now() + self.options.poll_interval;
            let wake = if tick < deadline { tick } else { deadline };
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = sleep_until(wake) => {}
            }
        }

        let missing = {
            let mut inner = self.inner.lock().expect("gate lock poisoned");
            inner.on_complete = None;
            let mut missing: Vec<String> = inner
                .required
                .iter()
                .filter(|k| !inner.collected.contains_key(*k))
                .cloned()
                .collect();
            missing.sort();
            missing
        };
        warn!(?missing, "aggregation cycle timed out with keys missing");
        CycleCompletion::Partial { missing }
    }

    /// Whether the current cycle has seen every required key.
    pub fn is_complete(&self) -> bool {
        self.inner.lock().expect("gate lock poisoned").completed
    }

    /// Required keys not yet observed this cycle.
    pub fn missing(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("gate lock poisoned");
        let mut missing: Vec<String> = inner
            .required
            .iter()
            .filter(|k| !inner.collected.contains_key(*k))
            .cloned()
            .collect();
        missing.sort();
        missing
    }

    /// Snapshot of everything observed this cycle.
    pub fn snapshot(&self) -> HashMap<String, i64> {
        self.inner
            .lock()
            .expect("gate lock poisoned")
            .collected
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use sr08_types::metric;

    fn fast_gate() -> AggregationGate {
        AggregationGate::with_options(GateOptions {
            poll_interval: Duration::from_millis(5),
            completion_timeout: Duration::from_millis(50),
        })
    }

    #[test]
    fn test_completes_regardless_of_arrival_order() {
        let gate = fast_gate();
        gate.begin_cycle(&metric::REQUIRED);

        gate.observe(metric::CHARGING_STATE, 1);
        gate.observe(metric::SPO2, 97);
        gate.observe(metric::BATTERY, 80);
        gate.observe(metric::HEART_RATE, 72);
        assert!(!gate.is_complete());
        gate.observe(metric::STEP_COUNT, 1200);
        assert!(gate.is_complete());
        assert!(gate.missing().is_empty());
    }

    #[test]
    fn test_repeat_overwrites_last_write_wins() {
        let gate = fast_gate();
        gate.begin_cycle(&[metric::HEART_RATE]);
        gate.observe(metric::HEART_RATE, 70);
        gate.observe(metric::HEART_RATE, 75);
        assert_eq!(gate.snapshot()[metric::HEART_RATE], 75);
    }

    #[test]
    fn test_unknown_keys_never_satisfy_completeness() {
        let gate = fast_gate();
        gate.begin_cycle(&[metric::HEART_RATE, metric::SPO2]);
        gate.observe("bodyTemperature", 365);
        gate.observe(metric::HEART_RATE, 72);
        assert!(!gate.is_complete());
        assert_eq!(gate.missing(), vec![metric::SPO2.to_string()]);
        // The stray value is still retained in the snapshot.
        assert_eq!(gate.snapshot()["bodyTemperature"], 365);
    }

    #[test]
    fn test_callback_fires_exactly_once() {
        let gate = fast_gate();
        let fired = Arc::new(AtomicU32::new(0));
        gate.begin_cycle(&[metric::HEART_RATE, metric::SPO2]);
        {
            let fired = Arc::clone(&fired);
            gate.on_complete(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        gate.observe(metric::HEART_RATE, 72);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        gate.observe(metric::SPO2, 97);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // Further observations after completion must not re-fire.
        gate.observe(metric::HEART_RATE, 73);
        gate.observe(metric::SPO2, 98);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_await_completion_wakes_on_final_observation() {
        let gate = Arc::new(fast_gate());
        gate.begin_cycle(&[metric::HEART_RATE]);

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.await_completion().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.observe(metric::HEART_RATE, 72);

        assert_eq!(waiter.await.unwrap(), CycleCompletion::Complete);
    }

    #[tokio::test]
    async fn test_timeout_reports_missing_keys_sorted() {
        let gate = fast_gate();
        gate.begin_cycle(&[metric::SPO2, metric::BATTERY, metric::HEART_RATE]);
        gate.observe(metric::HEART_RATE, 72);

        match gate.await_completion().await {
            CycleCompletion::Partial { missing } => {
                assert_eq!(
                    missing,
                    vec![metric::BATTERY.to_string(), metric::SPO2.to_string()]
                );
            }
            CycleCompletion::Complete => panic!("cycle cannot be complete"),
        }
    }

    #[tokio::test]
    async fn test_callback_suppressed_after_timeout() {
        let gate = Arc::new(fast_gate());
        let fired = Arc::new(AtomicU32::new(0));
        gate.begin_cycle(&[metric::HEART_RATE]);
        {
            let fired = Arc::clone(&fired);
            gate.on_complete(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        let outcome = gate.await_completion().await;
        assert!(matches!(outcome, CycleCompletion::Partial { .. }));

        // A straggler arriving after finalization completes the set but
        // must not fire the dropped callback.
        gate.observe(metric::HEART_RATE, 72);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_begin_cycle_resets_previous_state() {
        let gate = fast_gate();
        gate.begin_cycle(&[metric::HEART_RATE]);
        gate.observe(metric::HEART_RATE, 72);
        assert!(gate.is_complete());

        gate.begin_cycle(&[metric::HEART_RATE]);
        assert!(!gate.is_complete());
        assert!(gate.snapshot().is_empty());
    }
}
