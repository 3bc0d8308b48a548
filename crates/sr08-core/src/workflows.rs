//! Canonical workflow definitions.
//!
//! Three fixed sequences cover everything the engine asks of the ring:
//! first-pairing setup, a user-triggered instant measurement, and the
//! periodic background collection sweep. Steps whose replies matter are
//! awaited; pure configuration writes settle on a fixed delay because the
//! firmware does not acknowledge them.

use std::time::Duration;

use crate::commands;
use crate::sequencer::{Step, Workflow};

const SETTLE: Duration = Duration::from_secs(1);

/// First-pairing setup: reset transient state, push phone-side settings,
/// read device info, then enable autonomous monitoring.
pub fn initial_setup() -> Workflow {
    Workflow {
        name: "initial-setup",
        steps: vec![
            Step::awaited(commands::RESET_STATE),
            Step::settled(commands::SET_TIME, SETTLE),
            Step::settled(commands::SET_UNITS, SETTLE),
            Step::settled(commands::SET_LANGUAGE, SETTLE),
            Step::awaited(commands::DEVICE_INFO),
            Step::settled(commands::AUTO_MONITORING, SETTLE),
        ],
    }
}

/// User-triggered spot measurement: heart rate, blood oxygen, steps.
pub fn instant_measurement() -> Workflow {
    Workflow {
        name: "instant-measurement",
        steps: vec![
            Step::awaited(commands::HEART_RATE_START),
            Step::awaited(commands::SPO2_START),
            Step::awaited(commands::STEP_COUNT),
        ],
    }
}

/// Periodic background sweep. Device info runs first so the battery level
/// is fresh before the measurements start draining it.
pub fn background_collection() -> Workflow {
    Workflow {
        name: "background-collection",
        steps: vec![
            Step::awaited(commands::DEVICE_INFO),
            Step::awaited(commands::STEP_COUNT),
            Step::awaited(commands::HEART_RATE_START),
            Step::awaited(commands::SPO2_START),
            Step::awaited(commands::CHARGING_STATUS),
        ],
    }
}
