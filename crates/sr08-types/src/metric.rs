//! Metric names used by the aggregation cycle.
//!
//! A collection cycle is complete once every metric in [`REQUIRED`] has
//! been observed. Other names are accepted and stored but never take part
//! in the completeness test.

/// Heart rate in beats per minute.
pub const HEART_RATE: &str = "heartRate";

/// Blood oxygen saturation percentage.
pub const SPO2: &str = "spo2";

/// Step count since midnight.
pub const STEP_COUNT: &str = "stepCount";

/// Battery percentage.
pub const BATTERY: &str = "battery";

/// Charging state code (0 = not charging, 1 = charging, 2 = full).
pub const CHARGING_STATE: &str = "chargingState";

/// The metric set a collection cycle must gather before delivery.
pub const REQUIRED: [&str; 5] = [BATTERY, HEART_RATE, SPO2, STEP_COUNT, CHARGING_STATE];
