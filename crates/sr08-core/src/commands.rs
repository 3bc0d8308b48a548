//! Command keys of the SR08 transfer protocol.
//!
//! Commands are short ASCII tags; the firmware echoes the tag as the key of
//! the notification that answers it. Depending on firmware revision the
//! echoed key may contain a comma (`"GET,77"`), which is why all matching
//! goes through [`sr08_types::CommandKey`] normalization.

/// Device info request: firmware version and current battery level.
pub const DEVICE_INFO: &str = "GET0";

/// Current step count since midnight.
pub const STEP_COUNT: &str = "GET17";

/// Step count on newer firmware revisions. Same payload shape as
/// [`STEP_COUNT`]; both feed the `stepCount` metric.
pub const STEP_COUNT_ALT: &str = "GET18";

/// Start a heart rate measurement; the reply carries the result.
pub const HEART_RATE_START: &str = "GET77";

/// Start a blood oxygen measurement; the reply carries the result.
pub const SPO2_START: &str = "GET81";

/// Dump the ring's periodic health log (replies with an array).
pub const HEALTH_LOG: &str = "GET87";

/// Battery percentage and charging state.
pub const CHARGING_STATUS: &str = "GET88";

/// Reset transient measurement state on the ring.
pub const RESET_STATE: &str = "SET1";

/// Sync the ring's clock to the phone.
pub const SET_TIME: &str = "SET2";

/// Select metric units.
pub const SET_UNITS: &str = "SET3";

/// Select display language.
pub const SET_LANGUAGE: &str = "SET4";

/// Toggle autonomous periodic monitoring on the ring.
pub const AUTO_MONITORING: &str = "SET35";
