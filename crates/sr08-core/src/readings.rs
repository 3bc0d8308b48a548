//! Decoding of notification payloads into named metrics.
//!
//! Payload shapes vary across firmware revisions: the same reading may
//! arrive under different field names, and numeric values sometimes arrive
//! as strings. Decoding is lenient on shape but strict on meaning: a
//! payload that carries no recognizable value yields no metrics rather
//! than a zero.

use serde_json::Value;
use tracing::trace;

use sr08_types::{CommandKey, metric};

use crate::commands;

/// Extract the metrics carried by one notification.
///
/// Unknown keys and malformed payloads decode to an empty vec; the stream
/// is shared with unsolicited traffic and that is not an error.
pub fn extract_metrics(key: &CommandKey, payload: &Value) -> Vec<(String, i64)> {
    let mut metrics = Vec::new();
    match key.as_str() {
        k if k == commands::HEART_RATE_START => {
            if let Some(bpm) = int_field(payload, "heart_rate")
                .or_else(|| string_int_field(payload, "measure_heart_rate"))
            {
                if bpm >= 0 {
                    metrics.push((metric::HEART_RATE.to_string(), bpm));
                }
            }
        }
        k if k == commands::SPO2_START => {
            if let Some(pct) = int_field(payload, "spo2")
                .or_else(|| piped_second_field(payload, "measure_blood_oxygen"))
            {
                if pct >= 0 {
                    metrics.push((metric::SPO2.to_string(), pct));
                }
            }
        }
        k if k == commands::STEP_COUNT || k == commands::STEP_COUNT_ALT => {
            if let Some(steps) = int_field(payload, "step_count") {
                if steps >= 0 {
                    metrics.push((metric::STEP_COUNT.to_string(), steps));
                }
            }
        }
        k if k == commands::DEVICE_INFO => {
            if let Some(level) = int_field(payload, "battery") {
                metrics.push((metric::BATTERY.to_string(), level));
            }
        }
        k if k == commands::CHARGING_STATUS => {
            if let Some(level) = int_field(payload, "battery") {
                metrics.push((metric::BATTERY.to_string(), level));
            }
            if let Some(state) = int_field(payload, "charging_state") {
                metrics.push((metric::CHARGING_STATE.to_string(), state));
            }
        }
        other => {
            trace!(key = other, "no metric mapping for notification");
        }
    }
    metrics
}

/// Extract the raw entries of a health log dump (the `GET87` reply).
///
/// Entries are forwarded verbatim; the host application interprets them.
pub fn extract_health_log(payload: &Value) -> Vec<String> {
    match payload.get("array").and_then(Value::as_array) {
        Some(entries) => entries
            .iter()
            .map(|e| match e {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        None => Vec::new(),
    }
}

fn int_field(payload: &Value, field: &str) -> Option<i64> {
    payload.get(field).and_then(Value::as_i64)
}

/// A numeric value delivered as a string, e.g. `"measure_heart_rate": "72"`.
fn string_int_field(payload: &Value, field: &str) -> Option<i64> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| s.trim().parse().ok())
}

/// A two-part `"a|b"` string where the second part is the reading.
fn piped_second_field(payload: &Value, field: &str) -> Option<i64> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| s.split('|').nth(1))
        .and_then(|s| s.trim().parse().ok())
}
