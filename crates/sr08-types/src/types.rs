//! Core data types for SR08 health records.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::error::ParseError;

/// Charging state reported by the ring.
///
/// The wire codes match the values the firmware reports in `GET88`
/// payloads and the codes the remote collector expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChargingState {
    /// On the wrist (or at least not on the charger).
    NotCharging = 0,
    /// On the charger, battery filling.
    Charging = 1,
    /// On the charger, battery full.
    Full = 2,
}

impl ChargingState {
    /// The integer code used on the wire.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire code.
    pub fn from_code(code: i64) -> Result<Self, ParseError> {
        match code {
            0 => Ok(Self::NotCharging),
            1 => Ok(Self::Charging),
            2 => Ok(Self::Full),
            other => Err(ParseError::InvalidValue(format!(
                "unknown charging state code {other}"
            ))),
        }
    }
}

/// One finalized collection snapshot.
///
/// Immutable once constructed: the orchestrator builds a record from the
/// aggregation map at the end of a cycle and hands the same value to the
/// local store and the delivery pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Heart rate in beats per minute.
    pub heart_rate: u16,
    /// Blood oxygen saturation percentage.
    pub spo2: u8,
    /// Step count since midnight.
    pub step_count: u32,
    /// Battery percentage.
    pub battery: u8,
    /// Charging state.
    pub charging_state: ChargingState,
    /// When the cycle finalized, UTC.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl HealthRecord {
    /// Create a record stamped with the current time (millisecond precision).
    pub fn new(
        heart_rate: u16,
        spo2: u8,
        step_count: u32,
        battery: u8,
        charging_state: ChargingState,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        // The collector stores millisecond timestamps; drop the sub-ms part
        // so a round-trip through the wire format compares equal.
        let millis = now.millisecond();
        let timestamp = now.replace_millisecond(millis).unwrap_or(now);
        Self {
            heart_rate,
            spo2,
            step_count,
            battery,
            charging_state,
            timestamp,
        }
    }
}

/// Blood pressure pair carried in the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: u16,
    pub diastolic: u16,
}

/// Access/refresh token pair returned by the collector's auth endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Timestamp layout the collector expects: ISO-8601 UTC with milliseconds.
const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'_>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
);

/// The JSON object shipped to the remote collector.
///
/// The schema is fixed by the collector; fields the ring does not measure
/// (`body_temperature`, `blood_pressure`, `blood_sugar`, `sleep_hours`,
/// `sports_time`, `screen_status`) are sent as placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthPayload {
    pub user_id: String,
    pub heart_rate: u16,
    pub spo2: u8,
    pub step_count: u32,
    pub body_temperature: f32,
    pub blood_pressure: BloodPressure,
    pub blood_sugar: u16,
    pub battery: u8,
    pub charging_state: u8,
    pub sleep_hours: f32,
    pub sports_time: u32,
    pub screen_status: u8,
    pub timestamp: String,
}

impl HealthPayload {
    /// Build the outbound payload for one record.
    pub fn from_record(user_id: &str, record: &HealthRecord) -> Self {
        let timestamp = record
            .timestamp
            .to_offset(time::UtcOffset::UTC)
            .format(TIMESTAMP_FORMAT)
            .unwrap_or_else(|_| record.timestamp.to_string());
        Self {
            user_id: user_id.to_string(),
            heart_rate: record.heart_rate,
            spo2: record.spo2,
            step_count: record.step_count,
            body_temperature: 36.5,
            blood_pressure: BloodPressure {
                systolic: 120,
                diastolic: 80,
            },
            blood_sugar: 0,
            battery: record.battery,
            charging_state: record.charging_state.code(),
            sleep_hours: 0.0,
            sports_time: 0,
            screen_status: 0,
            timestamp,
        }
    }
}
