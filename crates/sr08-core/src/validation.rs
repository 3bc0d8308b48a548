//! Plausibility checks on finalized records.
//!
//! A record that fails validation is never uploaded. It still gets
//! persisted locally so the raw data survives for diagnosis.

use thiserror::Error;

use sr08_types::HealthRecord;

/// A reading outside its plausible physiological range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// Heart rate of zero (sensor did not lock) or above 250 bpm.
    #[error("implausible heart rate: {0} bpm")]
    HeartRate(u16),

    /// Blood oxygen of zero or above 100 percent.
    #[error("implausible blood oxygen: {0}%")]
    Spo2(u8),
}

/// Check a record against plausible ranges before upload.
pub fn validate_record(record: &HealthRecord) -> Result<(), ValidationError> {
    if record.heart_rate == 0 || record.heart_rate > 250 {
        return Err(ValidationError::HeartRate(record.heart_rate));
    }
    if record.spo2 == 0 || record.spo2 > 100 {
        return Err(ValidationError::Spo2(record.spo2));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr08_types::ChargingState;

    fn record(heart_rate: u16, spo2: u8) -> HealthRecord {
        HealthRecord::new(heart_rate, spo2, 1200, 80, ChargingState::NotCharging)
    }

    #[test]
    fn test_plausible_record_passes() {
        assert!(validate_record(&record(72, 97)).is_ok());
        assert!(validate_record(&record(250, 100)).is_ok());
        assert!(validate_record(&record(1, 1)).is_ok());
    }

    #[test]
    fn test_zero_heart_rate_rejected() {
        assert_eq!(
            validate_record(&record(0, 97)),
            Err(ValidationError::HeartRate(0))
        );
    }

    #[test]
    fn test_heart_rate_over_ceiling_rejected() {
        assert_eq!(
            validate_record(&record(251, 97)),
            Err(ValidationError::HeartRate(251))
        );
    }

    #[test]
    fn test_spo2_out_of_range_rejected() {
        assert_eq!(validate_record(&record(72, 0)), Err(ValidationError::Spo2(0)));
        assert_eq!(
            validate_record(&record(72, 101)),
            Err(ValidationError::Spo2(101))
        );
    }
}
