//! Local persistence seam.
//!
//! The engine persists every finalized record before attempting upload and
//! does so through this trait, so the storage backend stays out of the
//! engine crate.

use thiserror::Error;

use sr08_types::HealthRecord;

/// A storage failure, carried as a message because backends differ.
#[derive(Debug, Error)]
#[error("record sink error: {0}")]
pub struct SinkError(pub String);

/// Destination for finalized health records.
pub trait RecordSink: Send + Sync + 'static {
    /// Append one record.
    fn append(&self, record: &HealthRecord) -> Result<(), SinkError>;

    /// The most recent records, newest first.
    fn list_recent(&self, limit: usize) -> Result<Vec<HealthRecord>, SinkError>;
}
