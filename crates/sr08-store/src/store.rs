//! Main store implementation.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use time::OffsetDateTime;
use tracing::{debug, info};

use sr08_core::{RecordSink, SinkError};
use sr08_types::{ChargingState, HealthRecord};

use crate::error::{Error, Result};
use crate::schema;

/// SQLite-based store for finalized health records.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Append one finalized record.
    pub fn append(&self, record: &HealthRecord) -> Result<()> {
        let recorded_at =
            (record.timestamp.unix_timestamp_nanos() / 1_000_000) as i64;
        self.conn.execute(
            "INSERT INTO health_records
                (heart_rate, spo2, step_count, battery, charging_state, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.heart_rate,
                record.spo2,
                record.step_count,
                record.battery,
                record.charging_state.code(),
                recorded_at,
            ],
        )?;
        debug!(recorded_at, "record appended");
        Ok(())
    }

    /// The most recent records, newest first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<HealthRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT heart_rate, spo2, step_count, battery, charging_state, recorded_at
             FROM health_records
             ORDER BY recorded_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok((
                row.get::<_, u16>(0)?,
                row.get::<_, u8>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, u8>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (heart_rate, spo2, step_count, battery, charging_code, recorded_at) = row?;
            let charging_state = ChargingState::from_code(charging_code)
                .map_err(|e| Error::CorruptRow(e.to_string()))?;
            let timestamp =
                OffsetDateTime::from_unix_timestamp_nanos(i128::from(recorded_at) * 1_000_000)
                    .map_err(|e| Error::CorruptRow(e.to_string()))?;
            records.push(HealthRecord {
                heart_rate,
                spo2,
                step_count,
                battery,
                charging_state,
                timestamp,
            });
        }
        Ok(records)
    }

    /// Total number of stored records.
    pub fn count(&self) -> Result<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM health_records", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Thread-safe wrapper exposing the store as the engine's record sink.
///
/// `rusqlite::Connection` is not `Sync`, so sink access serializes through
/// a mutex. Collection cycles never overlap, which keeps contention nil in
/// practice.
pub struct SharedStore {
    store: Mutex<Store>,
}

impl SharedStore {
    /// Wrap an opened store.
    pub fn new(store: Store) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }
}

impl RecordSink for SharedStore {
    fn append(&self, record: &HealthRecord) -> std::result::Result<(), SinkError> {
        self.store
            .lock()
            .expect("store lock poisoned")
            .append(record)
            .map_err(|e| SinkError(e.to_string()))
    }

    fn list_recent(&self, limit: usize) -> std::result::Result<Vec<HealthRecord>, SinkError> {
        self.store
            .lock()
            .expect("store lock poisoned")
            .list_recent(limit)
            .map_err(|e| SinkError(e.to_string()))
    }
}
