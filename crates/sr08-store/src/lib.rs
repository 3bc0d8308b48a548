//! Local data persistence for SR08 health records.
//!
//! This crate provides SQLite-based storage for finalized collection
//! records, giving the engine a durable local copy of every cycle whether
//! or not the upload to the collector succeeded.
//!
//! # Example
//!
//! ```no_run
//! use sr08_store::Store;
//!
//! let store = Store::open_default()?;
//! for record in store.list_recent(10)? {
//!     println!("{} bpm at {}", record.heart_rate, record.timestamp);
//! }
//! # Ok::<(), sr08_store::Error>(())
//! ```

mod error;
mod schema;
mod store;

pub use error::{Error, Result};
pub use store::{SharedStore, Store};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/sr08/data.db`
/// - macOS: `~/Library/Application Support/sr08/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\sr08\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("sr08")
        .join("data.db")
}
