//! Platform-agnostic types for the SR08 health ring.
//!
//! This crate provides the shared types used by the collection engine
//! (`sr08-core`) and the local record store (`sr08-store`):
//!
//! - [`CommandKey`]: normalized identifiers joining outbound commands to
//!   their asynchronous notification replies
//! - [`HealthRecord`]: one finalized collection snapshot
//! - [`HealthPayload`]: the JSON wire format accepted by the remote
//!   collector
//! - Metric name constants used by the aggregation cycle
//!
//! # Example
//!
//! ```
//! use sr08_types::CommandKey;
//!
//! // Some firmware revisions report "GET,77", others "GET77".
//! assert_eq!(CommandKey::new("GET,77"), CommandKey::new("get77"));
//! ```

pub mod error;
pub mod key;
pub mod metric;
pub mod types;

pub use error::ParseError;
pub use key::CommandKey;
pub use types::{BloodPressure, ChargingState, HealthPayload, HealthRecord, TokenPair};
