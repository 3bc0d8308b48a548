//! Normalized command/notification keys.
//!
//! The SR08 transfer protocol tags every notification with the key of the
//! command that logically caused it ("GET77", "GET88", ...). Firmware
//! revisions are not consistent about formatting: some report `GET77`,
//! others `GET,77`, and at least one lowercases the prefix. [`CommandKey`]
//! applies one normalization on both the send-side registration and the
//! receive-side match, so correlation never depends on which firmware is on
//! the other end.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A normalized command identifier.
///
/// Normalization uppercases the key and strips everything that is not
/// alphanumeric, so `"GET,77"`, `"get77"` and `"GET77"` all compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandKey(String);

impl CommandKey {
    /// Create a key from a raw command or notification tag.
    pub fn new(raw: &str) -> Self {
        let normalized: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        Self(normalized)
    }

    /// The normalized key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommandKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}
