//! Event identifier scheme
//!
//! An event id is minted once per IDLE -> ARMED transition and names every
//! artifact of that event: `{uuid4-hex}_{unix-seconds}`. The trailing seconds
//! field is what the upload `timesent` header is derived from.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

/// Opaque event identifier: `{uuid4-hex}_{unix-seconds}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventId(String);

impl EventId {
    /// Mint a fresh event id stamped with the current time
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Mint an event id stamped with an explicit time
    pub fn at(when: DateTime<Utc>) -> Self {
        Self(format!("{}_{}", Uuid::new_v4().simple(), when.timestamp()))
    }

    /// Parse an id previously produced by this scheme
    pub fn parse(raw: &str) -> Option<Self> {
        let (hex, secs) = raw.rsplit_once('_')?;
        if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        secs.parse::<i64>().ok()?;
        Some(Self(raw.to_string()))
    }

    /// The event timestamp encoded in the id
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let (_, secs) = self.0.rsplit_once('_')?;
        let secs = secs.parse::<i64>().ok()?;
        Utc.timestamp_opt(secs, 0).single()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
