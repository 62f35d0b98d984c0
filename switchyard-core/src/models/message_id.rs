//! Time-ordered opaque message identifiers
//!
//! A `MessageId` encodes its creation time in the leading digits so that
//! lexicographic order is consistent with creation order across the whole
//! store, with a random suffix as tie-break.

use chrono::{DateTime, TimeZone, Utc};
use nanoid::nanoid;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Hex digits of milliseconds-since-epoch at the front of every id
const TIMESTAMP_DIGITS: usize = 14;

/// Random hex digits after the timestamp
const SUFFIX_DIGITS: usize = 18;

const HEX_ALPHABET: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
];

/// Opaque message id, totally ordered across the whole store.
///
/// Format: 14 lowercase hex digits of milliseconds since the Unix epoch,
/// followed by 18 random hex digits. Sorts consistently with store sequence
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a fresh id stamped with the current time
    #[must_use]
    pub fn generate() -> Self {
        Self::from_timestamp(Utc::now())
    }

    /// Generate an id carrying an explicit creation time
    #[must_use]
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        let millis = at.timestamp_millis().max(0);
        Self(format!(
            "{millis:0width$x}{suffix}",
            width = TIMESTAMP_DIGITS,
            suffix = nanoid!(SUFFIX_DIGITS, &HEX_ALPHABET)
        ))
    }

    /// Parse and validate an id string
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() != TIMESTAMP_DIGITS + SUFFIX_DIGITS {
            return Err(Error::Deserialization {
                context: format!("message id has wrong length: {raw:?}"),
            });
        }
        if !raw.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
            return Err(Error::Deserialization {
                context: format!("message id is not lowercase hex: {raw:?}"),
            });
        }
        Ok(Self(raw.to_string()))
    }

    /// Creation time encoded in the id
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        let millis = i64::from_str_radix(&self.0[..TIMESTAMP_DIGITS], 16).unwrap_or(0);
        Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
