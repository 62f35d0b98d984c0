//! String identifier newtypes for messaging participants and channels

use nanoid::nanoid;
use serde::{Deserialize, Serialize};

/// Number of characters in a generated conversation handle.
///
/// Handles are drawn from the default 64-character nanoid alphabet, so the
/// token space is large enough that collisions are not checked for.
const HANDLE_LENGTH: usize = 32;

/// Identity of one messaging participant (a process or service name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub String);

impl PartyId {
    #[must_use]
    pub const fn from_string(id: String) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PartyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Logical channel name, typically the payload type's canonical name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(pub String);

impl Topic {
    #[must_use]
    pub const fn from_string(topic: String) -> Self {
        Self(topic)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Correlation token identifying one conversation across both parties
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub String);

impl Handle {
    /// Generate a fresh random handle for a locally initiated conversation
    #[must_use]
    pub fn generate() -> Self {
        Self(nanoid!(HANDLE_LENGTH))
    }

    /// Adopt a handle observed on an inbound message
    #[must_use]
    pub const fn from_string(handle: String) -> Self {
        Self(handle)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Handle {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_generate_unique() {
        let a = Handle::generate();
        let b = Handle::generate();
        assert_eq!(a.as_str().len(), HANDLE_LENGTH);
        assert_ne!(a, b);
    }

    #[test]
    fn test_party_id_serde_transparent() {
        let party = PartyId::from("Client");
        let json = serde_json::to_string(&party).unwrap();
        assert_eq!(json, "\"Client\"");

        let back: PartyId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, party);
    }
}
