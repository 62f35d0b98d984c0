//! The message document: the immutable unit observed from or written to
//! the store.

use serde::{Deserialize, Serialize};

use super::id::{Handle, PartyId, Topic};
use super::message_id::MessageId;

/// Constant document-type discriminator carried by every message
pub const DOC_TYPE: &str = "message";

fn doc_type() -> String {
    DOC_TYPE.to_string()
}

/// Store-local monotonic sequence number, used as the polling cursor.
///
/// Strictly increasing with insertion order within one store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Seq(pub u64);

impl Seq {
    pub const ZERO: Self = Self(0);
}

impl std::fmt::Display for Seq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message as it exists in the store, with id and sequence assigned.
///
/// Wire fields are order-independent; `destination` and `handle` are omitted
/// when absent (broadcast and non-conversation traffic respectively).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type", default = "doc_type")]
    doc_type: String,
    pub id: MessageId,
    pub seq: Seq,
    pub topic: Topic,
    pub source: PartyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<PartyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<Handle>,
    pub data: String,
}

impl Message {
    /// Build a message from a draft once the store has assigned id and seq
    #[must_use]
    pub fn from_draft(draft: MessageDraft, id: MessageId, seq: Seq) -> Self {
        Self {
            doc_type: doc_type(),
            id,
            seq,
            topic: draft.topic,
            source: draft.source,
            destination: draft.destination,
            handle: draft.handle,
            data: draft.data,
        }
    }

    #[must_use]
    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    /// Whether this message carries a conversation handle
    #[must_use]
    pub const fn is_conversation(&self) -> bool {
        self.handle.is_some()
    }

    /// Whether this message is visible to `party`: addressed to it, or
    /// broadcast (no destination at all).
    #[must_use]
    pub fn is_for(&self, party: &PartyId) -> bool {
        match &self.destination {
            Some(dest) => dest == party,
            None => true,
        }
    }
}

impl PartialOrd for Message {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Message {
    /// Messages order by id, which is consistent with store sequence order.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

/// Everything the sender supplies; the store assigns `id` and `seq` on append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDraft {
    pub topic: Topic,
    pub source: PartyId,
    pub destination: Option<PartyId>,
    pub handle: Option<Handle>,
    pub data: String,
}

impl MessageDraft {
    /// A broadcast draft: no destination, no handle
    #[must_use]
    pub const fn broadcast(topic: Topic, source: PartyId, data: String) -> Self {
        Self {
            topic,
            source,
            destination: None,
            handle: None,
            data,
        }
    }

    #[must_use]
    pub fn with_destination(mut self, destination: PartyId) -> Self {
        self.destination = Some(destination);
        self
    }

    #[must_use]
    pub fn with_handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }
}
