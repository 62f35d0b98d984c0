//! The store-client boundary
//!
//! A `Store` is one replica of the shared append-only document store. The
//! concrete backend lives outside this workspace; everything here programs
//! against this trait.

use async_trait::async_trait;

use switchyard_core::{Message, MessageDraft, Result, Seq};

use crate::distance::Distance;

/// Result of one change poll: all messages past the cursor, in ascending
/// sequence order, plus the store's new high-water sequence.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub messages: Vec<Message>,
    pub last_seq: Seq,
}

/// One store replica.
#[async_trait]
pub trait Store: Send + Sync {
    /// Node address or identity, used for selection bookkeeping
    fn name(&self) -> &str;

    /// Fetch every message with sequence greater than `since`, ascending
    async fn get_changes(&self, since: Seq) -> Result<ChangeSet>;

    /// The store's current high-water sequence
    async fn last_seq(&self) -> Result<Seq>;

    /// Append one message; the store assigns its id and sequence
    async fn append(&self, draft: MessageDraft) -> Result<Message>;

    /// Round-trip probe. Unreachability is a value, not an error.
    async fn measure_distance(&self) -> Distance;
}
