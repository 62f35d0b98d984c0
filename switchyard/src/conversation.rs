//! One correlated exchange under one handle
//!
//! A conversation presents a simple ordered send/receive channel to the
//! application. Inbound messages are pushed exclusively by the owning
//! switchboard's dispatch pump; sends run on application tasks and never
//! block, or get blocked by, that pump.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use switchyard_core::{
    Error, Handle, Message, MessageDraft, PartyId, PayloadSerializer, Result, Seq, Topic,
};
use switchyard_store::{ClusterStore, Store};

use crate::bus::{EventBus, Subscription};

/// Error delivered in place of a payload when one message fails to decode.
/// Scoped to that message; the stream continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DeliveryError(pub String);

impl From<Error> for DeliveryError {
    fn from(e: Error) -> Self {
        Self(e.to_string())
    }
}

/// One item on a conversation's (or typed subscriber's) delivery stream
pub type Delivery<T> = std::result::Result<T, DeliveryError>;

/// Conversation lifecycle state. `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Active,
    Ended,
}

struct Inner<T> {
    state: ConversationState,
    /// Highest sequence delivered to observers so far. Re-deliveries at or
    /// below this cursor are duplicates from at-least-once polling and are
    /// dropped here.
    delivered_up_to: Seq,
    /// Arrived-but-undelivered items, drained in ascending sequence order.
    /// Sequences are store-global, so per-conversation gaps are normal; the
    /// contract is nondecreasing order, not gap-free delivery.
    pending: BTreeMap<Seq, Delivery<T>>,
}

/// A correlated, ordered, bidirectional exchange between two parties
pub struct Conversation<T> {
    handle: Handle,
    local_party: PartyId,
    remote_party: PartyId,
    topic: Topic,
    store: Arc<ClusterStore>,
    serializer: Arc<dyn PayloadSerializer<T>>,
    inner: Mutex<Inner<T>>,
    bus: EventBus<Delivery<T>>,
    done_tx: mpsc::UnboundedSender<Handle>,
}

impl<T: Clone + Send + 'static> Conversation<T> {
    pub(crate) fn new(
        handle: Handle,
        local_party: PartyId,
        remote_party: PartyId,
        topic: Topic,
        store: Arc<ClusterStore>,
        serializer: Arc<dyn PayloadSerializer<T>>,
        done_tx: mpsc::UnboundedSender<Handle>,
    ) -> Self {
        Self {
            handle,
            local_party,
            remote_party,
            topic,
            store,
            serializer,
            inner: Mutex::new(Inner {
                state: ConversationState::Active,
                delivered_up_to: Seq::ZERO,
                pending: BTreeMap::new(),
            }),
            bus: EventBus::new(),
            done_tx,
        }
    }

    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    #[must_use]
    pub fn local_party(&self) -> &PartyId {
        &self.local_party
    }

    #[must_use]
    pub fn remote_party(&self) -> &PartyId {
        &self.remote_party
    }

    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    #[must_use]
    pub fn state(&self) -> ConversationState {
        self.inner.lock().state
    }

    /// Register an observer of inbound deliveries. Items that arrived before
    /// the first subscriber are buffered and flushed here, so the opening
    /// message of a remotely initiated conversation is not lost.
    pub fn subscribe(&self) -> Subscription<Delivery<T>> {
        let subscription = self.bus.subscribe();
        self.flush();
        subscription
    }

    /// Serialize `payload` and append it to the store, stamped with this
    /// conversation's handle, the local party as source and the remote party
    /// as destination. Returns the stored message with its assigned id and
    /// sequence.
    pub async fn send(&self, payload: &T) -> Result<Message> {
        if self.state() == ConversationState::Ended {
            return Err(Error::ConversationEnded);
        }

        let data = self.serializer.serialize(payload)?;
        let draft = MessageDraft::broadcast(self.topic.clone(), self.local_party.clone(), data)
            .with_destination(self.remote_party.clone())
            .with_handle(self.handle.clone());

        let message = self.store.append(draft).await?;
        trace!(handle = %self.handle, seq = message.seq.0, "Sent conversation message");
        Ok(message)
    }

    /// Push one inbound item. Called only by the owning switchboard's
    /// dispatch pump, in nondecreasing global sequence order.
    pub(crate) fn deliver(&self, seq: Seq, delivery: Delivery<T>) {
        {
            let mut inner = self.inner.lock();
            if inner.state == ConversationState::Ended {
                return;
            }
            if seq <= inner.delivered_up_to {
                trace!(handle = %self.handle, seq = seq.0, "Dropping duplicate delivery");
                return;
            }
            inner.pending.insert(seq, delivery);
        }
        self.flush();
    }

    /// Drain pending items to subscribers in ascending sequence order. With
    /// no subscribers yet, items stay buffered and the cursor holds still.
    /// Publishing happens under the lock so interleaved flushes cannot
    /// reorder the stream.
    fn flush(&self) {
        let mut inner = self.inner.lock();
        if self.bus.subscriber_count() == 0 {
            return;
        }
        while let Some((next_seq, item)) = inner.pending.pop_first() {
            inner.delivered_up_to = next_seq;
            self.bus.publish(&item);
        }
    }

    /// Signal completion: Active → Ended, permanently. Fires the done
    /// notification consumed by the owning switchboard exactly once; further
    /// calls are no-ops. Any message arriving for this handle afterwards is
    /// dropped upstream.
    pub fn end(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state == ConversationState::Ended {
                return;
            }
            inner.state = ConversationState::Ended;
            inner.pending.clear();
        }

        debug!(handle = %self.handle, "Conversation ended");
        self.bus.close();
        let _ = self.done_tx.send(self.handle.clone());
    }
}
