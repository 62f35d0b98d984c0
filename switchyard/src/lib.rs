//! Conversation-correlated messaging over a replicated append-only store
//!
//! The store is the only transport: parties exchange messages by appending
//! them and polling for changes. This crate turns that substrate into push
//! streams (`Listener`), correlated bidirectional exchanges (`Switchboard`
//! and `Conversation`) and plain typed pub/sub (`Publisher` and
//! `TypedSubscriber`), all hanging off one `MessagingService` per process.

pub mod bus;
pub mod conversation;
pub mod listener;
pub mod pubsub;
pub mod service;
pub mod switchboard;

pub use bus::{EventBus, Subscription};
pub use conversation::{Conversation, ConversationState, Delivery, DeliveryError};
pub use listener::{Listener, ListenerEvent, MessageFilter};
pub use pubsub::{Publisher, TypedSubscriber};
pub use service::MessagingService;
pub use switchboard::Switchboard;

pub use switchyard_core::{
    Config, Error, Handle, Message, MessageDraft, MessageId, MessagingConfig, PartyId, Result,
    Seq, Topic,
};
pub use switchyard_store::{ClusterStore, Distance, MemoryStore, NodeSelector, Store};
