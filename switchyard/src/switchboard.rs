//! Switchboard: demultiplexes one topic's traffic into conversations
//!
//! One background pump drains the listener stream and routes each handled
//! message to its conversation, creating conversations for handles it has
//! never seen. Ended handles go into a dead set so that redelivered or stray
//! traffic can never resurrect a finished exchange.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use switchyard_core::{Handle, JsonSerializer, Message, PartyId, PayloadSerializer, Topic};
use switchyard_store::ClusterStore;

use crate::bus::{EventBus, Subscription};
use crate::conversation::{Conversation, DeliveryError};
use crate::listener::{Listener, ListenerEvent, MessageFilter};
use crate::service::MessagingService;

struct State<T> {
    conversations: HashMap<Handle, Arc<Conversation<T>>>,
    /// Handles of ended conversations. Messages for these are dropped
    /// silently; without this set a late duplicate would re-create the
    /// conversation.
    dead_handles: HashSet<Handle>,
}

struct Shared<T> {
    local_party: PartyId,
    topic: Topic,
    store: Arc<ClusterStore>,
    serializer: Arc<dyn PayloadSerializer<T>>,
    done_tx: mpsc::UnboundedSender<Handle>,
    state: Mutex<State<T>>,
    new_conversations: EventBus<Arc<Conversation<T>>>,
}

impl<T: Clone + Send + 'static> Shared<T> {
    /// Create a conversation under `handle` and announce it. Used both for
    /// locally initiated conversations and for adopting an inbound handle.
    fn register(&self, remote_party: PartyId, handle: Handle) -> Arc<Conversation<T>> {
        let conversation = Arc::new(Conversation::new(
            handle.clone(),
            self.local_party.clone(),
            remote_party,
            self.topic.clone(),
            self.store.clone(),
            self.serializer.clone(),
            self.done_tx.clone(),
        ));

        self.state
            .lock()
            .conversations
            .insert(handle.clone(), conversation.clone());
        info!(handle = %handle, remote = %conversation.remote_party(), "Conversation registered");
        self.new_conversations.publish(&conversation);
        conversation
    }

    /// Route one store message to its conversation
    fn dispatch(&self, message: Message) {
        let Some(handle) = message.handle.clone() else {
            trace!(seq = message.seq.0, "Ignoring message without a handle");
            return;
        };

        let conversation = {
            let state = self.state.lock();
            if state.dead_handles.contains(&handle) {
                debug!(handle = %handle, seq = message.seq.0, "Dropping message for dead handle");
                return;
            }
            state.conversations.get(&handle).cloned()
        };
        let conversation = match conversation {
            Some(conversation) => conversation,
            // First sight of this handle: the remote initiated, adopt it
            None => self.register(message.source.clone(), handle),
        };

        let delivery = self
            .serializer
            .deserialize(&message.data)
            .map_err(DeliveryError::from);
        conversation.deliver(message.seq, delivery);
    }

    /// Ended conversations are removed from routing and their handle is
    /// retired for good
    fn mark_dead(&self, handle: &Handle) {
        let mut state = self.state.lock();
        state.conversations.remove(handle);
        state.dead_handles.insert(handle.clone());
        debug!(handle = %handle, "Handle retired");
    }
}

/// Conversation-correlation engine for one topic and one local party
pub struct Switchboard<T> {
    shared: Arc<Shared<T>>,
    listener: Arc<Listener>,
    cancel_token: CancellationToken,
}

impl<T> Switchboard<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    /// Switchboard over the service's topic for `T`, with JSON payloads
    #[must_use]
    pub fn new(service: &MessagingService) -> Self {
        Self::with_serializer(
            service,
            service.topic_for::<T>(),
            Arc::new(JsonSerializer::new()),
        )
    }
}

impl<T: Clone + Send + 'static> Switchboard<T> {
    /// Switchboard over an explicit topic and payload encoding. The listener
    /// is scoped to that topic and to messages addressed to the local party
    /// (or broadcast).
    #[must_use]
    pub fn with_serializer(
        service: &MessagingService,
        topic: Topic,
        serializer: Arc<dyn PayloadSerializer<T>>,
    ) -> Self {
        let local_party = service.local_party().clone();
        let filter =
            MessageFilter::for_topic(topic.clone()).with_destination(local_party.clone());
        let listener = service.listener(filter);

        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            local_party,
            topic,
            store: service.store().clone(),
            serializer,
            done_tx,
            state: Mutex::new(State {
                conversations: HashMap::new(),
                dead_handles: HashSet::new(),
            }),
            new_conversations: EventBus::new(),
        });

        let cancel_token = CancellationToken::new();
        spawn_pump(
            shared.clone(),
            listener.subscribe(),
            done_rx,
            cancel_token.clone(),
        );

        Self {
            shared,
            listener,
            cancel_token,
        }
    }

    /// Initiate a conversation with `remote_party` under a fresh handle.
    /// The remote side materializes its peer when the first message arrives.
    pub fn new_conversation(&self, remote_party: PartyId) -> Arc<Conversation<T>> {
        self.shared.register(remote_party, Handle::generate())
    }

    /// Observe every conversation this switchboard creates, locally
    /// initiated and remotely adopted alike
    pub fn subscribe(&self) -> Subscription<Arc<Conversation<T>>> {
        self.shared.new_conversations.subscribe()
    }

    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.shared.topic
    }

    #[must_use]
    pub fn local_party(&self) -> &PartyId {
        &self.shared.local_party
    }

    /// Tune the underlying listener's poll delay at runtime
    pub fn set_poll_interval(&self, poll_interval: Duration) {
        self.listener.set_poll_interval(poll_interval);
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.listener.poll_interval()
    }

    /// Number of live conversations
    #[must_use]
    pub fn conversation_count(&self) -> usize {
        self.shared.state.lock().conversations.len()
    }

    /// Number of retired handles
    #[must_use]
    pub fn dead_handle_count(&self) -> usize {
        self.shared.state.lock().dead_handles.len()
    }

    /// Stop the pump and the listener. Existing conversations stop receiving;
    /// sends on them still work until each is ended.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
        self.listener.shutdown();
        self.shared.new_conversations.close();
    }
}

impl<T> Drop for Switchboard<T> {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        self.listener.shutdown();
    }
}

fn spawn_pump<T: Clone + Send + 'static>(
    shared: Arc<Shared<T>>,
    mut events: Subscription<ListenerEvent>,
    mut done_rx: mpsc::UnboundedReceiver<Handle>,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    debug!("Switchboard pump shutting down");
                    return;
                }
                done = done_rx.recv() => {
                    if let Some(handle) = done {
                        shared.mark_dead(&handle);
                    }
                }
                event = events.recv() => match event {
                    Some(ListenerEvent::Message(message)) => shared.dispatch(message),
                    Some(ListenerEvent::Unavailable(reason)) => {
                        warn!(reason = %reason, "Store unavailable, conversation traffic stalled");
                    }
                    None => {
                        debug!("Listener stream ended, pump exiting");
                        return;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use switchyard_core::{MessageDraft, MessagingConfig};
    use switchyard_store::{MemoryStore, Store};
    use tokio::time::timeout;

    fn service(party: &str, store: Arc<MemoryStore>) -> MessagingService {
        let config = MessagingConfig {
            node_addresses: vec!["a".to_string()],
            local_party: party.to_string(),
            poll_interval_ms: 10,
            distance_interval_secs: 3600,
            topic: Some("board".to_string()),
        };
        MessagingService::new(config, vec![store as Arc<dyn Store>]).unwrap()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(40)).await;
    }

    #[tokio::test]
    async fn test_adopts_inbound_handle_and_delivers() {
        let store = Arc::new(MemoryStore::new("a"));
        let service = service("Server", store.clone());
        let board: Switchboard<String> = Switchboard::new(&service);
        let mut arrivals = board.subscribe();
        settle().await;

        let draft = MessageDraft::broadcast(
            Topic::from("board"),
            PartyId::from("Client"),
            serde_json::to_string("hello").unwrap(),
        )
        .with_destination(PartyId::from("Server"))
        .with_handle(Handle::from("h-inbound"));
        store.append(draft).await.unwrap();

        let conversation = timeout(Duration::from_secs(1), arrivals.recv())
            .await
            .expect("timed out waiting for conversation")
            .expect("subscription ended");
        assert_eq!(conversation.handle(), &Handle::from("h-inbound"));
        assert_eq!(conversation.remote_party(), &PartyId::from("Client"));

        board.shutdown();
        service.shutdown();
    }

    #[tokio::test]
    async fn test_messages_without_handle_are_ignored() {
        let store = Arc::new(MemoryStore::new("a"));
        let service = service("Server", store.clone());
        let board: Switchboard<String> = Switchboard::new(&service);
        settle().await;

        let draft = MessageDraft::broadcast(
            Topic::from("board"),
            PartyId::from("Client"),
            serde_json::to_string("plain").unwrap(),
        );
        store.append(draft).await.unwrap();
        settle().await;

        assert_eq!(board.conversation_count(), 0);
        board.shutdown();
        service.shutdown();
    }

    #[tokio::test]
    async fn test_ended_handle_is_never_resurrected() {
        let store = Arc::new(MemoryStore::new("a"));
        let service = service("Server", store.clone());
        let board: Switchboard<String> = Switchboard::new(&service);
        let mut arrivals = board.subscribe();
        settle().await;

        let inbound = |data: &str| {
            MessageDraft::broadcast(
                Topic::from("board"),
                PartyId::from("Client"),
                serde_json::to_string(data).unwrap(),
            )
            .with_destination(PartyId::from("Server"))
            .with_handle(Handle::from("h-dead"))
        };

        store.append(inbound("first")).await.unwrap();
        let conversation = timeout(Duration::from_secs(1), arrivals.recv())
            .await
            .unwrap()
            .unwrap();
        conversation.end();
        settle().await;
        assert_eq!(board.conversation_count(), 0);
        assert_eq!(board.dead_handle_count(), 1);

        // A straggler on the retired handle must not create a new conversation
        store.append(inbound("stray")).await.unwrap();
        settle().await;
        assert_eq!(board.conversation_count(), 0);
        assert!(arrivals.try_recv().is_none());

        board.shutdown();
        service.shutdown();
    }

    #[tokio::test]
    async fn test_undecodable_payload_surfaces_as_delivery_error() {
        let store = Arc::new(MemoryStore::new("a"));
        let service = service("Server", store.clone());
        let board: Switchboard<u64> = Switchboard::with_serializer(
            &service,
            Topic::from("board"),
            Arc::new(JsonSerializer::new()),
        );
        let mut arrivals = board.subscribe();
        settle().await;

        let draft = MessageDraft::broadcast(
            Topic::from("board"),
            PartyId::from("Client"),
            "not a number".to_string(),
        )
        .with_destination(PartyId::from("Server"))
        .with_handle(Handle::from("h-bad"));
        store.append(draft).await.unwrap();

        let conversation = timeout(Duration::from_secs(1), arrivals.recv())
            .await
            .unwrap()
            .unwrap();
        let mut deliveries = conversation.subscribe();
        // The conversation exists even though its first payload is garbage;
        // the error rides the delivery stream
        let delivery = timeout(Duration::from_secs(1), deliveries.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(delivery.is_err());

        board.shutdown();
        service.shutdown();
    }

    #[tokio::test]
    async fn test_local_initiation_announces_conversation() {
        let store = Arc::new(MemoryStore::new("a"));
        let service = service("Client", store);
        let board: Switchboard<String> = Switchboard::new(&service);
        let mut arrivals = board.subscribe();

        let conversation = board.new_conversation(PartyId::from("Server"));
        assert_eq!(conversation.remote_party(), &PartyId::from("Server"));
        assert_eq!(board.conversation_count(), 1);

        let announced = arrivals.try_recv().expect("announcement missing");
        assert_eq!(announced.handle(), conversation.handle());

        board.shutdown();
        service.shutdown();
    }
}
