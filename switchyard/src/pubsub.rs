//! Typed publish/subscribe over the store, outside of any conversation
//!
//! `Publisher` serializes payloads and appends them under the type's topic;
//! `TypedSubscriber` runs a listener over that topic and decodes each message
//! into a delivery stream. Neither carries a handle, so switchboards on the
//! same topic ignore this traffic.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use switchyard_core::{JsonSerializer, Message, MessageDraft, PartyId, PayloadSerializer, Result, Topic};
use switchyard_store::{ClusterStore, Store};

use crate::bus::{EventBus, Subscription};
use crate::conversation::{Delivery, DeliveryError};
use crate::listener::{Listener, ListenerEvent, MessageFilter};
use crate::service::MessagingService;

/// Appends typed payloads to the store under one topic
pub struct Publisher<T> {
    topic: Topic,
    local_party: PartyId,
    store: Arc<ClusterStore>,
    serializer: Arc<dyn PayloadSerializer<T>>,
}

impl<T: Serialize + DeserializeOwned + 'static> Publisher<T> {
    /// Publisher on the service's topic for `T`, with JSON payloads
    #[must_use]
    pub fn new(service: &MessagingService) -> Self {
        Self::with_serializer(
            service,
            service.topic_for::<T>(),
            Arc::new(JsonSerializer::new()),
        )
    }
}

impl<T> Publisher<T> {
    #[must_use]
    pub fn with_serializer(
        service: &MessagingService,
        topic: Topic,
        serializer: Arc<dyn PayloadSerializer<T>>,
    ) -> Self {
        Self {
            topic,
            local_party: service.local_party().clone(),
            store: service.store().clone(),
            serializer,
        }
    }

    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Broadcast `payload` to every subscriber of the topic
    pub async fn send(&self, payload: &T) -> Result<Message> {
        let data = self.serializer.serialize(payload)?;
        let draft = MessageDraft::broadcast(self.topic.clone(), self.local_party.clone(), data);
        self.store.append(draft).await
    }

    /// Send `payload` addressed to one party; other listeners filtering by
    /// destination skip it
    pub async fn send_to(&self, payload: &T, destination: PartyId) -> Result<Message> {
        let data = self.serializer.serialize(payload)?;
        let draft = MessageDraft::broadcast(self.topic.clone(), self.local_party.clone(), data)
            .with_destination(destination);
        self.store.append(draft).await
    }
}

/// Listener plus decode stage: yields typed deliveries for one topic
pub struct TypedSubscriber<T> {
    listener: Arc<Listener>,
    bus: Arc<EventBus<Delivery<T>>>,
    cancel_token: CancellationToken,
}

impl<T: Serialize + DeserializeOwned + Clone + Send + 'static> TypedSubscriber<T> {
    /// Subscriber on the service's topic for `T`, with JSON payloads
    #[must_use]
    pub fn new(service: &MessagingService) -> Self {
        Self::with_serializer(
            service,
            service.topic_for::<T>(),
            Arc::new(JsonSerializer::new()),
        )
    }
}

impl<T: Clone + Send + 'static> TypedSubscriber<T> {
    /// Subscriber over an explicit topic and payload encoding. Observes all
    /// of the topic's traffic, broadcast and addressed alike.
    #[must_use]
    pub fn with_serializer(
        service: &MessagingService,
        topic: Topic,
        serializer: Arc<dyn PayloadSerializer<T>>,
    ) -> Self {
        let listener = service.listener(MessageFilter::for_topic(topic));
        let bus = Arc::new(EventBus::new());
        let cancel_token = CancellationToken::new();

        let mut events = listener.subscribe();
        let decode_bus = bus.clone();
        let task_token = cancel_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = task_token.cancelled() => {
                        decode_bus.close();
                        return;
                    }
                    event = events.recv() => match event {
                        Some(ListenerEvent::Message(message)) => {
                            let delivery = serializer
                                .deserialize(&message.data)
                                .map_err(DeliveryError::from);
                            decode_bus.publish(&delivery);
                        }
                        Some(ListenerEvent::Unavailable(reason)) => {
                            decode_bus.publish(&Err(DeliveryError(reason)));
                        }
                        None => {
                            debug!("Listener stream ended, subscriber closing");
                            decode_bus.close();
                            return;
                        }
                    }
                }
            }
        });

        Self {
            listener,
            bus,
            cancel_token,
        }
    }

    /// Register an observer of decoded payloads
    pub fn subscribe(&self) -> Subscription<Delivery<T>> {
        self.bus.subscribe()
    }

    /// Stop polling and end every subscription
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
        self.listener.shutdown();
    }
}

impl<T> Drop for TypedSubscriber<T> {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        self.listener.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::time::Duration;
    use switchyard_core::MessagingConfig;
    use switchyard_store::MemoryStore;
    use tokio::time::timeout;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Tick {
        n: u32,
    }

    fn service(party: &str, store: Arc<MemoryStore>) -> MessagingService {
        let config = MessagingConfig {
            node_addresses: vec!["a".to_string()],
            local_party: party.to_string(),
            poll_interval_ms: 10,
            distance_interval_secs: 3600,
            topic: None,
        };
        MessagingService::new(config, vec![store as Arc<dyn Store>]).unwrap()
    }

    #[tokio::test]
    async fn test_typed_round_trip_between_parties() {
        let store = Arc::new(MemoryStore::new("a"));
        let sender = service("Sender", store.clone());
        let receiver = service("Receiver", store);

        let subscriber: TypedSubscriber<Tick> = TypedSubscriber::new(&receiver);
        let mut deliveries = subscriber.subscribe();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let publisher: Publisher<Tick> = Publisher::new(&sender);
        publisher.send(&Tick { n: 1 }).await.unwrap();
        publisher
            .send_to(&Tick { n: 2 }, PartyId::from("Receiver"))
            .await
            .unwrap();

        let first = timeout(Duration::from_secs(1), deliveries.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, Ok(Tick { n: 1 }));
        let second = timeout(Duration::from_secs(1), deliveries.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, Ok(Tick { n: 2 }));

        subscriber.shutdown();
        sender.shutdown();
        receiver.shutdown();
    }

    #[tokio::test]
    async fn test_decode_failure_is_an_err_delivery() {
        let store = Arc::new(MemoryStore::new("a"));
        let receiver = service("Receiver", store.clone());

        let subscriber: TypedSubscriber<Tick> = TypedSubscriber::with_serializer(
            &receiver,
            Topic::from("ticks"),
            Arc::new(JsonSerializer::new()),
        );
        let mut deliveries = subscriber.subscribe();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let draft = MessageDraft::broadcast(
            Topic::from("ticks"),
            PartyId::from("Sender"),
            "{malformed".to_string(),
        );
        store.append(draft).await.unwrap();

        let delivery = timeout(Duration::from_secs(1), deliveries.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(delivery.is_err());

        subscriber.shutdown();
        receiver.shutdown();
    }
}
