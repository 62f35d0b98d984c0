//! Messaging service facade
//!
//! Owns the cluster store and node selector for one process and hands out
//! listeners. Store construction stays outside: the embedding application
//! builds one `Store` client per configured node address and passes them in.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use switchyard_core::{
    type_topic, Error, Message, MessageDraft, MessagingConfig, PartyId, Result, Topic,
};
use switchyard_store::{ClusterStore, NodeSelector, Store};

use crate::listener::{Listener, MessageFilter};

/// Entry point for everything that talks to the store on behalf of one
/// local party
pub struct MessagingService {
    config: MessagingConfig,
    local_party: PartyId,
    store: Arc<ClusterStore>,
}

impl MessagingService {
    /// Build the service from validated configuration and one store client
    /// per configured node. Spawns the periodic distance measurement loop,
    /// so this must be called within a tokio runtime.
    pub fn new(config: MessagingConfig, nodes: Vec<Arc<dyn Store>>) -> Result<Self> {
        config.validate()?;
        if nodes.is_empty() {
            return Err(Error::Configuration(
                "at least one store client is required".to_string(),
            ));
        }

        let selector = Arc::new(NodeSelector::new(nodes));
        selector.start_measuring(Duration::from_secs(config.distance_interval_secs));

        let local_party = PartyId::from_string(config.local_party.clone());
        info!(party = %local_party, nodes = selector.node_count(), "Messaging service started");

        Ok(Self {
            config,
            local_party,
            store: Arc::new(ClusterStore::new(selector)),
        })
    }

    #[must_use]
    pub fn local_party(&self) -> &PartyId {
        &self.local_party
    }

    /// The failover-retrying store shared by every component of this service
    #[must_use]
    pub fn store(&self) -> &Arc<ClusterStore> {
        &self.store
    }

    /// Topic for typed traffic: the configured override, or the payload
    /// type's canonical name
    #[must_use]
    pub fn topic_for<T>(&self) -> Topic {
        match &self.config.topic {
            Some(topic) => Topic::from_string(topic.clone()),
            None => type_topic::<T>(),
        }
    }

    /// Create and start a listener restricted by `filter`. The caller owns
    /// it and is responsible for shutting it down.
    #[must_use]
    pub fn listener(&self, filter: MessageFilter) -> Arc<Listener> {
        let listener = Arc::new(Listener::new(
            self.store.clone(),
            filter,
            Duration::from_millis(self.config.poll_interval_ms),
        ));
        listener.start();
        listener
    }

    /// Append one message to the store via the currently favored node
    pub async fn send(&self, draft: MessageDraft) -> Result<Message> {
        self.store.append(draft).await
    }

    /// Stop the periodic distance measurement loop. Listeners are shut down
    /// by their owners.
    pub fn shutdown(&self) {
        self.store.selector().shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::Topic;
    use switchyard_store::MemoryStore;

    fn config(party: &str) -> MessagingConfig {
        MessagingConfig {
            node_addresses: vec!["a".to_string()],
            local_party: party.to_string(),
            poll_interval_ms: 10,
            distance_interval_secs: 30,
            topic: None,
        }
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let mut bad = config("Client");
        bad.local_party = String::new();
        let nodes = vec![Arc::new(MemoryStore::new("a")) as Arc<dyn Store>];
        assert!(MessagingService::new(bad, nodes).is_err());

        assert!(MessagingService::new(config("Client"), Vec::new()).is_err());
    }

    #[tokio::test]
    async fn test_topic_override() {
        let mut cfg = config("Client");
        cfg.topic = Some("custom".to_string());
        let nodes = vec![Arc::new(MemoryStore::new("a")) as Arc<dyn Store>];
        let service = MessagingService::new(cfg, nodes).unwrap();

        assert_eq!(service.topic_for::<String>(), Topic::from("custom"));
        service.shutdown();
    }

    #[tokio::test]
    async fn test_send_appends_to_store() {
        let store = Arc::new(MemoryStore::new("a"));
        let service = MessagingService::new(
            config("Client"),
            vec![store.clone() as Arc<dyn Store>],
        )
        .unwrap();

        let draft = MessageDraft::broadcast(
            Topic::from("t"),
            service.local_party().clone(),
            "hi".to_string(),
        );
        let message = service.send(draft).await.unwrap();
        assert_eq!(message.seq.0, 1);
        assert_eq!(store.len(), 1);
        service.shutdown();
    }
}
