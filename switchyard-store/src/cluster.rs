//! Failover-retrying store built on the node selector
//!
//! `ClusterStore` presents the whole replica set as one `Store`. Each
//! operation selects a node; a transient failure marks that node unreachable
//! and retries the next selection, until success or selector exhaustion.
//! Sequence cursors are store-global, so failing over between nodes neither
//! resets nor skips a caller's cursor.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use switchyard_core::{Error, Message, MessageDraft, Result, Seq};

use crate::distance::Distance;
use crate::selector::NodeSelector;
use crate::store::{ChangeSet, Store};

/// The replica set as a single store with transparent failover
pub struct ClusterStore {
    selector: Arc<NodeSelector>,
}

impl ClusterStore {
    #[must_use]
    pub const fn new(selector: Arc<NodeSelector>) -> Self {
        Self { selector }
    }

    #[must_use]
    pub const fn selector(&self) -> &Arc<NodeSelector> {
        &self.selector
    }

    /// Run `op` against the currently favored node, failing over on
    /// transient errors. Terminates: every failure removes one node from
    /// contention until the selector reports exhaustion.
    async fn with_failover<T, F, Fut>(&self, what: &str, op: F) -> Result<T>
    where
        F: Fn(Arc<dyn Store>) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        loop {
            let node = self.selector.select()?;
            match op(node.clone()).await {
                Ok(value) => return Ok(value),
                Err(Error::NoReachableNode) => return Err(Error::NoReachableNode),
                Err(e) => {
                    warn!(
                        node = %node.name(),
                        operation = %what,
                        error = %e,
                        "Store operation failed, failing over"
                    );
                    self.selector.mark_unreachable(node.name());
                }
            }
        }
    }
}

#[async_trait]
impl Store for ClusterStore {
    fn name(&self) -> &str {
        "cluster"
    }

    async fn get_changes(&self, since: Seq) -> Result<ChangeSet> {
        self.with_failover("get_changes", |node| async move {
            node.get_changes(since).await
        })
        .await
    }

    async fn last_seq(&self) -> Result<Seq> {
        self.with_failover("last_seq", |node| async move { node.last_seq().await })
            .await
    }

    async fn append(&self, draft: MessageDraft) -> Result<Message> {
        self.with_failover("append", |node| {
            let draft = draft.clone();
            async move { node.append(draft).await }
        })
        .await
    }

    async fn measure_distance(&self) -> Distance {
        match self.selector.select() {
            Ok(node) => node.measure_distance().await,
            Err(_) => Distance::Unreachable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use switchyard_core::{PartyId, Topic};

    fn draft(data: &str) -> MessageDraft {
        MessageDraft::broadcast(
            Topic::from("test"),
            PartyId::from("Client"),
            data.to_string(),
        )
    }

    fn cluster_of(stores: Vec<Arc<MemoryStore>>) -> ClusterStore {
        let nodes = stores
            .into_iter()
            .map(|s| s as Arc<dyn Store>)
            .collect::<Vec<_>>();
        ClusterStore::new(Arc::new(NodeSelector::new(nodes)))
    }

    #[tokio::test]
    async fn test_append_fails_over_to_reachable_node() {
        let a = Arc::new(MemoryStore::new("a"));
        let b = Arc::new(MemoryStore::new("b"));
        a.set_reachable(false);

        let cluster = cluster_of(vec![a.clone(), b.clone()]);
        cluster.selector().measure_distances().await;

        let message = cluster.append(draft("hello")).await.unwrap();
        assert_eq!(message.seq, Seq(1));
        assert_eq!(b.len(), 1);
        assert!(a.is_empty());
    }

    #[tokio::test]
    async fn test_all_nodes_down_reports_exhaustion() {
        let a = Arc::new(MemoryStore::new("a"));
        a.set_reachable(false);

        let cluster = cluster_of(vec![a]);
        cluster.selector().measure_distances().await;

        assert!(matches!(
            cluster.append(draft("x")).await,
            Err(Error::NoReachableNode)
        ));
        assert_eq!(cluster.measure_distance().await, Distance::Unreachable);
    }

    #[tokio::test]
    async fn test_transient_failure_marks_node_and_retries() {
        let a = Arc::new(MemoryStore::new("a"));
        let b = Arc::new(MemoryStore::new("b"));

        let cluster = cluster_of(vec![a.clone(), b.clone()]);
        cluster.selector().measure_distances().await;

        // Both look reachable; a dies before use
        a.set_reachable(false);

        for i in 0..3 {
            cluster.append(draft(&format!("m{i}"))).await.unwrap();
        }
        assert_eq!(b.len(), 3);
        assert!(!cluster
            .selector()
            .distances()
            .get("a")
            .copied()
            .unwrap_or(Distance::Unreachable)
            .is_reachable());
    }
}
