//! Node selection with latency-based failover
//!
//! Picks which store replica to use for an operation: the reachable node with
//! the lowest measured network distance, with round-robin rotation between
//! ties to spread load. Measurement is periodic or on demand, never on the
//! selection hot path.

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use switchyard_core::{Error, Result};

use crate::distance::{Distance, DistanceInfo};
use crate::store::Store;

/// Chooses a store replica per operation and tracks node reachability
pub struct NodeSelector {
    nodes: Vec<Arc<dyn Store>>,
    distances: RwLock<HashMap<String, Distance>>,
    round_robin: AtomicUsize,
    cancel_token: CancellationToken,
}

impl NodeSelector {
    #[must_use]
    pub fn new(nodes: Vec<Arc<dyn Store>>) -> Self {
        Self {
            nodes,
            distances: RwLock::new(HashMap::new()),
            round_robin: AtomicUsize::new(0),
            cancel_token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Probe every node concurrently and record latency or unreachability
    pub async fn measure_distances(&self) -> Vec<DistanceInfo> {
        let probes = self.nodes.iter().map(|node| async move {
            let distance = node.measure_distance().await;
            (node.name().to_string(), distance)
        });
        let results = futures::future::join_all(probes).await;

        let measured_at = Utc::now();
        let mut distances = self.distances.write();
        let mut infos = Vec::with_capacity(results.len());
        for (node, distance) in results {
            match distance {
                Distance::Reachable(latency) => {
                    debug!(node = %node, latency_ms = latency.as_millis() as u64, "Node probe succeeded");
                }
                Distance::Unreachable => {
                    warn!(node = %node, "Node probe failed, marking unreachable");
                }
            }
            distances.insert(node.clone(), distance);
            infos.push(DistanceInfo {
                node,
                distance,
                measured_at,
            });
        }
        infos
    }

    /// Select the reachable node with lowest measured distance.
    ///
    /// Ties rotate round-robin. Nodes that have never been measured rank
    /// after every measured reachable node but still count as candidates, so
    /// selection works before the first probe completes. Fails with
    /// `NoReachableNode` when every node is marked unreachable.
    pub fn select(&self) -> Result<Arc<dyn Store>> {
        let distances = self.distances.read();

        let mut best: Option<Distance> = None;
        let mut candidates: Vec<&Arc<dyn Store>> = Vec::new();
        for node in &self.nodes {
            let distance = distances
                .get(node.name())
                .copied()
                .unwrap_or(Distance::Reachable(Duration::MAX));
            if !distance.is_reachable() {
                continue;
            }
            match best {
                Some(current) if distance > current => {}
                Some(current) if distance == current => candidates.push(node),
                _ => {
                    best = Some(distance);
                    candidates = vec![node];
                }
            }
        }

        if candidates.is_empty() {
            return Err(Error::NoReachableNode);
        }

        let index = self.round_robin.fetch_add(1, Ordering::AcqRel) % candidates.len();
        Ok(candidates[index].clone())
    }

    /// Record that using `node` failed; it is skipped until the next
    /// successful probe.
    pub fn mark_unreachable(&self, node: &str) {
        warn!(node = %node, "Marking node unreachable after failed use");
        self.distances
            .write()
            .insert(node.to_string(), Distance::Unreachable);
    }

    /// Snapshot of the current distance table, for diagnostics
    #[must_use]
    pub fn distances(&self) -> HashMap<String, Distance> {
        self.distances.read().clone()
    }

    /// Start the periodic re-probe loop.
    ///
    /// Returns the `JoinHandle` so the caller can detect task completion.
    /// Use `shutdown()` to stop the loop.
    pub fn start_measuring(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let selector = self.clone();
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            let mut timer = interval(every);
            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        info!("Node distance measurement loop shutting down");
                        return;
                    }
                    _ = timer.tick() => {
                        selector.measure_distances().await;
                    }
                }
            }
        })
    }

    /// Stop the periodic measurement loop
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn selector_for(stores: Vec<MemoryStore>) -> NodeSelector {
        NodeSelector::new(
            stores
                .into_iter()
                .map(|s| Arc::new(s) as Arc<dyn Store>)
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_select_prefers_lowest_latency() {
        let a = MemoryStore::new("a").with_latency(Duration::from_millis(10));
        let b = MemoryStore::new("b");
        b.set_reachable(false);
        let c = MemoryStore::new("c").with_latency(Duration::from_millis(5));

        let selector = selector_for(vec![a, b, c]);
        selector.measure_distances().await;

        assert_eq!(selector.select().unwrap().name(), "c");
    }

    #[tokio::test]
    async fn test_failover_skips_unreachable() {
        let a = MemoryStore::new("a").with_latency(Duration::from_millis(10));
        let b = MemoryStore::new("b");
        b.set_reachable(false);
        let c = MemoryStore::new("c").with_latency(Duration::from_millis(5));

        let selector = selector_for(vec![a, b, c]);
        selector.measure_distances().await;

        // c fails in use; retried selection must return a, never b
        selector.mark_unreachable("c");
        for _ in 0..4 {
            assert_eq!(selector.select().unwrap().name(), "a");
        }

        selector.mark_unreachable("a");
        assert!(matches!(selector.select(), Err(Error::NoReachableNode)));
    }

    #[tokio::test]
    async fn test_equal_latency_rotates_round_robin() {
        let a = MemoryStore::new("a");
        let b = MemoryStore::new("b");

        let selector = selector_for(vec![a, b]);
        selector.measure_distances().await;

        let picks: Vec<String> = (0..4)
            .map(|_| selector.select().unwrap().name().to_string())
            .collect();
        assert_eq!(picks, vec!["a", "b", "a", "b"]);
    }

    #[tokio::test]
    async fn test_select_before_first_probe() {
        let a = MemoryStore::new("a");
        let selector = selector_for(vec![a]);

        // No measurement yet; the node is still a candidate
        assert_eq!(selector.select().unwrap().name(), "a");
    }

    #[tokio::test]
    async fn test_probe_recovers_marked_node() {
        let a = MemoryStore::new("a");
        let selector = selector_for(vec![a]);
        selector.measure_distances().await;

        selector.mark_unreachable("a");
        assert!(selector.select().is_err());

        selector.measure_distances().await;
        assert_eq!(selector.select().unwrap().name(), "a");
    }
}
