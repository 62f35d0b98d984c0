//! In-memory store implementation
//!
//! Backs tests and single-process deployments. Several handles to one
//! `MemoryStore` model several independent processes sharing one replicated
//! store. Latency and reachability are adjustable so node selection and
//! failover are testable without a network.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use switchyard_core::{Error, Message, MessageDraft, MessageId, Result, Seq};

use crate::distance::Distance;
use crate::store::{ChangeSet, Store};

#[derive(Default)]
struct Log {
    messages: Vec<Message>,
    last_seq: u64,
}

/// Append-only in-memory message log with strictly increasing sequences
pub struct MemoryStore {
    name: String,
    log: Mutex<Log>,
    latency: Mutex<Duration>,
    reachable: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            log: Mutex::new(Log::default()),
            latency: Mutex::new(Duration::ZERO),
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulate a network round trip of `latency` on every operation
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = latency;
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Toggle reachability; unreachable stores fail every operation
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of messages in the log
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.lock().messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.lock().messages.is_empty()
    }

    async fn round_trip(&self) -> Result<()> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(Error::Store(format!("node {} is unreachable", self.name)));
        }
        let latency = *self.latency.lock();
        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_changes(&self, since: Seq) -> Result<ChangeSet> {
        self.round_trip().await?;
        let log = self.log.lock();
        let messages = log
            .messages
            .iter()
            .filter(|m| m.seq > since)
            .cloned()
            .collect();
        Ok(ChangeSet {
            messages,
            last_seq: Seq(log.last_seq),
        })
    }

    async fn last_seq(&self) -> Result<Seq> {
        self.round_trip().await?;
        Ok(Seq(self.log.lock().last_seq))
    }

    async fn append(&self, draft: MessageDraft) -> Result<Message> {
        self.round_trip().await?;
        let mut log = self.log.lock();
        log.last_seq += 1;
        let message = Message::from_draft(draft, MessageId::generate(), Seq(log.last_seq));
        log.messages.push(message.clone());
        Ok(message)
    }

    async fn measure_distance(&self) -> Distance {
        if !self.reachable.load(Ordering::SeqCst) {
            return Distance::Unreachable;
        }
        let latency = *self.latency.lock();
        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }
        Distance::Reachable(latency)
    }
}
