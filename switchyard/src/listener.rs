//! Listener/Poller: turns repeated store polling into one ordered,
//! deduplicated push stream
//!
//! One background task polls the cluster store on a timer, keeps a monotonic
//! sequence cursor, and republishes every new message to any number of
//! subscribers. The cursor only advances after a batch has been emitted, so a
//! restart re-polls from the last committed cursor: delivery is at-least-once,
//! and duplicates are absorbed downstream.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use switchyard_core::{Error, Message, PartyId, Seq, Topic};
use switchyard_store::{ClusterStore, Store};

use crate::bus::{EventBus, Subscription};

/// One item on a listener stream
#[derive(Debug, Clone)]
pub enum ListenerEvent {
    /// A message observed from the store, in global sequence order
    Message(Message),
    /// Every store node is unreachable. Emitted once per outage; normal
    /// polling resumes silently when a node comes back.
    Unavailable(String),
}

/// Restricts which store messages a listener republishes.
///
/// A destination filter passes broadcast messages (no destination) as well as
/// messages addressed to the party.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub topic: Option<Topic>,
    pub destination: Option<PartyId>,
}

impl MessageFilter {
    /// Pass every message
    #[must_use]
    pub const fn all() -> Self {
        Self {
            topic: None,
            destination: None,
        }
    }

    #[must_use]
    pub const fn for_topic(topic: Topic) -> Self {
        Self {
            topic: Some(topic),
            destination: None,
        }
    }

    #[must_use]
    pub fn with_destination(mut self, destination: PartyId) -> Self {
        self.destination = Some(destination);
        self
    }

    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        if let Some(topic) = &self.topic {
            if &message.topic != topic {
                return false;
            }
        }
        if let Some(destination) = &self.destination {
            if !message.is_for(destination) {
                return false;
            }
        }
        true
    }
}

/// Timer-driven poll loop republishing store changes to subscribers
pub struct Listener {
    store: Arc<ClusterStore>,
    filter: MessageFilter,
    bus: EventBus<ListenerEvent>,
    poll_interval: Mutex<Duration>,
    cancel_token: CancellationToken,
    started: AtomicBool,
}

impl Listener {
    #[must_use]
    pub fn new(store: Arc<ClusterStore>, filter: MessageFilter, poll_interval: Duration) -> Self {
        Self {
            store,
            filter,
            bus: EventBus::new(),
            poll_interval: Mutex::new(poll_interval),
            cancel_token: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Register a consumer. Every subscriber observes the identical event
    /// sequence, in poll (global sequence) order.
    pub fn subscribe(&self) -> Subscription<ListenerEvent> {
        self.bus.subscribe()
    }

    /// The inter-poll delay: the single latency/throughput tuning knob.
    /// Larger values batch more messages per poll; smaller values cut
    /// latency at the cost of store load. Takes effect from the next tick.
    pub fn set_poll_interval(&self, poll_interval: Duration) {
        *self.poll_interval.lock() = poll_interval;
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        *self.poll_interval.lock()
    }

    /// Start the poll loop. Polls are strictly sequential: the next tick
    /// cannot begin before the previous fetch and its emission complete.
    /// Idempotent; only the first call spawns the loop.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return tokio::spawn(async {});
        }

        let listener = self.clone();
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            // Observe only traffic appended after start
            let mut cursor: Option<Seq> = None;
            let mut outage_reported = false;

            loop {
                let delay = listener.poll_interval();
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        info!("Listener shutting down");
                        listener.bus.close();
                        return;
                    }
                    () = tokio::time::sleep(delay) => {
                        listener.poll(&mut cursor, &mut outage_reported).await;
                    }
                }
            }
        })
    }

    /// One poll tick: fetch everything past the cursor, emit, then advance.
    async fn poll(&self, cursor: &mut Option<Seq>, outage_reported: &mut bool) {
        let since = match *cursor {
            Some(seq) => seq,
            None => match self.store.last_seq().await {
                Ok(seq) => {
                    debug!(start_seq = seq.0, "Listener initialized cursor");
                    *cursor = Some(seq);
                    seq
                }
                Err(e) => {
                    self.report_fetch_error(&e, outage_reported);
                    return;
                }
            },
        };

        match self.store.get_changes(since).await {
            Ok(changes) => {
                *outage_reported = false;

                let mut messages = changes.messages;
                // The store contract is ascending order; enforce before emitting
                messages.sort_by_key(|m| m.seq);
                for message in messages {
                    if self.filter.matches(&message) {
                        trace!(seq = message.seq.0, topic = %message.topic, "Emitting message");
                        self.bus.publish(&ListenerEvent::Message(message));
                    }
                }

                // Advance only after emission, and never backwards
                if changes.last_seq > since {
                    *cursor = Some(changes.last_seq);
                }
            }
            Err(e) => self.report_fetch_error(&e, outage_reported),
        }
    }

    /// A failed fetch never advances the cursor. Transient errors are left to
    /// selector failover and retried next tick; only total unavailability
    /// reaches subscribers, once per outage.
    fn report_fetch_error(&self, error: &Error, outage_reported: &mut bool) {
        if matches!(error, Error::NoReachableNode) {
            warn!("Poll failed: no reachable store node");
            if !*outage_reported {
                *outage_reported = true;
                self.bus
                    .publish(&ListenerEvent::Unavailable(error.to_string()));
            }
        } else {
            warn!(error = %error, "Poll failed, retrying next tick");
        }
    }

    /// Stop the poll loop. An in-flight poll finishes; no emissions occur
    /// afterwards.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
