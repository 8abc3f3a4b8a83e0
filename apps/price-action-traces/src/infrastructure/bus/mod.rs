//! In-Memory Message Bus
//!
//! Process-local bus used by the demo binary and tests. Semantics follow a
//! single-partition topic consumed by one group:
//!
//! - every topic is a FIFO queue; offsets start at 0 and increase per topic
//! - a polled message is removed, so subscribers on the same topic compete
//! - [`InMemoryBus::close`] makes further subscribes and polls fail with
//!   [`BusError::Closed`], which is fatal to a consumption loop
//!
//! Pollers park on a [`Notify`] and wake on send or close, bounded by the
//! poll timeout.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::application::ports::{BusError, BusMessage, EventPublisherPort, EventSubscriberPort};

/// Default maximum messages returned by one poll.
pub const DEFAULT_MAX_BATCH: usize = 500;

/// The only partition of an in-memory topic.
const PARTITION: i32 = 0;

#[derive(Debug, Default)]
struct TopicQueue {
    pending: VecDeque<BusMessage>,
    next_offset: i64,
}

#[derive(Debug, Default)]
struct BusState {
    topics: HashMap<String, TopicQueue>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<BusState>,
    notify: Notify,
}

/// Shared in-memory bus. Cloning yields another handle to the same bus.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBus {
    shared: Arc<Shared>,
}

impl InMemoryBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishing handle.
    #[must_use]
    pub fn publisher(&self) -> InMemoryPublisher {
        InMemoryPublisher {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Subscribing handle returning at most [`DEFAULT_MAX_BATCH`] per poll.
    #[must_use]
    pub fn subscriber(&self) -> InMemorySubscriber {
        InMemorySubscriber {
            shared: Arc::clone(&self.shared),
            topics: Vec::new(),
            max_batch: DEFAULT_MAX_BATCH,
        }
    }

    /// Shut the bus down and wake every poller.
    pub fn close(&self) {
        self.shared.state.lock().closed = true;
        self.shared.notify.notify_waiters();
    }

    /// Whether [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Messages sent to `topic` and not yet polled.
    #[must_use]
    pub fn pending(&self, topic: &str) -> usize {
        self.shared
            .state
            .lock()
            .topics
            .get(topic)
            .map_or(0, |queue| queue.pending.len())
    }
}

// =============================================================================
// Publisher
// =============================================================================

/// Publishing side of an [`InMemoryBus`].
#[derive(Debug, Clone)]
pub struct InMemoryPublisher {
    shared: Arc<Shared>,
}

#[async_trait]
impl EventPublisherPort for InMemoryPublisher {
    async fn send(&self, message: BusMessage) -> Result<(), BusError> {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(BusError::Send {
                    message: "bus is closed".to_string(),
                });
            }
            let queue = state.topics.entry(message.topic.clone()).or_default();
            let offset = queue.next_offset;
            queue.next_offset += 1;
            queue.pending.push_back(message.with_position(PARTITION, offset));
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), BusError> {
        Ok(())
    }
}

// =============================================================================
// Subscriber
// =============================================================================

/// Subscribing side of an [`InMemoryBus`].
#[derive(Debug)]
pub struct InMemorySubscriber {
    shared: Arc<Shared>,
    topics: Vec<String>,
    max_batch: usize,
}

impl InMemorySubscriber {
    /// Cap the number of messages returned per poll (minimum 1).
    #[must_use]
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    fn drain(&self) -> Result<Vec<BusMessage>, BusError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(BusError::Closed);
        }

        let mut batch = Vec::new();
        for topic in &self.topics {
            let Some(queue) = state.topics.get_mut(topic) else {
                continue;
            };
            let take = queue.pending.len().min(self.max_batch - batch.len());
            batch.extend(queue.pending.drain(..take));
            if batch.len() == self.max_batch {
                break;
            }
        }
        Ok(batch)
    }
}

#[async_trait]
impl EventSubscriberPort for InMemorySubscriber {
    async fn subscribe(&mut self, topic: &str) -> Result<(), BusError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(BusError::Closed);
        }
        state.topics.entry(topic.to_string()).or_default();
        if !self.topics.iter().any(|t| t == topic) {
            self.topics.push(topic.to_string());
        }
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Vec<BusMessage>, BusError> {
        if self.topics.is_empty() {
            return Err(BusError::NotSubscribed);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before checking so a send in between is not missed
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let batch = self.drain()?;
            if !batch.is_empty() {
                return Ok(batch);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }
}
