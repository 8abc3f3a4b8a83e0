//! Message Bus Port (Driven Port)
//!
//! Bus-neutral message envelope and the publish/subscribe interfaces that
//! bus adapters (in-memory, Kafka) implement.

use std::time::Duration;

use async_trait::async_trait;

// =============================================================================
// Headers
// =============================================================================

/// A single message header. Keys may repeat within one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header key.
    pub key: String,
    /// Raw header value.
    pub value: Vec<u8>,
}

/// Ordered header list attached to a bus message.
///
/// Mirrors the bus's native model: insertion order is kept and duplicate keys
/// are allowed. Lookups resolve to the last value for a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    entries: Vec<Header>,
}

impl MessageHeaders {
    /// Create an empty header list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a header, keeping earlier values for the same key.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.entries.push(Header {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Builder form of [`add`](Self::add).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.add(key, value);
        self
    }

    /// Last raw value for `key`.
    #[must_use]
    pub fn last(&self, key: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .rev()
            .find(|h| h.key == key)
            .map(|h| h.value.as_slice())
    }

    /// Last value for `key`, if it is valid UTF-8.
    #[must_use]
    pub fn last_str(&self, key: &str) -> Option<&str> {
        self.last(key).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Distinct keys in first-seen order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::with_capacity(self.entries.len());
        for header in &self.entries {
            if !keys.contains(&header.key.as_str()) {
                keys.push(header.key.as_str());
            }
        }
        keys
    }

    /// All headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    /// Number of headers, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Vec<u8>)> for MessageHeaders {
    fn from_iter<T: IntoIterator<Item = (String, Vec<u8>)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, value)| Header { key, value })
                .collect(),
        }
    }
}

// =============================================================================
// Message Envelope
// =============================================================================

/// A message as sent to or received from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Topic the message belongs to.
    pub topic: String,
    /// Partitioning key (the instrument symbol for price actions).
    pub key: Option<String>,
    /// Encoded payload.
    pub payload: Vec<u8>,
    /// Headers, including the trace-context carrier.
    pub headers: MessageHeaders,
    /// Partition, set on received messages.
    pub partition: Option<i32>,
    /// Offset within the partition, set on received messages.
    pub offset: Option<i64>,
}

impl BusMessage {
    /// Create an outbound message.
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        key: Option<String>,
        payload: Vec<u8>,
        headers: MessageHeaders,
    ) -> Self {
        Self {
            topic: topic.into(),
            key,
            payload,
            headers,
            partition: None,
            offset: None,
        }
    }

    /// Stamp the delivery position of a received message.
    #[must_use]
    pub fn with_position(mut self, partition: i32, offset: i64) -> Self {
        self.partition = Some(partition);
        self.offset = Some(offset);
        self
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Message bus error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BusError {
    /// Connection to the bus failed or was lost.
    #[error("bus connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// The bus was shut down.
    #[error("bus is closed")]
    Closed,

    /// Poll was called before subscribing.
    #[error("poll called before subscribe")]
    NotSubscribed,

    /// Subscription was rejected.
    #[error("subscribe to topic {topic} failed: {message}")]
    Subscribe {
        /// Requested topic.
        topic: String,
        /// Error details.
        message: String,
    },

    /// A message could not be handed to the bus.
    #[error("send failed: {message}")]
    Send {
        /// Error details.
        message: String,
    },
}

impl BusError {
    /// Whether the error ends a consumption loop.
    ///
    /// Everything except a per-message send failure is fatal.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Send { .. })
    }
}

// =============================================================================
// Ports
// =============================================================================

/// Outbound side of the bus.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisherPort: Send + Sync {
    /// Hand a message to the bus.
    ///
    /// Fire-and-forget: returning `Ok` means the message was accepted, not
    /// that the broker acknowledged it.
    async fn send(&self, message: BusMessage) -> Result<(), BusError>;

    /// Wait up to `timeout` for accepted messages to leave the process.
    async fn flush(&self, timeout: Duration) -> Result<(), BusError>;
}

/// Inbound side of the bus.
#[async_trait]
pub trait EventSubscriberPort: Send {
    /// Subscribe to a topic.
    async fn subscribe(&mut self, topic: &str) -> Result<(), BusError>;

    /// Wait at most `timeout` for a batch of messages.
    ///
    /// An empty batch is a normal result. Any error is a failure of the
    /// underlying connection.
    async fn poll(&mut self, timeout: Duration) -> Result<Vec<BusMessage>, BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_value_wins() {
        let headers = MessageHeaders::new()
            .with("traceparent", "first")
            .with("other", "x")
            .with("traceparent", "second");

        assert_eq!(headers.last_str("traceparent"), Some("second"));
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn keys_are_distinct_in_first_seen_order() {
        let headers = MessageHeaders::new()
            .with("b", "1")
            .with("a", "2")
            .with("b", "3");

        assert_eq!(headers.keys(), vec!["b", "a"]);
    }

    #[test]
    fn missing_key_is_none() {
        let headers = MessageHeaders::new();
        assert!(headers.is_empty());
        assert_eq!(headers.last("traceparent"), None);
    }

    #[test]
    fn non_utf8_value_is_not_a_string() {
        let headers = MessageHeaders::new().with("bin", vec![0xff_u8, 0xfe]);
        assert_eq!(headers.last("bin"), Some(&[0xff_u8, 0xfe][..]));
        assert_eq!(headers.last_str("bin"), None);
    }

    #[test]
    fn collects_from_pairs() {
        let headers: MessageHeaders = vec![("k".to_string(), b"v".to_vec())]
            .into_iter()
            .collect();
        assert_eq!(headers.last_str("k"), Some("v"));
    }

    #[test]
    fn position_is_stamped() {
        let message = BusMessage::new("price-action", Some("AAPL".into()), vec![], MessageHeaders::new())
            .with_position(2, 41);
        assert_eq!(message.partition, Some(2));
        assert_eq!(message.offset, Some(41));
    }

    #[test]
    fn only_send_errors_are_recoverable() {
        assert!(!BusError::Send { message: "queue full".into() }.is_fatal());
        assert!(BusError::Closed.is_fatal());
        assert!(BusError::NotSubscribed.is_fatal());
        assert!(
            BusError::Connection {
                message: "broker down".into()
            }
            .is_fatal()
        );
    }
}
