//! Kafka Bus Adapter
//!
//! `rdkafka` implementations of the bus ports, compiled with the `kafka`
//! feature.
//!
//! - [`KafkaPublisher`]: threaded producer, fire-and-forget. Asynchronous
//!   delivery failures surface in [`LoggingProducerContext`] and are logged.
//! - [`KafkaSubscriber`]: stream consumer in a fixed group with
//!   `auto.offset.reset=earliest` and auto commit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Header, Headers, OwnedHeaders};
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use rdkafka::{ClientContext, Message};

use crate::application::ports::{
    BusError, BusMessage, EventPublisherPort, EventSubscriberPort, MessageHeaders,
};
use crate::infrastructure::config::BusSettings;

// =============================================================================
// Header Conversion
// =============================================================================

fn to_kafka_headers(headers: &MessageHeaders) -> OwnedHeaders {
    headers
        .iter()
        .fold(OwnedHeaders::new_with_capacity(headers.len()), |acc, h| {
            acc.insert(Header {
                key: h.key.as_str(),
                value: Some(h.value.as_slice()),
            })
        })
}

fn from_kafka_message(message: &BorrowedMessage<'_>) -> BusMessage {
    let headers: MessageHeaders = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|h| (h.key.to_string(), h.value.map(<[u8]>::to_vec).unwrap_or_default()))
                .collect()
        })
        .unwrap_or_default();

    let key = message
        .key()
        .and_then(|k| std::str::from_utf8(k).ok())
        .map(str::to_string);

    BusMessage::new(
        message.topic(),
        key,
        message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        headers,
    )
    .with_position(message.partition(), message.offset())
}

fn connection_error(error: &KafkaError) -> BusError {
    BusError::Connection {
        message: error.to_string(),
    }
}

/// Errors `recv` reports for a single message or partition while the client
/// keeps working, such as a topic that does not exist yet.
const fn is_recoverable(error: &KafkaError) -> bool {
    matches!(
        error,
        KafkaError::MessageConsumption(_) | KafkaError::PartitionEOF(_)
    )
}

fn recv_error(error: &KafkaError) -> Result<(), BusError> {
    if is_recoverable(error) {
        tracing::warn!(error = %error, "Consumer error, continuing");
        Ok(())
    } else {
        Err(connection_error(error))
    }
}

// =============================================================================
// Publisher
// =============================================================================

/// Producer context that logs asynchronous delivery outcomes.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProducerContext;

impl ClientContext for LoggingProducerContext {}

impl ProducerContext for LoggingProducerContext {
    type DeliveryOpaque = ();

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, _opaque: Self::DeliveryOpaque) {
        match delivery_result {
            Ok(message) => tracing::debug!(
                topic = message.topic(),
                partition = message.partition(),
                offset = message.offset(),
                "Message delivered"
            ),
            Err((error, message)) => tracing::warn!(
                topic = message.topic(),
                error = %error,
                "Message delivery failed"
            ),
        }
    }
}

/// Kafka implementation of [`EventPublisherPort`].
#[derive(Clone)]
pub struct KafkaPublisher {
    producer: Arc<ThreadedProducer<LoggingProducerContext>>,
}

impl KafkaPublisher {
    /// Connect a producer to the configured bootstrap servers.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created.
    pub fn connect(settings: &BusSettings) -> Result<Self, BusError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", &settings.bootstrap_servers)
            .create_with_context(LoggingProducerContext)
            .map_err(|e| connection_error(&e))?;
        Ok(Self {
            producer: Arc::new(producer),
        })
    }
}

#[async_trait]
impl EventPublisherPort for KafkaPublisher {
    async fn send(&self, message: BusMessage) -> Result<(), BusError> {
        let mut record = BaseRecord::to(&message.topic)
            .payload(&message.payload)
            .headers(to_kafka_headers(&message.headers));
        if let Some(key) = &message.key {
            record = record.key(key);
        }

        self.producer.send(record).map_err(|(e, _)| BusError::Send {
            message: e.to_string(),
        })
    }

    async fn flush(&self, timeout: Duration) -> Result<(), BusError> {
        let producer = Arc::clone(&self.producer);
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| BusError::Send {
                message: format!("flush task failed: {e}"),
            })?
            .map_err(|e| BusError::Send {
                message: e.to_string(),
            })
    }
}

impl std::fmt::Debug for KafkaPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaPublisher").finish_non_exhaustive()
    }
}

// =============================================================================
// Subscriber
// =============================================================================

/// Kafka implementation of [`EventSubscriberPort`].
pub struct KafkaSubscriber {
    consumer: StreamConsumer,
    subscribed: bool,
    max_batch: usize,
}

impl KafkaSubscriber {
    /// Create a consumer in the configured group.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created.
    pub fn connect(settings: &BusSettings, max_batch: usize) -> Result<Self, BusError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &settings.bootstrap_servers)
            .set("group.id", &settings.group_id)
            .set("auto.offset.reset", &settings.auto_offset_reset)
            .set("enable.auto.commit", "true")
            .create()
            .map_err(|e| connection_error(&e))?;
        Ok(Self {
            consumer,
            subscribed: false,
            max_batch: max_batch.max(1),
        })
    }
}

#[async_trait]
impl EventSubscriberPort for KafkaSubscriber {
    async fn subscribe(&mut self, topic: &str) -> Result<(), BusError> {
        self.consumer
            .subscribe(&[topic])
            .map_err(|e| BusError::Subscribe {
                topic: topic.to_string(),
                message: e.to_string(),
            })?;
        self.subscribed = true;
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Vec<BusMessage>, BusError> {
        if !self.subscribed {
            return Err(BusError::NotSubscribed);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let mut batch = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, self.consumer.recv()).await {
                Err(_) => return Ok(batch),
                Ok(Ok(message)) => {
                    batch.push(from_kafka_message(&message));
                    break;
                }
                Ok(Err(e)) => recv_error(&e)?,
            }
        }

        // Drain whatever is already buffered without waiting again
        while batch.len() < self.max_batch {
            match tokio::time::timeout(Duration::ZERO, self.consumer.recv()).await {
                Ok(Ok(message)) => batch.push(from_kafka_message(&message)),
                Ok(Err(e)) => {
                    recv_error(&e)?;
                    break;
                }
                Err(_) => break,
            }
        }
        Ok(batch)
    }
}

impl std::fmt::Debug for KafkaSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaSubscriber")
            .field("subscribed", &self.subscribed)
            .field("max_batch", &self.max_batch)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::error::RDKafkaErrorCode;

    #[test]
    fn headers_convert_in_order_with_duplicates() {
        let headers = MessageHeaders::new()
            .with("traceparent", "a")
            .with("traceparent", "b");

        let kafka = to_kafka_headers(&headers);
        assert_eq!(kafka.count(), 2);
        assert_eq!(kafka.get(1).key, "traceparent");
        assert_eq!(kafka.get(1).value, Some(&b"b"[..]));
    }

    #[test]
    fn connection_errors_are_fatal() {
        let err = connection_error(&KafkaError::Subscription("bad topic".into()));
        assert!(err.is_fatal());
    }

    #[test]
    fn missing_topic_keeps_polling() {
        let err = KafkaError::MessageConsumption(RDKafkaErrorCode::UnknownTopicOrPartition);
        assert!(recv_error(&err).is_ok());
        assert!(recv_error(&KafkaError::PartitionEOF(0)).is_ok());
    }

    #[test]
    fn client_errors_stop_polling() {
        let err = recv_error(&KafkaError::ClientCreation("no brokers".into())).unwrap_err();
        assert!(err.is_fatal());
    }
}
