//! Kafka log backend
//!
//! Writes each chunk as one raw binary message to its stream's topic.

use std::future::Future;

use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};

use super::{LogBackend, LogRecord, SinkConfig, SinkError};

/// Kafka producer wrapper
#[derive(Clone)]
pub struct KafkaBackend {
    producer: FutureProducer,
}

impl KafkaBackend {
    pub fn new(brokers: &str, config: &SinkConfig) -> Result<Self, SinkError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("client.id", &config.client_id)
            .set(
                "message.timeout.ms",
                config.message_timeout.as_millis().to_string(),
            )
            .set("queue.buffering.max.messages", "100000")
            .set("acks", "1")
            .create()
            .map_err(|e| SinkError::Config(format!("failed to create Kafka producer: {}", e)))?;

        tracing::info!(
            brokers = %brokers,
            client_id = %config.client_id,
            "Kafka log backend initialized"
        );

        Ok(Self { producer })
    }
}

impl LogBackend for KafkaBackend {
    fn send(&self, record: LogRecord) -> impl Future<Output = Result<(), SinkError>> + Send {
        // Enqueued with librdkafka here; delivery is bounded by message.timeout.ms
        let delivery = self
            .producer
            .send_result(FutureRecord::<(), [u8]>::to(&record.topic).payload(record.payload.as_ref()))
            .map_err(|(e, _)| SinkError::Backend(e.to_string()));
        let topic = record.topic;

        async move {
            match delivery?.await {
                Ok(Ok((partition, offset))) => {
                    tracing::trace!(
                        topic = %topic,
                        partition = partition,
                        offset = offset,
                        "Chunk written to Kafka"
                    );
                    Ok(())
                }
                Ok(Err((e, _))) => Err(SinkError::Backend(e.to_string())),
                Err(_) => Err(SinkError::Backend("delivery canceled".into())),
            }
        }
    }
}
