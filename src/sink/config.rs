//! Log sink configuration

use std::time::Duration;

use super::topic::TopicMap;

/// Durable log mirroring options
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Broker bootstrap list; `None` disables mirroring
    pub brokers: Option<String>,

    /// Client id reported to the broker
    pub client_id: String,

    /// How long the backend may hold a record before giving up
    pub message_timeout: Duration,

    /// Records buffered between ingest sessions and the sink worker
    pub queue_capacity: usize,

    /// Backend acknowledgements the worker may wait on at once
    pub max_in_flight: usize,

    /// Stream identifier to topic mapping
    pub topics: TopicMap,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            brokers: None,
            client_id: "media-relay".to_string(),
            message_timeout: Duration::from_secs(5),
            queue_capacity: 1024,
            max_in_flight: 64,
            topics: TopicMap::new(),
        }
    }
}

impl SinkConfig {
    /// Enable mirroring to the given brokers
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the worker queue capacity (minimum 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the number of outstanding backend acknowledgements (minimum 1)
    pub fn max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }

    /// Set the backend message timeout
    pub fn message_timeout(mut self, timeout: Duration) -> Self {
        self.message_timeout = timeout;
        self
    }

    /// Replace the topic mapping
    pub fn topics(mut self, topics: TopicMap) -> Self {
        self.topics = topics;
        self
    }
}
