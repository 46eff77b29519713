//! Best-effort durable log mirroring
//!
//! Ingest sessions hand each chunk to a [`LogSink`], which queues it for a
//! background worker without waiting. The worker hands records to a
//! [`LogBackend`] in queue order and keeps up to
//! [`SinkConfig::max_in_flight`] acknowledgements outstanding, so a slow
//! broker round trip does not stall the queue. A full queue drops the record
//! and a backend failure is logged; neither is ever reported to the producer
//! or affects live delivery.
//!
//! ```text
//!   IngestSession ──publish()──► [bounded queue] ──► worker ──► LogBackend
//!   IngestSession ──publish()──┘                                (Kafka, ...)
//! ```

pub mod config;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod topic;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::registry::StreamId;

pub use config::SinkConfig;
#[cfg(feature = "kafka")]
pub use kafka::KafkaBackend;
pub use memory::MemoryBackend;
pub use topic::TopicMap;

/// Error type for log backends
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// Backend rejected or failed to deliver a record
    #[error("log backend error: {0}")]
    Backend(String),

    /// Backend could not be constructed
    #[error("log sink configuration error: {0}")]
    Config(String),
}

/// A single record bound for the durable log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub topic: String,
    pub payload: Bytes,
}

/// Destination for mirrored chunks
pub trait LogBackend: Send + Sync + 'static {
    /// Write one record
    ///
    /// The record must be handed to the backend before this returns; the
    /// returned future only waits for the acknowledgement. Records therefore
    /// keep their queue order even while several acknowledgements are
    /// outstanding.
    fn send(&self, record: LogRecord) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Sink counters
#[derive(Debug, Default)]
struct SinkCounters {
    queued: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of sink counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SinkStats {
    /// Records accepted into the worker queue
    pub queued: u64,
    /// Records discarded because the queue was full
    pub dropped: u64,
}

/// Cloneable, non-blocking handle to the sink worker
#[derive(Clone)]
pub struct LogSink {
    tx: Option<mpsc::Sender<LogRecord>>,
    topics: Arc<TopicMap>,
    counters: Arc<SinkCounters>,
}

impl LogSink {
    /// A sink that discards everything (broadcast-only operation)
    pub fn disabled() -> Self {
        Self {
            tx: None,
            topics: Arc::new(TopicMap::new()),
            counters: Arc::default(),
        }
    }

    /// Start a worker draining into `backend`
    ///
    /// The worker exits once every clone of the returned sink is dropped.
    pub fn spawn<B: LogBackend>(backend: B, config: &SinkConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let handle = tokio::spawn(run_worker(backend, rx, config.max_in_flight.max(1)));

        let sink = Self {
            tx: Some(tx),
            topics: Arc::new(config.topics.clone()),
            counters: Arc::default(),
        };

        (sink, handle)
    }

    /// Whether records are forwarded anywhere
    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Topic a stream's chunks are written to
    pub fn topic_for(&self, id: &StreamId) -> String {
        self.topics.topic(id)
    }

    /// Queue a record for the worker without waiting
    pub fn publish(&self, topic: &str, payload: Bytes) {
        let Some(tx) = &self.tx else {
            return;
        };

        let record = LogRecord {
            topic: topic.to_string(),
            payload,
        };

        match tx.try_send(record) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(record)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    topic = %record.topic,
                    size = record.payload.len(),
                    "Log sink queue full, dropping record"
                );
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(topic = %topic, "Log sink worker gone, record discarded");
            }
        }
    }

    /// Queue a chunk under its stream's topic
    pub fn publish_chunk(&self, id: &StreamId, payload: Bytes) {
        if self.is_enabled() {
            self.publish(&self.topic_for(id), payload);
        }
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker<B: LogBackend>(backend: B, rx: mpsc::Receiver<LogRecord>, max_in_flight: usize) {
    tracing::debug!(max_in_flight = max_in_flight, "Log sink worker started");

    let backend = &backend;
    let records = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|record| (record, rx))
    });

    records
        .for_each_concurrent(max_in_flight, move |record| {
            let topic = record.topic.clone();
            let ack = backend.send(record);
            async move {
                match ack.await {
                    Ok(()) => {
                        tracing::trace!(topic = %topic, "Record written to log");
                    }
                    Err(e) => {
                        tracing::warn!(topic = %topic, error = %e, "Log publish failed");
                    }
                }
            }
        })
        .await;

    tracing::debug!("Log sink worker stopped");
}
