//! Stream registry implementation
//!
//! The central registry that maps stream identifiers to channels and fans
//! chunks out from producers to consumers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, RwLock};

use super::channel::{ChannelStats, StreamChannel};
use super::config::RegistryConfig;
use super::consumer::{consumer_pair, ConsumerHandle, ConsumerId, ConsumerQueue};
use super::error::RegistryError;
use super::frame::{Delivery, Published, StreamId};
use super::producer::ProducerLease;

/// Central registry for all streams
///
/// The outer `RwLock` only guards the identifier map and is held briefly;
/// each channel has its own `Mutex`, so unrelated streams never contend.
pub struct StreamRegistry {
    /// Map of stream identifier to channel
    channels: RwLock<HashMap<StreamId, Arc<Mutex<StreamChannel>>>>,

    next_consumer_id: AtomicU64,

    /// Configuration
    config: RegistryConfig,
}

impl StreamRegistry {
    /// Create a new stream registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new stream registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            next_consumer_id: AtomicU64::new(1),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Get the channel for a stream, creating it on first use
    async fn channel(&self, id: &StreamId) -> Arc<Mutex<StreamChannel>> {
        if let Some(channel) = self.channels.read().await.get(id) {
            return Arc::clone(channel);
        }

        let mut channels = self.channels.write().await;
        let channel = channels.entry(id.clone()).or_insert_with(|| {
            tracing::debug!(stream = %id, "Channel created");
            Arc::new(Mutex::new(StreamChannel::new(id.clone())))
        });
        Arc::clone(channel)
    }

    /// Get the channel for a stream only if it already exists
    async fn existing_channel(&self, id: &StreamId) -> Option<Arc<Mutex<StreamChannel>>> {
        self.channels.read().await.get(id).map(Arc::clone)
    }

    /// Allocate a consumer with a fresh identity and a bounded outbound queue
    pub fn new_consumer(&self) -> (ConsumerHandle, ConsumerQueue) {
        let id = ConsumerId(self.next_consumer_id.fetch_add(1, Ordering::Relaxed));
        consumer_pair(id, self.config.consumer_queue_capacity)
    }

    /// Attach a producer session to a stream
    ///
    /// Starts a fresh session: the sequence counter restarts at zero and any
    /// cached init segment is discarded. A session that was already attached
    /// is displaced and notified through its lease; from then on its chunks
    /// are refused.
    pub async fn attach_producer(&self, id: &StreamId, session_id: u64) -> ProducerLease {
        let channel = self.channel(id).await;
        let mut channel = channel.lock().await;

        let (lease, previous) = channel.replace_producer(session_id);
        channel.reset();

        match previous {
            Some(previous) => tracing::warn!(
                stream = %id,
                session_id = session_id,
                displaced = previous,
                consumers = channel.consumer_count(),
                "Producer took over stream"
            ),
            None => tracing::info!(
                stream = %id,
                session_id = session_id,
                consumers = channel.consumer_count(),
                "Producer attached"
            ),
        }

        lease
    }

    /// Detach a producer session and reset the channel
    ///
    /// Ignored if `session_id` is not the attached producer, so a late
    /// cleanup can never wipe a newer session's init segment. Returns
    /// whether the channel was reset.
    pub async fn detach_producer(&self, id: &StreamId, session_id: u64) -> bool {
        let Some(channel) = self.existing_channel(id).await else {
            return false;
        };
        let mut channel = channel.lock().await;

        if channel.producer_id() != Some(session_id) {
            tracing::debug!(
                stream = %id,
                attached = ?channel.producer_id(),
                session_id = session_id,
                "Ignoring detach from a session that is not attached"
            );
            return false;
        }

        channel.clear_producer();
        channel.reset();

        tracing::info!(
            stream = %id,
            session_id = session_id,
            consumers = channel.consumer_count(),
            "Producer detached, channel reset"
        );

        true
    }

    /// Register a consumer on a stream
    ///
    /// The cached init segment, if any, is queued to the consumer before the
    /// channel lock is released, so it always precedes live chunks. Returns
    /// whether a segment was replayed.
    pub async fn register(&self, id: &StreamId, consumer: ConsumerHandle) -> bool {
        let consumer_id = consumer.id();
        let channel = self.channel(id).await;
        let mut channel = channel.lock().await;

        let replayed = channel.add_consumer(consumer);

        tracing::info!(
            stream = %id,
            consumer = %consumer_id,
            consumers = channel.consumer_count(),
            replayed = replayed,
            "Consumer registered"
        );

        replayed
    }

    /// Remove a consumer from a stream
    ///
    /// Idempotent: removing an absent consumer is a no-op.
    pub async fn unregister(&self, id: &StreamId, consumer_id: ConsumerId) {
        let Some(channel) = self.existing_channel(id).await else {
            return;
        };
        let mut channel = channel.lock().await;

        if channel.remove_consumer(consumer_id) {
            tracing::info!(
                stream = %id,
                consumer = %consumer_id,
                consumers = channel.consumer_count(),
                "Consumer unregistered"
            );
        }
    }

    /// Broadcast a payload to all consumers of a stream
    ///
    /// If `is_init`, the payload replaces the cached init segment first.
    /// Consumers that cannot accept the payload are removed; the rest are
    /// unaffected.
    pub async fn broadcast(&self, id: &StreamId, payload: Bytes, is_init: bool) -> Delivery {
        let channel = self.channel(id).await;
        let mut channel = channel.lock().await;
        channel.deliver(payload, is_init, self.config.max_init_segment_size)
    }

    /// Classify and broadcast a chunk from the attached producer
    ///
    /// The first chunk after a reset is the init segment. Classification and
    /// fan-out happen under one lock so sequence order is broadcast order.
    /// Chunks from any session other than the attached one are refused.
    pub async fn publish(
        &self,
        id: &StreamId,
        session_id: u64,
        payload: Bytes,
    ) -> Result<Published, RegistryError> {
        let channel = self.channel(id).await;
        let mut channel = channel.lock().await;

        if channel.producer_id() != Some(session_id) {
            return Err(RegistryError::NotProducer {
                stream: id.clone(),
                session_id,
            });
        }

        let seq = channel.next_seq();
        let is_init = seq == 0;
        let delivery = channel.deliver(payload, is_init, self.config.max_init_segment_size);

        Ok(Published {
            seq,
            is_init,
            delivery,
        })
    }

    /// Clear the cached init segment and restart the chunk sequence
    pub async fn reset_channel(&self, id: &StreamId) {
        if let Some(channel) = self.existing_channel(id).await {
            channel.lock().await.reset();
            tracing::debug!(stream = %id, "Channel reset");
        }
    }

    /// Get the cached init segment for a stream
    pub async fn init_segment(&self, id: &StreamId) -> Option<Bytes> {
        let channel = self.existing_channel(id).await?;
        let channel = channel.lock().await;
        channel.init_segment().cloned()
    }

    /// Check whether a consumer is currently registered on a stream
    pub async fn is_registered(&self, id: &StreamId, consumer_id: ConsumerId) -> bool {
        match self.existing_channel(id).await {
            Some(channel) => channel.lock().await.has_consumer(consumer_id),
            None => false,
        }
    }

    /// Get stream statistics
    pub async fn channel_stats(&self, id: &StreamId) -> Option<ChannelStats> {
        let channel = self.existing_channel(id).await?;
        let stats = channel.lock().await.stats();
        Some(stats)
    }

    /// Get statistics for every known stream
    pub async fn all_stats(&self) -> Vec<(StreamId, ChannelStats)> {
        let channels: Vec<_> = self
            .channels
            .read()
            .await
            .iter()
            .map(|(id, channel)| (id.clone(), Arc::clone(channel)))
            .collect();

        let mut stats = Vec::with_capacity(channels.len());
        for (id, channel) in channels {
            stats.push((id, channel.lock().await.stats()));
        }
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    /// Get total number of streams
    pub async fn stream_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}
