//! Per-stream channel state
//!
//! This module defines the state the registry keeps for one stream
//! identifier: the consumer set, the cached init segment, and the chunk
//! sequence counter of the current producer session.

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;

use super::consumer::{ConsumerHandle, ConsumerId, EnqueueError};
use super::frame::{Delivery, StreamId};
use super::producer::{ProducerLease, ProducerSlot};

/// State for a single stream
///
/// All mutation happens under the registry's per-channel lock.
pub struct StreamChannel {
    id: StreamId,

    /// Registered consumers, keyed by connection identity
    consumers: HashMap<ConsumerId, ConsumerHandle>,

    /// First chunk of the current producer session
    init_segment: Option<Bytes>,

    /// Chunks seen since the current producer session began
    chunk_seq: u64,

    /// Attached producer session (None if no producer)
    producer: Option<ProducerSlot>,

    chunks_relayed: u64,
    bytes_relayed: u64,
    consumers_dropped: u64,

    /// When the channel was first used
    created_at: Instant,
}

impl StreamChannel {
    pub(super) fn new(id: StreamId) -> Self {
        Self {
            id,
            consumers: HashMap::new(),
            init_segment: None,
            chunk_seq: 0,
            producer: None,
            chunks_relayed: 0,
            bytes_relayed: 0,
            consumers_dropped: 0,
            created_at: Instant::now(),
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub fn has_consumer(&self, id: ConsumerId) -> bool {
        self.consumers.contains_key(&id)
    }

    pub fn init_segment(&self) -> Option<&Bytes> {
        self.init_segment.as_ref()
    }

    pub fn chunk_seq(&self) -> u64 {
        self.chunk_seq
    }

    pub fn producer_id(&self) -> Option<u64> {
        self.producer.as_ref().map(|slot| slot.session_id)
    }

    /// Attach `session_id` as the producer
    ///
    /// Any previously attached session is notified through its lease and
    /// its id is returned.
    pub(super) fn replace_producer(&mut self, session_id: u64) -> (ProducerLease, Option<u64>) {
        let (slot, lease) = ProducerSlot::new(session_id);
        let previous = self.producer.replace(slot).map(|old| {
            let old_id = old.session_id;
            old.displace(session_id);
            old_id
        });
        (lease, previous)
    }

    pub(super) fn clear_producer(&mut self) {
        self.producer = None;
    }

    /// Add a consumer, replaying the cached init segment into its queue first
    ///
    /// Returns whether a segment was replayed. The consumer's queue is empty
    /// at this point, so the replay cannot be rejected for lack of room.
    pub(super) fn add_consumer(&mut self, consumer: ConsumerHandle) -> bool {
        let replayed = match self.init_segment {
            Some(ref segment) => match consumer.enqueue(segment.clone()) {
                Ok(()) => true,
                Err(EnqueueError::Closed) => {
                    tracing::debug!(
                        stream = %self.id,
                        consumer = %consumer.id(),
                        "Consumer closed before replay, not registering"
                    );
                    return false;
                }
                Err(EnqueueError::Full) => false,
            },
            None => false,
        };

        self.consumers.insert(consumer.id(), consumer);
        replayed
    }

    /// Remove a consumer; returns whether it was present
    pub(super) fn remove_consumer(&mut self, id: ConsumerId) -> bool {
        self.consumers.remove(&id).is_some()
    }

    /// Advance the session sequence; returns the sequence of the new chunk
    pub(super) fn next_seq(&mut self) -> u64 {
        let seq = self.chunk_seq;
        self.chunk_seq += 1;
        seq
    }

    /// Cache (if `is_init`) and fan a payload out to every consumer
    ///
    /// Consumers whose queue is full or closed are removed.
    pub(super) fn deliver(
        &mut self,
        payload: Bytes,
        is_init: bool,
        max_init_segment_size: usize,
    ) -> Delivery {
        if is_init {
            if payload.len() <= max_init_segment_size {
                self.init_segment = Some(payload.clone());
            } else {
                self.init_segment = None;
                tracing::warn!(
                    stream = %self.id,
                    size = payload.len(),
                    limit = max_init_segment_size,
                    "Init segment too large to cache, late joiners will not receive it"
                );
            }
        }

        let mut delivery = Delivery::default();
        let id = &self.id;
        self.consumers
            .retain(|consumer_id, consumer| match consumer.enqueue(payload.clone()) {
                Ok(()) => {
                    delivery.delivered += 1;
                    true
                }
                Err(reason) => {
                    delivery.dropped += 1;
                    tracing::warn!(
                        stream = %id,
                        consumer = %consumer_id,
                        reason = ?reason,
                        "Dropping consumer"
                    );
                    false
                }
            });

        self.chunks_relayed += 1;
        self.bytes_relayed += payload.len() as u64;
        self.consumers_dropped += delivery.dropped as u64;

        delivery
    }

    /// Forget the current producer session's init segment and sequence
    pub(super) fn reset(&mut self) {
        self.init_segment = None;
        self.chunk_seq = 0;
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            consumer_count: self.consumers.len(),
            has_producer: self.producer.is_some(),
            init_segment_size: self.init_segment.as_ref().map(Bytes::len),
            chunk_seq: self.chunk_seq,
            chunks_relayed: self.chunks_relayed,
            bytes_relayed: self.bytes_relayed,
            consumers_dropped: self.consumers_dropped,
            age: self.created_at.elapsed(),
        }
    }
}

/// Statistics for a stream channel
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChannelStats {
    pub consumer_count: usize,
    pub has_producer: bool,
    /// Size of the cached init segment, if one is cached
    pub init_segment_size: Option<usize>,
    pub chunk_seq: u64,
    /// Chunks relayed over the channel's lifetime
    pub chunks_relayed: u64,
    pub bytes_relayed: u64,
    pub consumers_dropped: u64,
    /// Time since the channel was created
    pub age: std::time::Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::consumer::consumer_pair;

    const LIMIT: usize = 1024;

    #[test]
    fn test_deliver_caches_init_only() {
        let mut channel = StreamChannel::new(StreamId::new("screen"));

        channel.deliver(Bytes::from_static(b"init"), true, LIMIT);
        channel.deliver(Bytes::from_static(b"data"), false, LIMIT);

        assert_eq!(channel.init_segment(), Some(&Bytes::from_static(b"init")));
        assert_eq!(channel.stats().chunks_relayed, 2);
        assert_eq!(channel.stats().bytes_relayed, 8);
    }

    #[test]
    fn test_oversized_init_not_cached() {
        let mut channel = StreamChannel::new(StreamId::new("screen"));
        let (handle, mut queue) = consumer_pair(ConsumerId(1), 4);
        channel.add_consumer(handle);

        let big = Bytes::from(vec![0u8; 16]);
        let delivery = channel.deliver(big.clone(), true, 8);

        assert_eq!(delivery.delivered, 1);
        assert!(channel.init_segment().is_none());
        assert_eq!(queue.try_recv(), Some(big));
    }

    #[test]
    fn test_add_consumer_replays_segment() {
        let mut channel = StreamChannel::new(StreamId::new("mic"));
        channel.deliver(Bytes::from_static(b"init"), true, LIMIT);

        let (handle, mut queue) = consumer_pair(ConsumerId(1), 4);
        assert!(channel.add_consumer(handle));
        assert_eq!(queue.try_recv(), Some(Bytes::from_static(b"init")));
        assert_eq!(channel.consumer_count(), 1);
    }

    #[test]
    fn test_closed_consumer_not_added() {
        let mut channel = StreamChannel::new(StreamId::new("mic"));
        channel.deliver(Bytes::from_static(b"init"), true, LIMIT);

        let (handle, queue) = consumer_pair(ConsumerId(1), 4);
        drop(queue);
        assert!(!channel.add_consumer(handle));
        assert_eq!(channel.consumer_count(), 0);
    }

    #[test]
    fn test_full_consumer_dropped() {
        let mut channel = StreamChannel::new(StreamId::new("system"));
        let (slow, _slow_queue) = consumer_pair(ConsumerId(1), 1);
        let (fast, mut fast_queue) = consumer_pair(ConsumerId(2), 8);
        channel.add_consumer(slow);
        channel.add_consumer(fast);

        let first = channel.deliver(Bytes::from_static(b"a"), false, LIMIT);
        assert_eq!(first.delivered, 2);

        let second = channel.deliver(Bytes::from_static(b"b"), false, LIMIT);
        assert_eq!(second, Delivery { delivered: 1, dropped: 1 });
        assert!(!channel.has_consumer(ConsumerId(1)));
        assert!(channel.has_consumer(ConsumerId(2)));
        assert_eq!(fast_queue.try_recv(), Some(Bytes::from_static(b"a")));
        assert_eq!(fast_queue.try_recv(), Some(Bytes::from_static(b"b")));
        assert_eq!(channel.stats().consumers_dropped, 1);
    }

    #[test]
    fn test_reset_clears_session() {
        let mut channel = StreamChannel::new(StreamId::new("screen"));
        assert_eq!(channel.next_seq(), 0);
        assert_eq!(channel.next_seq(), 1);
        channel.deliver(Bytes::from_static(b"init"), true, LIMIT);

        channel.reset();

        assert_eq!(channel.chunk_seq(), 0);
        assert!(channel.init_segment().is_none());
    }

    #[tokio::test]
    async fn test_replace_producer_notifies_previous() {
        let mut channel = StreamChannel::new(StreamId::new("screen"));

        let (mut first, previous) = channel.replace_producer(1);
        assert_eq!(previous, None);

        let (_second, previous) = channel.replace_producer(2);
        assert_eq!(previous, Some(1));
        assert_eq!(channel.producer_id(), Some(2));
        assert_eq!(first.displaced().await, Some(2));
    }
}
