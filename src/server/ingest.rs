//! Producer sessions
//!
//! One ingest session owns one producer connection for one stream. Every
//! binary message is relayed to the stream's consumers and mirrored to the
//! log sink. When the producer goes away the channel is reset so no viewer
//! joining later is handed a stale init segment. A reconnecting producer
//! takes the stream over from a session the server still thinks is alive.

use std::sync::Arc;
use std::time::Duration;

use crate::registry::{ProducerLease, StreamRegistry};
use crate::session::{CloseReason, SessionContext, SessionReport, SessionState};
use crate::sink::LogSink;
use crate::stats::SessionStats;

use super::connection::{
    Inbound, RelayConnection, CLOSE_GOING_AWAY, CLOSE_NORMAL, CLOSE_POLICY,
};

/// A single producer session
pub struct IngestSession<C> {
    ctx: SessionContext,
    conn: C,
    registry: Arc<StreamRegistry>,
    sink: LogSink,
    idle_timeout: Duration,
    state: SessionState,
    stats: SessionStats,
}

impl<C: RelayConnection> IngestSession<C> {
    pub fn new(
        ctx: SessionContext,
        conn: C,
        registry: Arc<StreamRegistry>,
        sink: LogSink,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            ctx,
            conn,
            registry,
            sink,
            idle_timeout,
            state: SessionState::new(),
            stats: SessionStats::new(),
        }
    }

    /// Run until the producer disconnects
    pub async fn run(mut self) -> SessionReport {
        let stream = self.ctx.stream.clone();
        let session_id = self.ctx.session_id;

        let mut lease = self.registry.attach_producer(&stream, session_id).await;
        self.state.activate();
        let reason = self.relay_loop(&mut lease).await;

        match reason {
            // The slot already belongs to the newer session
            CloseReason::Displaced => {
                self.conn
                    .close(CLOSE_POLICY, "stream taken over by a newer producer")
                    .await;
            }
            CloseReason::IdleTimeout => {
                self.registry.detach_producer(&stream, session_id).await;
                self.conn.close(CLOSE_GOING_AWAY, "idle timeout").await;
            }
            CloseReason::PeerClosed => {
                self.registry.detach_producer(&stream, session_id).await;
                self.conn.close(CLOSE_NORMAL, "").await;
            }
            _ => {
                self.registry.detach_producer(&stream, session_id).await;
            }
        }

        self.finish(reason)
    }

    async fn relay_loop(&mut self, lease: &mut ProducerLease) -> CloseReason {
        let stream = self.ctx.stream.clone();

        loop {
            let inbound = tokio::select! {
                biased;
                taken_by = lease.displaced() => {
                    tracing::info!(
                        stream = %stream,
                        session_id = self.ctx.session_id,
                        taken_by = ?taken_by,
                        "Producer displaced"
                    );
                    return CloseReason::Displaced;
                }
                inbound = tokio::time::timeout(self.idle_timeout, self.conn.recv()) => {
                    match inbound {
                        Ok(inbound) => inbound,
                        Err(_) => return CloseReason::IdleTimeout,
                    }
                }
            };

            match inbound {
                Some(Ok(Inbound::Binary(payload))) => {
                    if payload.is_empty() {
                        tracing::debug!(stream = %stream, "Ignoring empty chunk");
                        continue;
                    }

                    self.stats.on_received(payload.len());
                    let size = payload.len();

                    let published = match self
                        .registry
                        .publish(&stream, self.ctx.session_id, payload.clone())
                        .await
                    {
                        Ok(published) => published,
                        Err(e) => {
                            tracing::debug!(stream = %stream, error = %e, "Chunk refused");
                            return CloseReason::Displaced;
                        }
                    };
                    self.sink.publish_chunk(&stream, payload);

                    if published.is_init {
                        tracing::debug!(
                            stream = %stream,
                            session_id = self.ctx.session_id,
                            size = size,
                            consumers = published.delivery.delivered,
                            "Init segment received"
                        );
                    } else {
                        tracing::trace!(
                            stream = %stream,
                            seq = published.seq,
                            size = size,
                            delivered = published.delivery.delivered,
                            dropped = published.delivery.dropped,
                            "Chunk relayed"
                        );
                    }
                }
                Some(Ok(Inbound::Text(_))) => {
                    tracing::debug!(stream = %stream, "Ignoring text frame from producer");
                }
                Some(Ok(Inbound::Control)) => {}
                Some(Err(e)) => {
                    tracing::debug!(stream = %stream, error = %e, "Producer transport error");
                    return CloseReason::TransportError;
                }
                None => return CloseReason::PeerClosed,
            }
        }
    }

    fn finish(mut self, reason: CloseReason) -> SessionReport {
        self.state.close(reason);
        self.stats.duration = self.state.duration();

        tracing::info!(
            stream = %self.ctx.stream,
            session_id = self.ctx.session_id,
            peer = ?self.ctx.peer_addr,
            reason = %reason,
            chunks = self.stats.chunks_received,
            bytes = self.stats.bytes_received,
            "Producer session ended"
        );

        SessionReport {
            context: self.ctx,
            reason,
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::registry::StreamId;
    use crate::server::connection::mock::{self, Outbound};
    use crate::session::SessionRole;
    use crate::sink::{MemoryBackend, SinkConfig};

    fn session<C: RelayConnection>(
        id: u64,
        stream: &str,
        conn: C,
        registry: &Arc<StreamRegistry>,
        sink: LogSink,
    ) -> IngestSession<C> {
        let ctx = SessionContext::new(id, StreamId::new(stream), SessionRole::Producer);
        IngestSession::new(
            ctx,
            conn,
            Arc::clone(registry),
            sink,
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_chunks_broadcast_and_mirrored() {
        let registry = Arc::new(StreamRegistry::new());
        let backend = MemoryBackend::new();
        let (sink, worker) = LogSink::spawn(backend.clone(), &SinkConfig::default());
        let stream = StreamId::new("screen");

        let (consumer, mut queue) = registry.new_consumer();
        registry.register(&stream, consumer).await;

        let (conn, peer) = mock::pair();
        peer.send_chunk(b"A");
        peer.send_chunk(b"B");
        drop(peer);

        let report = session(1, "screen", conn, &registry, sink).run().await;
        assert_eq!(report.reason, CloseReason::PeerClosed);
        assert_eq!(report.stats.chunks_received, 2);

        assert_eq!(queue.try_recv(), Some(Bytes::from_static(b"A")));
        assert_eq!(queue.try_recv(), Some(Bytes::from_static(b"B")));

        worker.await.unwrap();
        let records = backend.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.topic == "video_raw_stream"));
    }

    #[tokio::test]
    async fn test_disconnect_resets_channel() {
        let registry = Arc::new(StreamRegistry::new());
        let stream = StreamId::new("mic");

        let (conn, peer) = mock::pair();
        peer.send_chunk(b"A");
        drop(peer);
        session(1, "mic", conn, &registry, LogSink::disabled()).run().await;

        assert!(registry.init_segment(&stream).await.is_none());
        let stats = registry.channel_stats(&stream).await.unwrap();
        assert_eq!(stats.chunk_seq, 0);
        assert!(!stats.has_producer);
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_affect_delivery() {
        let registry = Arc::new(StreamRegistry::new());
        let backend = MemoryBackend::failing();
        let (sink, worker) = LogSink::spawn(backend.clone(), &SinkConfig::default());
        let stream = StreamId::new("system");

        let (consumer, mut queue) = registry.new_consumer();
        registry.register(&stream, consumer).await;

        let (conn, peer) = mock::pair();
        peer.send_chunk(b"A");
        peer.send_chunk(b"B");
        drop(peer);

        let report = session(1, "system", conn, &registry, sink).run().await;
        assert_eq!(report.reason, CloseReason::PeerClosed);
        assert_eq!(queue.try_recv(), Some(Bytes::from_static(b"A")));
        assert_eq!(queue.try_recv(), Some(Bytes::from_static(b"B")));

        worker.await.unwrap();
        assert_eq!(backend.attempts(), 2);
    }

    #[tokio::test]
    async fn test_reconnect_displaces_silent_session() {
        let registry = Arc::new(StreamRegistry::new());
        let stream = StreamId::new("screen");
        let (consumer, mut queue) = registry.new_consumer();
        registry.register(&stream, consumer).await;

        // Half-open uploader: the connection stays up but sends nothing more
        let (old_conn, mut old_peer) = mock::pair();
        old_peer.send_chunk(b"old-init");
        let old = tokio::spawn(session(1, "screen", old_conn, &registry, LogSink::disabled()).run());
        while registry.init_segment(&stream).await.is_none() {
            tokio::task::yield_now().await;
        }

        let (new_conn, new_peer) = mock::pair();
        new_peer.send_chunk(b"new-init");
        new_peer.send_chunk(b"data");
        let new = tokio::spawn(session(2, "screen", new_conn, &registry, LogSink::disabled()).run());

        let old_report = old.await.unwrap();
        assert_eq!(old_report.reason, CloseReason::Displaced);
        assert_eq!(
            old_peer.outbound.try_recv().ok(),
            Some(Outbound::Close(CLOSE_POLICY))
        );

        drop(new_peer);
        let new_report = new.await.unwrap();
        assert_eq!(new_report.reason, CloseReason::PeerClosed);
        assert_eq!(new_report.stats.chunks_received, 2);

        let mut received = Vec::new();
        while let Some(payload) = queue.try_recv() {
            received.push(payload);
        }
        assert_eq!(
            received,
            vec![
                Bytes::from_static(b"old-init"),
                Bytes::from_static(b"new-init"),
                Bytes::from_static(b"data"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_producer_closed() {
        let registry = Arc::new(StreamRegistry::new());
        let (conn, mut peer) = mock::pair();
        peer.send_chunk(b"A");

        let ctx = SessionContext::new(1, StreamId::new("screen"), SessionRole::Producer);
        let report = IngestSession::new(
            ctx,
            conn,
            Arc::clone(&registry),
            LogSink::disabled(),
            Duration::from_secs(5),
        )
        .run()
        .await;

        assert_eq!(report.reason, CloseReason::IdleTimeout);
        assert_eq!(
            peer.outbound.try_recv().ok(),
            Some(Outbound::Close(CLOSE_GOING_AWAY))
        );
        assert!(registry
            .init_segment(&StreamId::new("screen"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_empty_and_text_frames_ignored() {
        let registry = Arc::new(StreamRegistry::new());
        let stream = StreamId::new("screen");
        let (consumer, mut queue) = registry.new_consumer();
        registry.register(&stream, consumer).await;

        let (conn, peer) = mock::pair();
        peer.inbound
            .send(Ok(Inbound::Binary(Bytes::new())))
            .unwrap();
        peer.keepalive();
        peer.send_chunk(b"A");
        drop(peer);

        let report = session(1, "screen", conn, &registry, LogSink::disabled())
            .run()
            .await;
        assert_eq!(report.stats.chunks_received, 1);
        assert_eq!(queue.try_recv(), Some(Bytes::from_static(b"A")));
        assert_eq!(queue.try_recv(), None);
    }
}
