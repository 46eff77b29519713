//! Consumer sessions
//!
//! One view session owns one consumer connection for one stream. It
//! registers a bounded queue with the registry (receiving the cached init
//! segment first, if any) and drains that queue onto the connection.
//! Anything the consumer sends counts as a keep-alive.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::registry::{ConsumerId, ConsumerQueue, StreamRegistry};
use crate::session::{CloseReason, SessionContext, SessionReport, SessionState};
use crate::stats::SessionStats;

use super::connection::{
    Inbound, RelayConnection, CLOSE_GOING_AWAY, CLOSE_NORMAL, CLOSE_TRY_AGAIN,
};

/// Timing knobs for a view session
#[derive(Debug, Clone, Copy)]
pub struct ViewTimeouts {
    /// Close if nothing is received from the consumer for this long
    pub idle: Duration,
    /// Close if one outbound write takes longer than this
    pub send: Duration,
    /// How often to ping the consumer
    pub ping: Duration,
}

enum ViewEvent {
    Inbound(Option<Result<Inbound>>),
    Outbound(Option<Bytes>),
    Ping,
    Idle,
}

/// A single consumer session
pub struct ViewSession<C> {
    ctx: SessionContext,
    conn: C,
    registry: Arc<StreamRegistry>,
    timeouts: ViewTimeouts,
    state: SessionState,
    stats: SessionStats,
}

impl<C: RelayConnection> ViewSession<C> {
    pub fn new(
        ctx: SessionContext,
        conn: C,
        registry: Arc<StreamRegistry>,
        timeouts: ViewTimeouts,
    ) -> Self {
        Self {
            ctx,
            conn,
            registry,
            timeouts,
            state: SessionState::new(),
            stats: SessionStats::new(),
        }
    }

    /// Run until the consumer disconnects or is dropped
    pub async fn run(mut self) -> SessionReport {
        let stream = self.ctx.stream.clone();

        let (handle, mut queue) = self.registry.new_consumer();
        let consumer_id = handle.id();
        self.registry.register(&stream, handle).await;
        self.state.activate();

        let reason = self.relay_loop(&mut queue).await;

        self.registry.unregister(&stream, consumer_id).await;

        match reason {
            CloseReason::PeerClosed => self.conn.close(CLOSE_NORMAL, "").await,
            CloseReason::IdleTimeout => self.conn.close(CLOSE_GOING_AWAY, "idle timeout").await,
            CloseReason::Evicted => {
                self.conn.close(CLOSE_TRY_AGAIN, "consumer too slow").await
            }
            // The transport is broken or stuck; a close frame would not get through.
            _ => {}
        }

        self.finish(reason)
    }

    async fn relay_loop(&mut self, queue: &mut ConsumerQueue) -> CloseReason {
        let mut idle_deadline = Instant::now() + self.timeouts.idle;
        let mut ping_ticker = tokio::time::interval(self.timeouts.ping);
        ping_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately
        ping_ticker.tick().await;

        loop {
            let event = tokio::select! {
                inbound = self.conn.recv() => ViewEvent::Inbound(inbound),
                outbound = queue.recv() => ViewEvent::Outbound(outbound),
                _ = ping_ticker.tick() => ViewEvent::Ping,
                _ = tokio::time::sleep_until(idle_deadline) => ViewEvent::Idle,
            };

            match event {
                ViewEvent::Inbound(Some(Ok(_))) => {
                    self.stats.keepalives += 1;
                    idle_deadline = Instant::now() + self.timeouts.idle;
                }
                ViewEvent::Inbound(Some(Err(e))) => {
                    tracing::debug!(
                        stream = %self.ctx.stream,
                        consumer = %queue.id(),
                        error = %e,
                        "Consumer transport error"
                    );
                    return CloseReason::TransportError;
                }
                ViewEvent::Inbound(None) => return CloseReason::PeerClosed,
                ViewEvent::Outbound(Some(payload)) => {
                    let size = payload.len();
                    match timed_write(self.timeouts.send, self.conn.send(payload)).await {
                        Ok(()) => self.stats.on_sent(size),
                        Err(e) => return self.write_failed(queue.id(), e),
                    }
                }
                // Registry dropped our handle
                ViewEvent::Outbound(None) => return CloseReason::Evicted,
                ViewEvent::Ping => {
                    if let Err(e) = timed_write(self.timeouts.send, self.conn.ping()).await {
                        return self.write_failed(queue.id(), e);
                    }
                }
                ViewEvent::Idle => return CloseReason::IdleTimeout,
            }
        }
    }

    fn write_failed(&self, consumer: ConsumerId, error: Error) -> CloseReason {
        match error {
            Error::SendTimeout(limit) => {
                tracing::warn!(
                    stream = %self.ctx.stream,
                    consumer = %consumer,
                    timeout_ms = limit.as_millis() as u64,
                    "Consumer send timed out"
                );
                CloseReason::SendTimeout
            }
            e => {
                tracing::debug!(
                    stream = %self.ctx.stream,
                    consumer = %consumer,
                    error = %e,
                    "Consumer send failed"
                );
                CloseReason::TransportError
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
            chunks = self.stats.chunks_sent,
            bytes = self.stats.bytes_sent,
            "Consumer session ended"
        );

        SessionReport {
            context: self.ctx,
            reason,
            stats: self.stats,
        }
    }
}

/// Run one outbound write, failing with [`Error::SendTimeout`] past `limit`
async fn timed_write<F>(limit: Duration, write: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match tokio::time::timeout(limit, write).await {
        Ok(result) => result,
        Err(_) => Err(Error::SendTimeout(limit)),
    }
}
