//! Relay connections
//!
//! [`RelayConnection`] is the duplex primitive the ingest and view sessions
//! run over. One transport message is one chunk; no further framing.

use std::future::Future;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use bytes::Bytes;

use crate::error::Result;

/// Normal closure
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint going away (idle or send timeout)
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Policy violation (e.g. a producer displaced by a newer session)
pub const CLOSE_POLICY: u16 = 1008;
/// Server overloaded; consumer could not keep up
pub const CLOSE_TRY_AGAIN: u16 = 1013;

/// A message received from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Opaque binary payload
    Binary(Bytes),
    /// Text frame
    Text(String),
    /// Ping/pong or other control frame
    Control,
}

/// A duplex connection to a producer or consumer
pub trait RelayConnection: Send {
    /// Wait for the next inbound message
    ///
    /// Returns `None` once the peer has closed the connection. Must be
    /// cancel-safe: it is raced against outbound work.
    fn recv(&mut self) -> impl Future<Output = Option<Result<Inbound>>> + Send;

    /// Send one binary payload
    fn send(&mut self, payload: Bytes) -> impl Future<Output = Result<()>> + Send;

    /// Send a keep-alive ping
    fn ping(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Close with a status code; errors are ignored
    fn close(&mut self, code: u16, reason: &str) -> impl Future<Output = ()> + Send;
}

/// WebSocket transport
pub struct WsConnection {
    socket: WebSocket,
}

impl WsConnection {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

impl RelayConnection for WsConnection {
    async fn recv(&mut self) -> Option<Result<Inbound>> {
        let inbound = match self.socket.recv().await? {
            Ok(Message::Binary(payload)) => Ok(Inbound::Binary(payload)),
            Ok(Message::Text(text)) => Ok(Inbound::Text(text.as_str().to_owned())),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Ok(Inbound::Control),
            Ok(Message::Close(_)) => return None,
            Err(e) => Err(e.into()),
        };
        Some(inbound)
    }

    async fn send(&mut self, payload: Bytes) -> Result<()> {
        self.socket.send(Message::Binary(payload)).await?;
        Ok(())
    }

    async fn ping(&mut self) -> Result<()> {
        self.socket.send(Message::Ping(Bytes::new())).await?;
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code,
            reason: reason.to_owned().into(),
        };
        let _ = self.socket.send(Message::Close(Some(frame))).await;
    }
}

/// In-memory connection for driving sessions in tests
#[cfg(test)]
pub(crate) mod mock {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;

    /// What the session wrote to the peer
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Outbound {
        Payload(Bytes),
        Ping,
        Close(u16),
    }

    pub struct MockConnection {
        inbound: mpsc::UnboundedReceiver<Result<Inbound>>,
        outbound: mpsc::UnboundedSender<Outbound>,
        send_delay: Option<Duration>,
    }

    /// Test-side end of a [`MockConnection`]
    pub struct MockPeer {
        pub inbound: mpsc::UnboundedSender<Result<Inbound>>,
        pub outbound: mpsc::UnboundedReceiver<Outbound>,
    }

    impl MockPeer {
        pub fn send_chunk(&self, payload: &'static [u8]) {
            let _ = self.inbound.send(Ok(Inbound::Binary(Bytes::from_static(payload))));
        }

        pub fn keepalive(&self) {
            let _ = self.inbound.send(Ok(Inbound::Text("ping".into())));
        }

        /// Payloads received so far, skipping pings
        pub fn payloads(&mut self) -> Vec<Bytes> {
            let mut out = Vec::new();
            while let Ok(msg) = self.outbound.try_recv() {
                if let Outbound::Payload(payload) = msg {
                    out.push(payload);
                }
            }
            out
        }

        /// Wait for the next payload, skipping pings
        pub async fn next_payload(&mut self) -> Option<Bytes> {
            loop {
                match self.outbound.recv().await? {
                    Outbound::Payload(payload) => return Some(payload),
                    Outbound::Ping => continue,
                    Outbound::Close(_) => return None,
                }
            }
        }
    }

    pub fn pair() -> (MockConnection, MockPeer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            MockConnection {
                inbound: in_rx,
                outbound: out_tx,
                send_delay: None,
            },
            MockPeer {
                inbound: in_tx,
                outbound: out_rx,
            },
        )
    }

    impl MockConnection {
        /// Make every payload write take `delay`
        pub fn with_send_delay(mut self, delay: Duration) -> Self {
            self.send_delay = Some(delay);
            self
        }
    }

    impl RelayConnection for MockConnection {
        async fn recv(&mut self) -> Option<Result<Inbound>> {
            self.inbound.recv().await
        }

        async fn send(&mut self, payload: Bytes) -> Result<()> {
            if let Some(delay) = self.send_delay {
                tokio::time::sleep(delay).await;
            }
            self.outbound
                .send(Outbound::Payload(payload))
                .map_err(|_| crate::Error::Transport("peer gone".into()))
        }

        async fn ping(&mut self) -> Result<()> {
            self.outbound
                .send(Outbound::Ping)
                .map_err(|_| crate::Error::Transport("peer gone".into()))
        }

        async fn close(&mut self, code: u16, _reason: &str) {
            let _ = self.outbound.send(Outbound::Close(code));
        }
    }
}
