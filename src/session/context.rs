//! Session context
//!
//! Identifies a session for logging and stats: who connected, to which
//! stream, in which role.

use std::fmt;
use std::net::SocketAddr;

use crate::registry::StreamId;

/// Which side of the relay a session serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Sends chunks into the relay
    Producer,
    /// Receives chunks from the relay
    Consumer,
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionRole::Producer => f.write_str("producer"),
            SessionRole::Consumer => f.write_str("consumer"),
        }
    }
}

/// Read-only information about one session
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Unique session ID
    pub session_id: u64,

    /// Remote peer address, when the transport knows it
    pub peer_addr: Option<SocketAddr>,

    /// Stream the session is bound to
    pub stream: StreamId,

    pub role: SessionRole,
}

impl SessionContext {
    pub fn new(session_id: u64, stream: StreamId, role: SessionRole) -> Self {
        Self {
            session_id,
            peer_addr: None,
            stream,
            role,
        }
    }

    pub fn with_peer(mut self, peer_addr: SocketAddr) -> Self {
        self.peer_addr = Some(peer_addr);
        self
    }
}
