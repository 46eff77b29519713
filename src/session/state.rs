//! Session state machine
//!
//! Tracks a producer or consumer session from connection to disconnection:
//! `Connecting → Active → Closed`. A closed session never reopens; a new
//! connection is a new session.

use std::fmt;
use std::time::{Duration, Instant};

use super::context::SessionContext;
use crate::stats::SessionStats;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Connection accepted, not yet attached to the registry
    Connecting,
    /// Attached and relaying
    Active,
    /// Session ended
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a close frame or the stream ended
    PeerClosed,
    /// Transport failed mid-session
    TransportError,
    /// No inbound message within the idle timeout
    IdleTimeout,
    /// Outbound write did not complete within the send timeout
    SendTimeout,
    /// Registry dropped the consumer (queue full)
    Evicted,
    /// A newer producer session took over the stream
    Displaced,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::PeerClosed => "peer closed",
            CloseReason::TransportError => "transport error",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::SendTimeout => "send timeout",
            CloseReason::Evicted => "evicted",
            CloseReason::Displaced => "displaced",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of one session
#[derive(Debug)]
pub struct SessionState {
    /// Current phase
    pub phase: SessionPhase,

    /// Connection start time
    pub connected_at: Instant,

    /// Time the session became active
    pub activated_at: Option<Instant>,

    /// Set once the session is closed
    pub close_reason: Option<CloseReason>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Connecting,
            connected_at: Instant::now(),
            activated_at: None,
            close_reason: None,
        }
    }

    /// Transition to active; no-op unless connecting
    pub fn activate(&mut self) {
        if self.phase == SessionPhase::Connecting {
            self.phase = SessionPhase::Active;
            self.activated_at = Some(Instant::now());
        }
    }

    /// Close the session; the first reason recorded wins
    pub fn close(&mut self, reason: CloseReason) {
        if self.phase != SessionPhase::Closed {
            self.phase = SessionPhase::Closed;
            self.close_reason = Some(reason);
        }
    }

    /// Get session duration
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Final accounting for a finished session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub context: SessionContext,
    pub reason: CloseReason,
    pub stats: SessionStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let mut state = SessionState::new();
        assert_eq!(state.phase, SessionPhase::Connecting);

        state.activate();
        assert_eq!(state.phase, SessionPhase::Active);
        assert!(state.activated_at.is_some());

        state.close(CloseReason::PeerClosed);
        assert_eq!(state.phase, SessionPhase::Closed);
        assert_eq!(state.close_reason, Some(CloseReason::PeerClosed));
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut state = SessionState::new();
        state.activate();
        state.close(CloseReason::IdleTimeout);

        state.activate();
        state.close(CloseReason::TransportError);

        assert_eq!(state.phase, SessionPhase::Closed);
        assert_eq!(state.close_reason, Some(CloseReason::IdleTimeout));
    }

    #[test]
    fn test_close_before_active() {
        let mut state = SessionState::new();
        state.close(CloseReason::TransportError);
        assert!(state.activated_at.is_none());
        assert_eq!(state.close_reason, Some(CloseReason::TransportError));
    }
}
