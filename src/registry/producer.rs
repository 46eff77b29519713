//! Producer attachment
//!
//! A stream has at most one producer session. Attaching a new session
//! displaces the current one; the displaced session learns about it through
//! its [`ProducerLease`].

use tokio::sync::oneshot;

/// The attached producer as seen by the channel
pub(super) struct ProducerSlot {
    pub(super) session_id: u64,
    takeover: oneshot::Sender<u64>,
}

impl ProducerSlot {
    pub(super) fn new(session_id: u64) -> (Self, ProducerLease) {
        let (takeover, displaced) = oneshot::channel();
        let slot = Self {
            session_id,
            takeover,
        };
        let lease = ProducerLease {
            session_id,
            displaced,
        };
        (slot, lease)
    }

    /// Tell the owning session that `by` took the stream over
    pub(super) fn displace(self, by: u64) {
        let _ = self.takeover.send(by);
    }
}

/// Held by a producer session while it is attached to a stream
#[derive(Debug)]
pub struct ProducerLease {
    session_id: u64,
    displaced: oneshot::Receiver<u64>,
}

impl ProducerLease {
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Wait until another session takes the stream over
    ///
    /// Resolves with the new session's id, or `None` if the registry
    /// released the slot without naming a successor. Cancel-safe. Must not
    /// be awaited again after it has resolved.
    pub async fn displaced(&mut self) -> Option<u64> {
        (&mut self.displaced).await.ok()
    }
}
