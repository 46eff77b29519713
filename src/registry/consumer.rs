//! Consumer handles
//!
//! A consumer is represented in the registry by the sending half of a
//! bounded queue. The view session owns the receiving half and drains it
//! onto its connection, so a broadcast never waits on a socket.

use std::fmt;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Identity of a registered consumer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(pub u64);

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}

/// Registry-side half of a consumer
#[derive(Debug, Clone)]
pub struct ConsumerHandle {
    id: ConsumerId,
    tx: mpsc::Sender<Bytes>,
}

/// Session-side half of a consumer
#[derive(Debug)]
pub struct ConsumerQueue {
    id: ConsumerId,
    rx: mpsc::Receiver<Bytes>,
}

/// Why an enqueue failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// Consumer is not keeping up
    Full,
    /// Consumer session has ended
    Closed,
}

/// Create a connected handle/queue pair
pub fn consumer_pair(id: ConsumerId, capacity: usize) -> (ConsumerHandle, ConsumerQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ConsumerHandle { id, tx }, ConsumerQueue { id, rx })
}

impl ConsumerHandle {
    pub fn id(&self) -> ConsumerId {
        self.id
    }

    /// Queue a payload without waiting
    pub(super) fn enqueue(&self, payload: Bytes) -> Result<(), EnqueueError> {
        self.tx.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

impl ConsumerQueue {
    pub fn id(&self) -> ConsumerId {
        self.id
    }

    /// Wait for the next payload
    ///
    /// Returns `None` once the registry has dropped this consumer and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Take a payload if one is ready
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_full_and_closed() {
        let (handle, mut queue) = consumer_pair(ConsumerId(7), 1);
        assert_eq!(handle.id(), queue.id());

        assert_eq!(handle.enqueue(Bytes::from_static(b"a")), Ok(()));
        assert_eq!(
            handle.enqueue(Bytes::from_static(b"b")),
            Err(EnqueueError::Full)
        );
        assert_eq!(queue.recv().await, Some(Bytes::from_static(b"a")));

        drop(queue);
        assert_eq!(
            handle.enqueue(Bytes::from_static(b"c")),
            Err(EnqueueError::Closed)
        );
    }

    #[tokio::test]
    async fn test_queue_ends_when_handle_dropped() {
        let (handle, mut queue) = consumer_pair(ConsumerId(1), 4);
        handle.enqueue(Bytes::from_static(b"x")).unwrap();
        drop(handle);

        assert_eq!(queue.recv().await, Some(Bytes::from_static(b"x")));
        assert_eq!(queue.recv().await, None);
    }
}
