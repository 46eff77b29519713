//! Registry error types

use super::frame::StreamId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Chunk came from a session that is not the stream's producer
    #[error("session {session_id} is not the producer of stream {stream}")]
    NotProducer { stream: StreamId, session_id: u64 },

    /// Identifier is empty, too long, or contains control characters
    #[error("invalid stream id: {0:?}")]
    InvalidStreamId(String),
}
