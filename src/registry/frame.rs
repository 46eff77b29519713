//! Stream identifiers and delivery results
//!
//! This module defines the key type for grouping a producer with its
//! consumers and the bookkeeping returned from a fan-out.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use super::error::RegistryError;

/// Longest accepted stream identifier, in bytes
pub const MAX_STREAM_ID_LEN: usize = 256;

/// Logical channel name (e.g., "screen", "mic", "system")
///
/// The set of identifiers is open: any non-empty string names a stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(Arc<str>);

impl StreamId {
    /// Create a stream identifier without validation
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Create a stream identifier from untrusted input (e.g., a URL path segment)
    pub fn parse(id: &str) -> Result<Self, RegistryError> {
        if id.is_empty() || id.len() > MAX_STREAM_ID_LEN || id.chars().any(char::is_control) {
            return Err(RegistryError::InvalidStreamId(id.to_string()));
        }
        Ok(Self::new(id))
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for StreamId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StreamId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Outcome of fanning one chunk out to a channel's consumers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Consumers whose outbound queue accepted the chunk
    pub delivered: usize,
    /// Consumers removed because their queue was full or closed
    pub dropped: usize,
}

/// Outcome of publishing a producer chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Published {
    /// Sequence number of the chunk within the producer session
    pub seq: u64,
    /// Whether the chunk was classified as the initialization segment
    pub is_init: bool,
    /// Fan-out result
    pub delivery: Delivery,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_open_set() {
        assert_eq!(StreamId::parse("screen").unwrap().as_str(), "screen");
        assert_eq!(StreamId::parse("camera-2").unwrap().to_string(), "camera-2");
    }

    #[test]
    fn test_parse_rejects_degenerate_ids() {
        assert!(matches!(
            StreamId::parse(""),
            Err(RegistryError::InvalidStreamId(_))
        ));
        assert!(StreamId::parse("bad\nid").is_err());
        assert!(StreamId::parse(&"x".repeat(MAX_STREAM_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_borrow_lookup() {
        let mut map = std::collections::HashMap::new();
        map.insert(StreamId::new("mic"), 1);
        assert_eq!(map.get("mic"), Some(&1));
    }
}
