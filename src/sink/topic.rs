//! Stream identifier to log topic mapping

use std::collections::HashMap;

use crate::registry::StreamId;

/// Built-in topics for the standard capture streams
const DEFAULT_TOPICS: &[(&str, &str)] = &[
    ("screen", "video_raw_stream"),
    ("mic", "audio_mic_stream"),
    ("system", "audio_system_stream"),
];

/// Deterministic mapping from stream identifier to log topic
///
/// Unknown identifiers map to `{id}_raw_stream`.
#[derive(Debug, Clone)]
pub struct TopicMap {
    topics: HashMap<String, String>,
}

impl TopicMap {
    /// Mapping with only the built-in topics
    pub fn new() -> Self {
        Self {
            topics: DEFAULT_TOPICS
                .iter()
                .map(|(id, topic)| (id.to_string(), topic.to_string()))
                .collect(),
        }
    }

    /// Add or replace the topic for one identifier
    pub fn with_override(mut self, id: impl Into<String>, topic: impl Into<String>) -> Self {
        self.topics.insert(id.into(), topic.into());
        self
    }

    /// Resolve the topic for a stream
    pub fn topic(&self, id: &StreamId) -> String {
        match self.topics.get(id.as_str()) {
            Some(topic) => topic.clone(),
            None => format!("{}_raw_stream", id),
        }
    }
}

impl Default for TopicMap {
    fn default() -> Self {
        Self::new()
    }
}
