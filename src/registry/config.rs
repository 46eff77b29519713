//! Registry configuration

/// Stream registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Outbound queue depth per consumer, in chunks
    ///
    /// A consumer whose queue is full when a chunk is broadcast is dropped.
    pub consumer_queue_capacity: usize,

    /// Largest init segment that is cached for late joiners, in bytes
    pub max_init_segment_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            consumer_queue_capacity: 256,
            max_init_segment_size: 8 * 1024 * 1024, // 8MB
        }
    }
}

impl RegistryConfig {
    /// Set the per-consumer queue capacity (minimum 1)
    pub fn consumer_queue_capacity(mut self, capacity: usize) -> Self {
        self.consumer_queue_capacity = capacity.max(1);
        self
    }

    /// Set the maximum cacheable init segment size
    pub fn max_init_segment_size(mut self, size: usize) -> Self {
        self.max_init_segment_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.consumer_queue_capacity, 256);
        assert_eq!(config.max_init_segment_size, 8 * 1024 * 1024);
    }

    #[test]
    fn test_queue_capacity_floor() {
        let config = RegistryConfig::default().consumer_queue_capacity(0);
        assert_eq!(config.consumer_queue_capacity, 1);
    }
}
