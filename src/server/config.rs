//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent producer + consumer connections (0 = unlimited)
    pub max_connections: usize,

    /// Idle timeout (disconnect if nothing received from the peer)
    pub idle_timeout: Duration,

    /// Maximum time a single outbound write to a consumer may take
    pub send_timeout: Duration,

    /// Interval between pings to consumers, which keeps browsers' pongs
    /// flowing as liveness signals
    pub ping_interval: Duration,

    /// Largest inbound message accepted, in bytes
    pub max_message_size: usize,

    /// Path prefix for the ingest and view routes (e.g. "/stream")
    pub route_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            max_connections: 0, // Unlimited
            idle_timeout: Duration::from_secs(60),
            send_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(20),
            max_message_size: 16 * 1024 * 1024, // 16MB
            route_prefix: "/stream".to_string(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set consumer send timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set consumer ping interval (minimum 1ms)
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set maximum inbound message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the route prefix; normalized to a leading `/` and no trailing `/`
    pub fn route_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim_matches('/');
        self.route_prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        };
        self
    }

    /// Check that the timing and size options can work together
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout.is_zero() {
            return Err(Error::Config("idle timeout must be positive".into()));
        }
        if self.send_timeout.is_zero() {
            return Err(Error::Config("send timeout must be positive".into()));
        }
        // Consumers answer pings; a slower ping cadence lets idle consumers time out
        if self.ping_interval >= self.idle_timeout {
            return Err(Error::Config(format!(
                "ping interval ({:?}) must be shorter than idle timeout ({:?})",
                self.ping_interval, self.idle_timeout
            )));
        }
        if self.max_message_size == 0 {
            return Err(Error::Config("max message size must be positive".into()));
        }
        Ok(())
    }

    /// Route for producers
    pub fn ingest_route(&self) -> String {
        format!("{}/upload/{{stream_id}}", self.route_prefix)
    }

    /// Route for consumers
    pub fn view_route(&self) -> String {
        format!("{}/live/{{stream_id}}", self.route_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 8000);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.send_timeout, Duration::from_secs(5));
        assert_eq!(config.ingest_route(), "/stream/upload/{stream_id}");
        assert_eq!(config.view_route(), "/stream/live/{stream_id}");
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn test_route_prefix_normalized() {
        let config = ServerConfig::default().route_prefix("relay/");
        assert_eq!(config.ingest_route(), "/relay/upload/{stream_id}");

        let config = ServerConfig::default().route_prefix("/");
        assert_eq!(config.view_route(), "/live/{stream_id}");
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_ping_not_shorter_than_idle_rejected() {
        let config = ServerConfig::default()
            .idle_timeout(Duration::from_secs(20))
            .ping_interval(Duration::from_secs(20));
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = config.ping_interval(Duration::from_secs(30));
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = config.ping_interval(Duration::from_secs(19));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let config = ServerConfig::default().idle_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = ServerConfig::default().send_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = ServerConfig::default().max_message_size(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .idle_timeout(Duration::from_secs(30))
            .send_timeout(Duration::from_millis(500))
            .ping_interval(Duration::from_secs(10))
            .max_message_size(1024);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.send_timeout, Duration::from_millis(500));
        assert_eq!(config.ping_interval, Duration::from_secs(10));
        assert_eq!(config.max_message_size, 1024);
    }
}
