//! Statistics for relay sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Session-level statistics
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Chunks received from the peer
    pub chunks_received: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Chunks written to the peer
    pub chunks_sent: u64,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Keep-alive / control messages received
    pub keepalives: u64,
    /// Connection duration
    pub duration: Duration,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_received(&mut self, size: usize) {
        self.chunks_received += 1;
        self.bytes_received += size as u64;
    }

    pub fn on_sent(&mut self, size: usize) {
        self.chunks_sent += 1;
        self.bytes_sent += size as u64;
    }
}

/// Server-wide counters, shared across connection tasks
#[derive(Debug)]
pub struct RelayStats {
    started_at: Instant,
    total_connections: AtomicU64,
    active_producers: AtomicU64,
    active_consumers: AtomicU64,
    rejected_connections: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RelayStatsSnapshot {
    pub total_connections: u64,
    pub active_producers: u64,
    pub active_consumers: u64,
    pub rejected_connections: u64,
    pub uptime_secs: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_connections: AtomicU64::new(0),
            active_producers: AtomicU64::new(0),
            active_consumers: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
        }
    }

    pub fn producer_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_producers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn producer_closed(&self) {
        self.active_producers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn consumer_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_consumers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn consumer_closed(&self) {
        self.active_consumers.fetch_sub(1, Ordering::Relaxed);
    }

    /// Connection refused before upgrade (limit reached)
    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_producers: self.active_producers.load(Ordering::Relaxed),
            active_consumers: self.active_consumers.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_stats_new() {
        let stats = SessionStats::new();
        assert_eq!(stats.chunks_received, 0);
        assert_eq!(stats.bytes_received, 0);
        assert_eq!(stats.chunks_sent, 0);
        assert_eq!(stats.bytes_sent, 0);
    }

    #[test]
    fn test_session_stats_counts() {
        let mut stats = SessionStats::new();
        stats.on_received(100);
        stats.on_received(50);
        stats.on_sent(10);

        assert_eq!(stats.chunks_received, 2);
        assert_eq!(stats.bytes_received, 150);
        assert_eq!(stats.chunks_sent, 1);
        assert_eq!(stats.bytes_sent, 10);
    }

    #[test]
    fn test_relay_stats_counters() {
        let stats = RelayStats::new();
        stats.producer_opened();
        stats.consumer_opened();
        stats.consumer_opened();
        stats.consumer_closed();
        stats.connection_rejected();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_connections, 3);
        assert_eq!(snapshot.active_producers, 1);
        assert_eq!(snapshot.active_consumers, 1);
        assert_eq!(snapshot.rejected_connections, 1);
    }
}
