use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use media_relay::registry::RegistryConfig;
use media_relay::sink::{LogSink, SinkConfig};
use media_relay::{Error, RelayServer, Result, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "media-relay")]
#[command(about = "Live media chunk relay", long_about = None)]
struct Args {
    /// Listen address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, env = "MAX_CONNECTIONS", default_value = "0")]
    max_connections: usize,

    /// Close sessions with no inbound traffic after this many seconds
    #[arg(long, env = "IDLE_TIMEOUT_SECS", default_value = "60")]
    idle_timeout_secs: u64,

    /// Drop a consumer whose socket write takes longer than this
    #[arg(long, env = "SEND_TIMEOUT_MS", default_value = "5000")]
    send_timeout_ms: u64,

    /// Keep-alive ping interval for consumers, in seconds
    #[arg(long, env = "PING_INTERVAL_SECS", default_value = "20")]
    ping_interval_secs: u64,

    /// Largest inbound WebSocket message accepted, in bytes
    #[arg(long, env = "MAX_MESSAGE_SIZE", default_value = "16777216")]
    max_message_size: usize,

    /// Largest init segment cached for late joiners, in bytes
    #[arg(long, env = "MAX_INIT_SEGMENT_SIZE", default_value = "8388608")]
    max_init_segment_size: usize,

    /// Outbound queue capacity per consumer, in chunks
    #[arg(long, env = "CONSUMER_QUEUE_CAPACITY", default_value = "256")]
    consumer_queue_capacity: usize,

    /// Route prefix for the upload and live endpoints
    #[arg(long, env = "ROUTE_PREFIX", default_value = "/stream")]
    route_prefix: String,

    /// Kafka bootstrap servers; mirroring is disabled when unset
    #[arg(long, env = "KAFKA_BOOTSTRAP_SERVERS")]
    kafka_bootstrap_servers: Option<String>,

    /// Pending log records before new ones are dropped
    #[arg(long, env = "LOG_QUEUE_CAPACITY", default_value = "1024")]
    log_queue_capacity: usize,

    /// Log backend acknowledgements awaited at once
    #[arg(long, env = "LOG_MAX_IN_FLIGHT", default_value = "64")]
    log_max_in_flight: usize,

    /// Default log filter (RUST_LOG takes precedence)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .map_err(|e| Error::Config(format!("log level {:?}: {}", args.log_level, e)))?;
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .compact()
        .init();

    let server_config = ServerConfig::with_addr(args.bind_addr)
        .max_connections(args.max_connections)
        .idle_timeout(Duration::from_secs(args.idle_timeout_secs))
        .send_timeout(Duration::from_millis(args.send_timeout_ms))
        .ping_interval(Duration::from_secs(args.ping_interval_secs))
        .max_message_size(args.max_message_size)
        .route_prefix(&args.route_prefix);
    server_config.validate()?;

    let registry_config = RegistryConfig::default()
        .consumer_queue_capacity(args.consumer_queue_capacity)
        .max_init_segment_size(args.max_init_segment_size);

    let mut sink_config = SinkConfig::default()
        .queue_capacity(args.log_queue_capacity)
        .max_in_flight(args.log_max_in_flight);
    if let Some(brokers) = &args.kafka_bootstrap_servers {
        sink_config = sink_config.brokers(brokers.as_str());
    }
    let (sink, worker) = build_sink(&sink_config);

    tracing::info!(
        addr = %args.bind_addr,
        max_connections = args.max_connections,
        log_sink = sink.is_enabled(),
        "Media relay starting"
    );

    let server = RelayServer::with_parts(server_config, registry_config, sink);
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;
    drop(server);

    // Open sessions still hold sink handles, so the flush is bounded
    if let Some(worker) = worker {
        if tokio::time::timeout(sink_config.message_timeout, worker).await.is_err() {
            tracing::warn!("Log sink did not drain before shutdown");
        }
    }

    tracing::info!("Media relay stopped");
    Ok(())
}

#[cfg(feature = "kafka")]
fn build_sink(config: &SinkConfig) -> (LogSink, Option<JoinHandle<()>>) {
    use media_relay::sink::KafkaBackend;

    let Some(brokers) = config.brokers.as_deref() else {
        tracing::info!("No Kafka brokers configured; running broadcast-only");
        return (LogSink::disabled(), None);
    };

    match KafkaBackend::new(brokers, config) {
        Ok(backend) => {
            tracing::info!(brokers = brokers, "Mirroring chunks to Kafka");
            let (sink, worker) = LogSink::spawn(backend, config);
            (sink, Some(worker))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Kafka producer unavailable; running broadcast-only");
            (LogSink::disabled(), None)
        }
    }
}

#[cfg(not(feature = "kafka"))]
fn build_sink(config: &SinkConfig) -> (LogSink, Option<JoinHandle<()>>) {
    if config.brokers.is_some() {
        tracing::warn!("Kafka brokers configured but built without the `kafka` feature; running broadcast-only");
    }
    (LogSink::disabled(), None)
}
