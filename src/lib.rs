//! Live media chunk relay
//!
//! A producer uploads a live media stream as a sequence of opaque chunks over
//! a WebSocket; every consumer connected to the same stream id receives each
//! chunk in order. The first chunk of a producer session is the init segment.
//! It is cached per stream and replayed to consumers that join late, so a
//! player can always start decoding. Every ingested chunk can also be
//! mirrored to a durable log (Kafka) for downstream processing.
//!
//! # Example
//!
//! ```no_run
//! use media_relay::{RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> media_relay::Result<()> {
//!     let config = ServerConfig::with_addr("0.0.0.0:8000".parse().unwrap());
//!     let server = RelayServer::new(config);
//!     server.run().await
//! }
//! ```

pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod sink;
pub mod stats;

pub use error::{Error, Result};
pub use registry::{RegistryConfig, StreamId, StreamRegistry};
pub use server::{RelayServer, ServerConfig};
pub use sink::{LogSink, SinkConfig};
