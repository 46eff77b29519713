//! Relay server
//!
//! Producers connect to `{prefix}/upload/{stream_id}` and push chunks;
//! consumers connect to `{prefix}/live/{stream_id}` and receive them.

pub mod config;
pub mod connection;
pub mod ingest;
pub mod listener;
pub mod view;

pub use config::ServerConfig;
pub use connection::{Inbound, RelayConnection, WsConnection};
pub use ingest::IngestSession;
pub use listener::RelayServer;
pub use view::{ViewSession, ViewTimeouts};
