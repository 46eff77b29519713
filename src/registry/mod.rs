//! Stream registry for producer/consumer routing
//!
//! The registry owns one channel per stream identifier and routes chunks
//! from the stream's producer to its consumers. Each consumer is a bounded
//! queue drained by its own view session, so broadcasting never waits on a
//! slow socket.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<StreamRegistry>
//!                     ┌─────────────────────────┐
//!                     │ channels: HashMap<Id,   │
//!                     │   Mutex<StreamChannel { │
//!                     │     init_segment,       │
//!                     │     chunk_seq,          │
//!                     │     consumers,          │
//!                     │   }>                    │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Ingest]               [View]                  [View]
//!    conn.recv()            queue.recv()            queue.recv()
//!         │                       │                       │
//!         └──► registry.publish()──► conn.send() ──► WebSocket
//! ```
//!
//! # Late joiners
//!
//! The first chunk of a producer session is cached as the init segment and
//! queued to every consumer at registration, under the same lock that
//! orders broadcasts. A consumer therefore sees the init segment before any
//! live chunk and never sees chunks broadcast before it joined.
//!
//! `bytes::Bytes` is reference counted, so all consumers share one
//! allocation per chunk.

pub mod channel;
pub mod config;
pub mod consumer;
pub mod error;
pub mod frame;
pub mod producer;
pub mod store;

pub use channel::{ChannelStats, StreamChannel};
pub use config::RegistryConfig;
pub use consumer::{ConsumerHandle, ConsumerId, ConsumerQueue};
pub use error::RegistryError;
pub use frame::{Delivery, Published, StreamId};
pub use producer::ProducerLease;
pub use store::StreamRegistry;
