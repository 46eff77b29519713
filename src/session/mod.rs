//! Per-connection session bookkeeping

pub mod context;
pub mod state;

pub use context::{SessionContext, SessionRole};
pub use state::{CloseReason, SessionPhase, SessionReport, SessionState};
