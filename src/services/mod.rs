//! Session protocol engine
//!
//! - pacer: process-wide spacing of outbound provider calls
//! - backoff: dual-class exponential retry with an absolute deadline
//! - bootstrap: compliance tracking for the mandatory startup sequence
//! - session: turn engine and termination protocol
//! - dispatch: typed tool multiplexing onto the memory service

pub mod backoff;
pub mod bootstrap;
pub mod dispatch;
pub mod error;
pub mod pacer;
pub mod session;

pub use backoff::{BackoffClass, BackoffSchedule, BackoffState};
pub use bootstrap::BootstrapTracker;
pub use dispatch::ToolInvocation;
pub use error::EngineError;
pub use pacer::RequestPacer;
pub use session::{CONTROL_PREFIX, END_SESSION_TOKEN, SessionOptions, SessionRunner};
