//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! http handler
//!     → logging.rs (structured per-request outcome events)
//!     → counters.rs (per-method counts, dumped every interval)
//! ```
//!
//! # Design Decisions
//! - Structured logging through `tracing`
//! - Request ID flows through every per-request event
//! - No metrics endpoint; counters go to the log

pub mod counters;
pub mod logging;

pub use counters::{CounterReporter, MethodCounters};
