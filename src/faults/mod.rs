//! Failure injection subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → decision.rs (global failure roll)     → 500
//!     → prefix.rs   (path prefix lookup)      → configured status
//!     → forwarded
//!         → decision.rs (roll per streamed chunk) → aborted transfer
//! ```
//!
//! # Design Decisions
//! - All randomness goes through one `RollSource`, so tests can script it
//! - Decisions hold no mutable state besides the random source

pub mod decision;
pub mod prefix;

pub use decision::{FaultInjector, RollSource, ScriptedSource, SeededSource, ThreadRngSource};
pub use prefix::{PrefixFailureTable, PrefixFormatError};
