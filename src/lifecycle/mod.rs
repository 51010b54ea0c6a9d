//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Parse flags → Load config → Validate → Bind listener → Serve
//!
//! Shutdown (shutdown.rs):
//!     SIGTERM/SIGINT → broadcast → server drains, counter reporter exits
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds last (traffic only when ready)

pub mod shutdown;

pub use shutdown::Shutdown;
