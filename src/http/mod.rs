//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → handler.rs (failure gates, counting, upstream call)
//!         → buffering.rs (stage bodies without a Content-Length, optional)
//!         → request.rs (forwarded headers, upstream request)
//!     → transfer.rs (stream response, inject transfer failures, log outcome)
//!     → Send to client
//! ```

pub mod buffering;
pub mod handler;
pub mod request;
pub mod server;
pub mod transfer;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
