//! floki-proxy: a forward HTTP proxy that injects synthetic failures.

pub mod cli;
pub mod config;
pub mod error;
pub mod faults;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use faults::{FaultInjector, PrefixFailureTable};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use observability::MethodCounters;
