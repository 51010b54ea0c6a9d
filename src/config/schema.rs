//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::faults::PrefixFailureTable;

/// Root configuration for the fault-injecting proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, port).
    pub listener: ListenerConfig,

    /// Failure injection settings.
    pub faults: FaultConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request body staging.
    pub buffering: BufferingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address to bind (e.g., "0.0.0.0").
    pub bind: IpAddr,

    /// Port to listen on.
    pub port: u16,
}

impl ListenerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9005,
        }
    }
}

/// Failure injection configuration.
///
/// Rates are percentages in `[0, 100]`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FaultConfig {
    /// Percentage of requests answered with an immediate 500.
    pub failure_rate: u8,

    /// Percentage applied to every streamed response chunk.
    pub transfer_failure_rate: u8,

    /// Paths that always fail, with the status to fail with.
    pub fail_with_prefix: PrefixFailureTable,
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed until upstream response headers arrive, in seconds.
    pub upstream_secs: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn upstream(&self) -> Duration {
        Duration::from_secs(self.upstream_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 30,
        }
    }
}

/// Request body staging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BufferingConfig {
    /// Stage bodies sent without a Content-Length to a temporary file so the
    /// upstream receives an exact length.
    pub stage_chunked_bodies: bool,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Interval between method counter dumps, in seconds.
    pub counters_interval_secs: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            counters_interval_secs: 10,
        }
    }
}
