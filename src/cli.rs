//! Command-line interface.
//!
//! Flags override the values read from `--config`, which in turn override
//! the built-in defaults. Long flags are also accepted with a single dash
//! (`-failure-rate=10`).

use std::ffi::OsString;
use std::net::IpAddr;
use std::path::PathBuf;

use clap::{CommandFactory, Parser};

use crate::config::{read_config, validate_config, ConfigError, ProxyConfig};
use crate::faults::PrefixFailureTable;

#[derive(Parser, Debug)]
#[command(name = "floki-proxy", version)]
#[command(about = "Forward HTTP proxy that injects synthetic failures", long_about = None)]
#[command(after_help = "Long flags may also be written with a single dash, e.g. -failure-rate=10")]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on [default: 0.0.0.0]
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Proxy port [default: 9005]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Percentage of requests failed with a 500, in [0, 100]
    #[arg(long)]
    pub failure_rate: Option<u8>,

    /// Percentage of failure applied to every streamed response chunk, in [0, 100]
    #[arg(long)]
    pub failure_transfer_rate: Option<u8>,

    /// Fail every request under a prefix: "prefix:code;prefix:code"
    #[arg(long)]
    pub fail_with_prefix: Option<PrefixFailureTable>,

    /// Stage request bodies without a Content-Length to a temporary file
    #[arg(long)]
    pub stage_chunked_bodies: bool,

    /// Seconds to wait for upstream response headers [default: 30]
    #[arg(long)]
    pub upstream_timeout_secs: Option<u64>,

    /// Log level, unless RUST_LOG is set [default: info]
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Parse the process arguments, accepting single-dash long flags.
    pub fn parse_args() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }

    /// Apply the flags on top of `config`.
    pub fn apply(self, mut config: ProxyConfig) -> ProxyConfig {
        if let Some(bind) = self.bind {
            config.listener.bind = bind;
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(rate) = self.failure_rate {
            config.faults.failure_rate = rate;
        }
        if let Some(rate) = self.failure_transfer_rate {
            config.faults.transfer_failure_rate = rate;
        }
        if let Some(table) = self.fail_with_prefix {
            config.faults.fail_with_prefix = table;
        }
        if self.stage_chunked_bodies {
            config.buffering.stage_chunked_bodies = true;
        }
        if let Some(secs) = self.upstream_timeout_secs {
            config.timeouts.upstream_secs = secs;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        config
    }

    /// Resolve the effective, validated configuration.
    pub fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let base = match &self.config {
            Some(path) => read_config(path)?,
            None => ProxyConfig::default(),
        };
        let config = self.apply(base);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

/// Rewrite `-name` and `-name=value` to `--name` when `name` is a long flag.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let command = Cli::command();
    let longs: Vec<&str> = command.get_arguments().filter_map(|arg| arg.get_long()).collect();

    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            let Some(text) = arg.to_str() else {
                return arg;
            };
            let Some(rest) = text.strip_prefix('-').filter(|rest| !rest.starts_with('-')) else {
                return arg;
            };
            let name = rest.split_once('=').map_or(rest, |(name, _)| name);
            if longs.contains(&name) {
                OsString::from(format!("-{text}"))
            } else {
                arg
            }
        })
        .collect()
}
