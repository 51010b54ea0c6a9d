//! floki-proxy
//!
//! A forward HTTP proxy that injects synthetic failures into a live traffic
//! path.
//!
//! ```text
//!  client ──▶ floki-proxy ──▶ upstream (the request's absolute URI)
//!              │
//!              ├─ failure-rate           → immediate 500
//!              ├─ fail-with-prefix       → configured status
//!              └─ failure-transfer-rate  → response cut after a chunk
//! ```
//!
//! Run: `floki-proxy --failure-rate 10 --fail-with-prefix "/small3/aaa:503"`

use tokio::net::TcpListener;

use floki_proxy::cli::Cli;
use floki_proxy::observability::logging::init_tracing;
use floki_proxy::{HttpServer, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_args();
    let fallback_level = cli.log_level.clone().unwrap_or_else(|| "info".to_string());

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&fallback_level);
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    init_tracing(&config.observability.log_level);

    let address = config.listener.socket_addr();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        address = %address,
        failure_rate = config.faults.failure_rate,
        transfer_failure_rate = config.faults.transfer_failure_rate,
        fail_with_prefix = %config.faults.fail_with_prefix,
        stage_chunked_bodies = config.buffering.stage_chunked_bodies,
        upstream_timeout_secs = config.timeouts.upstream_secs,
        "floki-proxy starting"
    );

    let listener = TcpListener::bind(address).await?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(shutdown.trigger_on_signal());

    HttpServer::new(config).run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
