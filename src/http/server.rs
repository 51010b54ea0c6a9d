//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (request ID, tracing)
//! - Build the upstream HTTP client with explicit timeouts
//! - Run the counter reporter next to the server
//! - Serve until the shutdown signal fires

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::Router;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::faults::FaultInjector;
use crate::http::handler::proxy_handler;
use crate::http::request::UuidRequestId;
use crate::observability::{CounterReporter, MethodCounters};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Client<HttpConnector, Body>,
    pub faults: Arc<FaultInjector>,
    pub counters: Arc<MethodCounters>,
    pub upstream_timeout: Duration,
    pub stage_chunked_bodies: bool,
}

impl AppState {
    pub fn new(config: &ProxyConfig, faults: FaultInjector) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.timeouts.connect()));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            faults: Arc::new(faults),
            counters: Arc::new(MethodCounters::new()),
            upstream_timeout: config.timeouts.upstream(),
            stage_chunked_bodies: config.buffering.stage_chunked_bodies,
        }
    }
}

/// Build the Axum router with all middleware layers.
///
/// Every method and path goes to the proxy handler.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(proxy_handler)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

/// HTTP server for the fault-injecting proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    counters: Arc<MethodCounters>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Self {
        let faults = FaultInjector::new(&config.faults);
        Self::with_injector(config, faults)
    }

    /// Create a server with a specific fault injector (e.g. a seeded one).
    pub fn with_injector(config: ProxyConfig, faults: FaultInjector) -> Self {
        let state = AppState::new(&config, faults);
        let counters = state.counters.clone();
        let router = build_router(state);
        Self {
            router,
            config,
            counters,
        }
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let reporter = CounterReporter::new(
            self.counters.clone(),
            Duration::from_secs(self.config.observability.counters_interval_secs),
        );
        tokio::spawn(reporter.run(shutdown.resubscribe()));

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Per-method counters of forwarded requests.
    pub fn counters(&self) -> Arc<MethodCounters> {
        self.counters.clone()
    }
}
