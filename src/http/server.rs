//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the four bridges and the health route
//! - Wire up middleware (request ID, tracing, timeout, body limit, metrics)
//! - Swap the bridge policy when a new config arrives
//! - Serve until shutdown, ending streaming sessions first

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    extract::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::http::context::BusContext;
use crate::http::{kv, publish, reply, subscribe};
use crate::observability::metrics;
use crate::security::headers::ForwardPolicy;

/// Bridge settings that can change while the server runs.
#[derive(Debug, Clone)]
pub struct BridgePolicy {
    pub forward: ForwardPolicy,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    /// `None` disables SSE keep-alive comments.
    pub keep_alive: Option<Duration>,
    pub channel_capacity: usize,
}

impl BridgePolicy {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let keep_alive = match config.stream.keep_alive_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            forward: ForwardPolicy::from_names(&config.forwarding.request_headers),
            request_timeout: Duration::from_millis(config.bus.request_timeout_ms),
            poll_interval: Duration::from_secs(config.bus.poll_interval_secs),
            keep_alive,
            channel_capacity: config.stream.channel_capacity,
        }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub ctx: BusContext,
    pub policy: Arc<ArcSwap<BridgePolicy>>,
    /// Parent of every streaming session token.
    pub sessions: CancellationToken,
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    version: &'static str,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server over `ctx` with the given configuration.
    pub fn new(config: GatewayConfig, ctx: BusContext) -> Self {
        let state = AppState {
            ctx,
            policy: Arc::new(ArcSwap::from_pointee(BridgePolicy::from_config(&config))),
            sessions: CancellationToken::new(),
        };
        let router = Self::build_router(&config, state.clone());
        Self {
            router,
            config,
            state,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/pub/{*subject}", post(publish::publish_handler))
            .route("/req/{*subject}", post(reply::request_handler))
            .route("/sub/{*subject}", get(subscribe::subscribe_handler))
            .route("/kv/{bucket}/{*key}", any(kv::kv_handler))
            .route("/healthz", get(health_handler))
            .with_state(state)
            .layer(middleware::from_fn(track_metrics))
            // Separate layer: TimeoutLayer needs a Default response body.
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// The router, for serving on a custom listener or in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` is cancelled.
    ///
    /// Configs received on `config_updates` replace the bridge policy.
    /// On shutdown, open streaming sessions are cancelled before the
    /// server drains the remaining connections.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: CancellationToken,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            bus = %self.config.bus.url,
            "HTTP server starting"
        );

        let policy = self.state.policy.clone();
        let reload_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = reload_shutdown.cancelled() => break,
                    update = config_updates.recv() => match update {
                        Some(config) => {
                            policy.store(Arc::new(BridgePolicy::from_config(&config)));
                            tracing::info!("Bridge policy reloaded");
                        }
                        None => break,
                    },
                }
            }
        });

        let sessions = self.state.sessions.clone();
        let shutdown_signal = async move {
            shutdown.cancelled().await;
            tracing::info!("Shutting down, closing streaming sessions");
            sessions.cancel();
        };

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Record count and latency per bridge.
async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let bridge = bridge_label(request.uri().path());
    let response = next.run(request).await;
    metrics::record_request(bridge, response.status().as_u16(), start);
    response
}

fn bridge_label(path: &str) -> &'static str {
    match path.trim_start_matches('/').split('/').next() {
        Some("pub") => "publish",
        Some("req") => "request",
        Some("sub") => "subscribe",
        Some("kv") => "kv",
        Some("healthz") => "health",
        _ => "other",
    }
}
