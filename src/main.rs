//! Bus Gateway
//!
//! Exposes a message bus over HTTP.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │                 BUS GATEWAY                  │
//!                         │                                              │
//!   POST /pub/{subject} ──┼─▶ publish ──┐                                │
//!   POST /req/{subject} ──┼─▶ reply ────┤   ┌──────────┐   ┌──────────┐  │
//!   GET  /sub/{subject} ◀─┼── subscribe ┼──▶│ BusCtx   │──▶│MessageBus│──┼──▶ NATS
//!   *    /kv/{b}/{key}  ──┼─▶ kv ───────┘   │ + authz  │   └──────────┘  │
//!                         │                 └──────────┘                 │
//!                         │  config (hot reload) · tracing · metrics     │
//!                         └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use bus_gateway::bus::{MemoryBus, MessageBus, NatsBus};
use bus_gateway::config::watcher::ConfigWatcher;
use bus_gateway::config::{load_config, GatewayConfig};
use bus_gateway::lifecycle::{signals, Shutdown};
use bus_gateway::observability::{logging, metrics};
use bus_gateway::security::auth;
use bus_gateway::{BusContext, HttpServer};

#[derive(Parser)]
#[command(name = "bus-gateway")]
#[command(about = "HTTP gateway to a NATS message bus", long_about = None)]
struct Args {
    /// Path to a TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "bus-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        bus_url = %config.bus.url,
        request_timeout_ms = config.bus.request_timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let bus: Arc<dyn MessageBus> = if config.bus.url.starts_with("memory://") {
        tracing::warn!("Using the in-process bus; messages stay inside this gateway");
        Arc::new(MemoryBus::new())
    } else {
        Arc::new(NatsBus::connect(&config.bus.url, &config.bus.connection_name).await?)
    };
    let ctx = BusContext::new(bus, Arc::from(auth::from_config(&config.auth)));

    // Keep the watcher alive for the lifetime of the server.
    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config, ctx);
    server.run(listener, config_updates, shutdown.token()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
