//! Analytics bridge: detection engine in, HTTP events out

use std::net::SocketAddr;
use std::sync::Arc;

use analytics_bridge::engine::{self, DetectionEngine};
use analytics_bridge::params::PendingParameters;
use analytics_bridge::pipeline::{ConfigApplier, Dispatcher, EventIngest, EventQueue};
use analytics_bridge::server::{self, ServerState};
use analytics_bridge::{shared_settings, utils, Config, RuntimeSettings};
use color_eyre::{eyre::WrapErr, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "analytics_bridge=info".into()),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Analytics bridge launching...");

    // Load configuration
    let mut config = Config::load().wrap_err("failed to load configuration")?;
    if let Some(port) = utils::port_from_args(std::env::args().skip(1)) {
        config.server.port = port;
    }
    let port = config.server.port;

    // Shared state
    let settings = shared_settings(RuntimeSettings::from(&config.defaults));
    let queue = Arc::new(EventQueue::with_limit(config.dispatch.max_pending));
    let pending = Arc::new(PendingParameters::new());

    // Engine
    let engine = engine::build_engine(&config.engine)?;
    if let Err(e) = engine.initialize(i32::from(port)) {
        error!("Engine initialization failed: {}", e);
    }

    let dispatcher = Dispatcher::new(queue.clone(), settings.clone(), &config.dispatch)?;
    let dispatch_handle = tokio::spawn(dispatcher.run());

    let ingest = Arc::new(EventIngest::new(i32::from(port), queue, settings.clone()));
    engine.register_callback(ingest.into_callback())?;

    let applier = ConfigApplier::new(pending.clone(), settings, engine.clone(), &config.applier);
    let applier_handle = tokio::spawn(applier.run());

    // Configuration server
    let addr: SocketAddr = format!("{}:{}", config.server.host, port)
        .parse()
        .wrap_err("invalid server address")?;
    let listener = TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))?;
    let app = server::app(ServerState::new(pending), config.server.request_timeout());

    let served = server::serve(listener, app, shutdown_signal()).await;

    info!("Analytics bridge shutting down");
    dispatch_handle.abort();
    applier_handle.abort();
    shutdown_engine(engine.as_ref());

    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn shutdown_engine(engine: &dyn DetectionEngine) {
    if let Err(e) = engine.unregister_callback() {
        warn!("Failed to unregister callback: {}", e);
    }
    if let Err(e) = engine.deinitialize() {
        warn!("Failed to deinitialize engine: {}", e);
    }
}
