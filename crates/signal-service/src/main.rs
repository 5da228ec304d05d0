//! Signaling router host process.
//!
//! Connects discovery, then runs the node-channel pruner, the registry
//! gauges, and the health and metrics server until shutdown. The signaling
//! transport is not part of this binary: it embeds the library and drives a
//! `signal_service::dispatch::Dispatcher` built over the same registry,
//! discovery, and connector.

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use common::secret::ExposeSecret;
use signal_service::config::{Config, DiscoveryConfig};
use signal_service::discovery::{NodeDirectory, RedisNodeDirectory, StaticNodeDirectory};
use signal_service::observability::{
    health_router, metrics::init_metrics_recorder, spawn_registry_gauges, HealthState,
};
use signal_service::registry::PeerRegistry;
use signal_service::rpc::{spawn_channel_pruner, GrpcConnector};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signal_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting signaling router");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        node_id = %config.node_id,
        health_bind_address = %config.health_bind_address,
        relay_call_timeout_ms = config.relay_call_timeout.as_millis(),
        rpc_connect_timeout_ms = config.rpc_connect_timeout.as_millis(),
        channel_prune_interval_s = config.channel_prune_interval.as_secs(),
        "Configuration loaded successfully"
    );

    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let health_state = Arc::new(HealthState::new());

    let nodes: Arc<dyn NodeDirectory> = match &config.discovery {
        DiscoveryConfig::Redis(url) => {
            info!("Connecting to Redis for node discovery...");
            let directory = RedisNodeDirectory::connect(url.expose_secret())
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to connect to Redis");
                    e.to_string()
                })?;
            info!("Redis connection established");
            Arc::new(directory)
        }
        DiscoveryConfig::Static(list) => {
            info!(nodes = list.len(), "Using static node list for discovery");
            Arc::new(StaticNodeDirectory::new(list.clone()))
        }
    };

    let connector = Arc::new(GrpcConnector::new(config.rpc_connect_timeout));
    let registry = Arc::new(PeerRegistry::new());

    let shutdown_token = CancellationToken::new();

    let pruner = spawn_channel_pruner(
        connector,
        nodes,
        config.channel_prune_interval,
        shutdown_token.child_token(),
    );

    let gauges = spawn_registry_gauges(
        Arc::clone(&registry),
        config.gauge_refresh_interval,
        shutdown_token.child_token(),
    );

    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let app = health_router(Arc::clone(&health_state)).merge(metrics_router);

    let listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;

    let health_shutdown_token = shutdown_token.child_token();
    let health_server = tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    health_state.set_ready();
    info!("Signaling router running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    health_state.set_not_ready();
    shutdown_token.cancel();

    if tokio::time::timeout(Duration::from_secs(5), async {
        let _ = pruner.await;
        let _ = gauges.await;
        let _ = health_server.await;
    })
    .await
    .is_err()
    {
        error!("Background tasks did not stop in time");
    }

    info!("Signaling router shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
