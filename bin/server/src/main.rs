use ratline_core::Result;
use ratline_server::{
    app::{AppState, router},
    config::ServerConfig,
    error::StartupError,
};
use ratline_traffic::TrafficControl;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ratline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().map_err(|e| StartupError::Config {
        details: e.to_string(),
    })?;
    tracing::info!(
        anonymous = config.traffic.anonymous,
        authenticated = config.traffic.authenticated,
        administrator = config.traffic.administrator,
        "Loaded configuration"
    );

    let traffic = TrafficControl::new(config.traffic);
    let reset_task = traffic.spawn_reset_task();
    tracing::info!(resets_at = %traffic.epoch_ends_at(), "Traffic control started");

    let app = router(AppState::new(traffic));

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .map_err(|e| StartupError::Bind {
            address: config.bind_address.clone(),
            details: e.to_string(),
        })?;

    tracing::info!("listening on http://{}", config.bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| StartupError::Serve {
        details: e.to_string(),
    })?;

    reset_task.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
