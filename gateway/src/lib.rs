pub mod api;
pub mod auth;
pub mod completion;
pub mod config;
pub mod errors;

pub use api::{AppState, router};
pub use errors::GatewayError;

use tokio::net::TcpListener;

pub const SERVICE_NAME: &str = "Gastos Tracker API";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Serves the gateway API until the process receives Ctrl-C.
pub async fn serve(config: &config::Config, state: AppState) -> Result<(), GatewayError> {
    let app = router(state, &config.allowed_origins)?;

    let addr = format!("{}:{}", config.listener.host, config.listener.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
