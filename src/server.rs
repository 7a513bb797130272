//! Server mode

use std::future::Future;
use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::api::AppState;
use crate::config::Config;
use crate::create_router;
use crate::error::AppResult;

/// Bind `config.addr` and serve until Ctrl-C.
pub async fn run(config: &Config) -> AppResult<()> {
    let mut state = AppState::new(config.heartbeat());
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => warn!("Prometheus recorder not installed: {}", e),
    }

    let listener = TcpListener::bind(config.bind_addr()).await?;
    let local = listener.local_addr()?;
    info!("WebSocket server listening on {}", local);
    info!("Health check endpoint available at http://{}/ping", local);

    serve(listener, state, shutdown_signal()).await
}

/// Serve the router on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
