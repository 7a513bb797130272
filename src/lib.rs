//! ws-rtt library
//!
//! WebSocket round-trip latency measurement: an echo server with per-connection
//! liveness probing and a client that keeps exactly one measurement in flight.

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod log_sink;
pub mod models;
pub mod server;
pub mod snowflake;
pub mod stats;
pub mod version;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::api::AppState;

/// Create the application router with the given state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check for load balancers
        .route("/ping", get(api::health::ping))
        // Metrics (Prometheus)
        .route("/metrics", get(api::metrics::metrics_handler))
        // Every other path upgrades to the echo WebSocket
        .fallback(api::ws::ws_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
