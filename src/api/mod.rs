pub mod health;
pub mod metrics;
pub mod ws;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::heartbeat::HeartbeatConfig;

/// Shared application state
#[derive(Clone, Default)]
pub struct AppState {
    pub heartbeat: HeartbeatConfig,
    /// Set when a Prometheus recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(heartbeat: HeartbeatConfig) -> Self {
        Self {
            heartbeat,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
