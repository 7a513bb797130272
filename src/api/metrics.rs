use axum::extract::State;
use axum::response::IntoResponse;

use crate::api::AppState;
use crate::version::VERSION;

/// Prometheus metrics endpoint
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = format!(
        "# HELP ws_rtt_info ws-rtt server info\n# TYPE ws_rtt_info gauge\nws_rtt_info{{version=\"{}\"}} 1\n",
        VERSION
    );
    if let Some(handle) = &state.metrics {
        body.push_str(&handle.render());
    }

    ([("content-type", "text/plain; charset=utf-8")], body)
}
