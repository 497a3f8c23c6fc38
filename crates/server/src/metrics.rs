//! Prometheus metrics endpoint

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global Prometheus recorder. Call once at startup; later
/// calls are no-ops (tests spin up multiple servers in one process).
pub fn init_metrics() {
    let _ = HANDLE.get_or_try_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| {
                tracing::warn!(error = %e, "metrics recorder not installed");
                e
            })
    });
}

/// Render the current metric registry.
pub async fn metrics_handler() -> String {
    HANDLE.get().map(|h| h.render()).unwrap_or_default()
}
