//! Shared handler state.

use metrics_exporter_prometheus::PrometheusHandle;
use sentinel_ingestion::{LogTailer, Pipeline};
use std::{fmt, sync::Arc, time::Duration};

/// Renders the process-wide Prometheus recorder
#[derive(Clone)]
pub struct MetricsHandle(PrometheusHandle);

impl MetricsHandle {
    pub fn new(handle: PrometheusHandle) -> Self {
        Self(handle)
    }

    pub fn render(&self) -> String {
        self.0.render()
    }
}

impl fmt::Debug for MetricsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MetricsHandle")
    }
}

/// State injected into every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub tailer: LogTailer,
    /// Interval between keep-alive comments on event streams
    pub keep_alive: Duration,
    /// Reported by the health endpoint
    pub version: String,
    pub metrics: Option<MetricsHandle>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, tailer: LogTailer, keep_alive: Duration) -> Self {
        Self {
            pipeline,
            tailer,
            keep_alive,
            version: env!("CARGO_PKG_VERSION").to_string(),
            metrics: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Serve `handle` on the metrics route
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(MetricsHandle::new(handle));
        self
    }
}
