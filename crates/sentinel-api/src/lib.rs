//! # Sentinel API
//!
//! HTTP surface for sentinel built on axum.
//!
//! - `POST /detect`: ingest one sample
//! - `GET /anomalies`: anomalies detected since startup
//! - `GET /read_log`: anomalies replayed from the persisted log
//! - `GET /stream_data`, `GET /stream_anomalies`: live server-sent events
//! - `GET /health`, `GET /stats`: service status
//! - `GET /metrics`: Prometheus exposition

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

use sentinel_core::config::Config;
use std::{future::Future, net::SocketAddr, time::Duration};
use tracing::info;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use state::{AppState, MetricsHandle};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address
    pub bind_addr: SocketAddr,
    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
    /// Request timeout in seconds (does not bound open event streams)
    pub timeout_secs: u64,
    /// Enable per-request logging
    pub enable_logging: bool,
    /// Route serving Prometheus metrics
    pub metrics_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8001)),
            cors_origins: vec!["*".to_string()],
            timeout_secs: 30,
            enable_logging: true,
            metrics_path: "/metrics".to_string(),
        }
    }
}

impl ApiConfig {
    /// Build from the `server` section of the service configuration
    pub fn from_config(config: &Config) -> sentinel_core::Result<Self> {
        let bind_addr = format!("{}:{}", config.server.host, config.server.port)
            .parse::<SocketAddr>()
            .map_err(|e| {
                sentinel_core::Error::config(format!(
                    "invalid bind address {}:{}: {}",
                    config.server.host, config.server.port, e
                ))
            })?;

        Ok(Self {
            bind_addr,
            cors_origins: config.server.cors_origins.clone(),
            timeout_secs: config.server.request_timeout_secs,
            enable_logging: true,
            metrics_path: config.server.metrics_path.clone(),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Binds the router to a TCP listener
#[derive(Debug)]
pub struct ApiServer {
    config: ApiConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ApiConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    ///
    /// Open event streams only end once the tailer's shutdown signal fires,
    /// so callers should flip it before (or together with) `shutdown`.
    pub async fn serve<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        let addr = listener.local_addr()?;
        let app = routes::create_router(&self.config, self.state);

        info!(%addr, "API server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("API server shut down gracefully");
        Ok(())
    }
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{ApiConfig, ApiError, ApiServer, AppState};
}
