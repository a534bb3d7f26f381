//! API route definitions.
//!
//! ## Ingestion
//! - `POST /detect` - Classify and persist one sample
//!
//! ## Queries
//! - `GET /anomalies` - Anomalies detected since startup
//! - `GET /read_log` - Replay of the persisted anomaly log
//! - `GET /stats` - Detector window state
//!
//! ## Streams (server-sent events)
//! - `GET /stream_data` - Every sample appended from now on
//! - `GET /stream_anomalies` - Every anomaly appended from now on
//!
//! ## Infrastructure
//! - `GET /health` - Storage reachability and version
//! - `GET /metrics` - Prometheus metrics

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;

use crate::{
    handlers::{
        detect, health, list_anomalies, metrics_handler, pipeline_stats, read_log,
        stream_anomalies, stream_data,
    },
    middleware::{cors_middleware, logging_middleware},
    ApiConfig, AppState,
};

/// Create the API router
pub fn create_router(config: &ApiConfig, state: AppState) -> Router {
    let app = Router::new()
        .route("/detect", post(detect))
        .route("/anomalies", get(list_anomalies))
        .route("/read_log", get(read_log))
        .route("/stats", get(pipeline_stats))
        .route("/stream_data", get(stream_data))
        .route("/stream_anomalies", get(stream_anomalies))
        .route("/health", get(health))
        .route(&config.metrics_path, get(metrics_handler))
        .with_state(state);

    let app = if config.enable_logging {
        app.layer(middleware::from_fn(logging_middleware))
    } else {
        app
    };

    app.layer(cors_middleware(&config.cors_origins))
        .layer(TimeoutLayer::new(config.timeout()))
}
