//! Health endpoint.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,
    pub version: String,
    /// Whether the log directory can be reached
    pub storage: bool,
    pub active_streams: usize,
    pub timestamp: DateTime<Utc>,
}

/// GET /health
///
/// 200 when storage is reachable, 503 otherwise.
#[instrument(skip_all)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let storage = match state.pipeline.log().health_check().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Storage health check failed");
            false
        }
    };

    let (code, status) = if storage {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: state.version.clone(),
            storage,
            active_streams: state.tailer.active_subscribers(),
            timestamp: Utc::now(),
        }),
    )
}
