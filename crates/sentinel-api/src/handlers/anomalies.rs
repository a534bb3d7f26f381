//! Anomaly query endpoints.

use axum::{extract::State, Json};
use sentinel_core::events::Anomaly;
use sentinel_ingestion::PipelineStats;
use tracing::{debug, instrument};

use crate::{error::ApiResult, AppState};

/// GET /anomalies
///
/// Anomalies flagged since this process started, oldest first.
#[instrument(skip_all)]
pub async fn list_anomalies(State(state): State<AppState>) -> Json<Vec<Anomaly>> {
    Json(state.pipeline.list_anomalies().await)
}

/// GET /read_log
///
/// Full replay of the persisted anomaly log. Survives restarts, unlike
/// `/anomalies`.
#[instrument(skip_all)]
pub async fn read_log(State(state): State<AppState>) -> ApiResult<Json<Vec<Anomaly>>> {
    let anomalies = state.pipeline.read_anomaly_log().await?;
    debug!(count = anomalies.len(), "Anomaly log replayed");
    Ok(Json(anomalies))
}

/// GET /stats
#[instrument(skip_all)]
pub async fn pipeline_stats(State(state): State<AppState>) -> Json<PipelineStats> {
    Json(state.pipeline.stats().await)
}
