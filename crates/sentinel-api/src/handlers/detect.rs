//! Sample ingestion endpoint.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use sentinel_core::events::Sample;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{error::ApiResult, ApiError, AppState};

/// Body returned for an accepted sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectResponse {
    pub status: String,
}

impl DetectResponse {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// POST /detect
///
/// Malformed bodies (wrong content type, invalid JSON, missing or mistyped
/// fields, non-finite values) are rejected with 400 before any state changes.
#[instrument(skip_all)]
pub async fn detect(
    State(state): State<AppState>,
    payload: Result<Json<Sample>, JsonRejection>,
) -> ApiResult<Json<DetectResponse>> {
    let Json(sample) = payload.map_err(|rejection| {
        debug!(error = %rejection.body_text(), "Rejected malformed sample");
        ApiError::BadRequest(rejection.body_text())
    })?;

    state.pipeline.ingest(sample).await?;

    Ok(Json(DetectResponse::ok()))
}
