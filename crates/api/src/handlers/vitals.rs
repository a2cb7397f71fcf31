//! Handlers for the `/vitals` resource.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use somnia_core::types::DbId;
use somnia_core::vitals::RawReading;
use somnia_db::repositories::VitalsRepo;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::identity::CallerIdentity;
use crate::state::AppState;

/// Body of `POST /vitals/ingest`.
#[derive(Debug, Deserialize, Validate)]
pub struct IngestReadingRequest {
    #[validate(length(min = 1, message = "serial_number is required"))]
    pub serial_number: String,
    #[serde(flatten)]
    pub reading: RawReading,
}

/// POST /api/v1/vitals/ingest
///
/// Accept one raw reading for asynchronous aggregation. Returns 202
/// as soon as the reading is buffered; no aggregation happens on this
/// path. Rate-limited per caller.
pub async fn ingest_reading(
    caller: CallerIdentity,
    State(state): State<AppState>,
    Json(input): Json<IngestReadingRequest>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    state
        .limiter
        .check(&format!("patient:{}", caller.patient_id))
        .await?;

    state
        .ingest
        .accept(&input.serial_number, &input.reading)
        .await?;

    Ok(StatusCode::ACCEPTED)
}

/// Query parameters for `GET /vitals/recent`.
#[derive(Debug, Deserialize)]
pub struct RecentVitalsQuery {
    /// Explicit patient id; defaults to the caller.
    pub patient_id: Option<DbId>,
}

/// GET /api/v1/vitals/recent
///
/// Aggregated records created within the trailing query window,
/// newest first. This is also the recovery path for clients that
/// missed real-time pushes while disconnected.
pub async fn recent_vitals(
    caller: CallerIdentity,
    State(state): State<AppState>,
    Query(params): Query<RecentVitalsQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let patient_id = params.patient_id.unwrap_or(caller.patient_id);
    let since = chrono::Utc::now() - state.config.telemetry.vitals_query_window;

    let records = VitalsRepo::list_recent_for_patient(&state.pool, patient_id, since).await?;

    Ok(Json(serde_json::json!({ "data": records })))
}
