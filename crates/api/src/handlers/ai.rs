//! Synchronous severity classification.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use somnia_core::vitals::{Severity, VitalsSummary};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::identity::CallerIdentity;
use crate::state::AppState;

/// Body of `POST /ai/predict` -- a single already-aggregated sample.
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub heart_rate: f64,
    pub oxygen_saturation: f64,
    pub ahi: f64,
    pub nasal_airflow: f64,
    pub chest_movement: f64,
    pub sleep_stage: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub severity: Severity,
    pub classification_id: Uuid,
    /// True when this classification pushed the caller over the
    /// escalation threshold.
    pub alert: bool,
}

/// POST /api/v1/ai/predict
///
/// Classify one sample immediately, bypassing the ingestion buffer.
/// The result still feeds the escalation tracker, so repeated severe
/// predictions raise an alert exactly like the flush path does.
pub async fn predict(
    caller: CallerIdentity,
    State(state): State<AppState>,
    Json(input): Json<PredictRequest>,
) -> AppResult<Json<PredictResponse>> {
    let summary = VitalsSummary {
        heart_rate: input.heart_rate,
        oxygen_saturation: input.oxygen_saturation,
        ahi: input.ahi,
        nasal_airflow: input.nasal_airflow,
        chest_movement: input.chest_movement,
        sleep_stage: input.sleep_stage,
        device_severity: None,
        sample_count: 1,
    };

    let severity = state.classifier.classify(&summary).await?;
    let classification_id = Uuid::new_v4();

    let alert = state
        .tracker
        .observe(caller.patient_id, severity, classification_id)
        .await?
        .is_some();

    Ok(Json(PredictResponse {
        severity,
        classification_id,
        alert,
    }))
}
