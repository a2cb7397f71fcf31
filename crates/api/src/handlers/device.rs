//! Handlers for device binding.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use somnia_pipeline::identity::DeviceBinding;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::identity::CallerIdentity;
use crate::state::AppState;

/// Body of `POST /devices/bind`.
#[derive(Debug, Deserialize, Validate)]
pub struct BindDeviceRequest {
    #[validate(length(min = 1, message = "serial_number is required"))]
    pub serial_number: String,
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BindDeviceResponse {
    pub device_id: somnia_core::types::DbId,
    pub serial_number: String,
    pub patient_id: somnia_core::types::DbId,
}

/// POST /api/v1/devices/bind
///
/// Bind a device serial to the calling patient. Idempotent when the
/// device is already bound to the same patient; 409 when it belongs
/// to someone else.
pub async fn bind_device(
    caller: CallerIdentity,
    State(state): State<AppState>,
    Json(input): Json<BindDeviceRequest>,
) -> AppResult<Json<BindDeviceResponse>> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let binding: DeviceBinding = somnia_pipeline::identity::bind_device(
        state.directory.as_ref(),
        &input.serial_number,
        caller.patient_id,
        input.model.as_deref(),
    )
    .await?;

    tracing::info!(
        device_id = binding.device_id,
        patient_id = caller.patient_id,
        "Device bound"
    );

    Ok(Json(BindDeviceResponse {
        device_id: binding.device_id,
        serial_number: binding.serial_number,
        // bind_device only returns a bound record
        patient_id: binding.patient_id.unwrap_or(caller.patient_id),
    }))
}
