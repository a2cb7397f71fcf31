//! Caller identity extractor.
//!
//! Authentication and session management are an external
//! collaborator's concern; by the time a request reaches this service
//! the auth layer has validated the caller and forwarded their patient
//! id in the `X-Patient-Id` header. This extractor only reads that
//! header -- it performs no credential checks of its own.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use somnia_core::types::DbId;

use crate::error::AppError;

/// Header carrying the authenticated caller's patient id.
const PATIENT_ID_HEADER: &str = "x-patient-id";

/// The authenticated caller, as asserted by the upstream auth layer.
///
/// Use this as an extractor parameter in any handler that needs to
/// know who is calling:
///
/// ```ignore
/// async fn my_handler(caller: CallerIdentity) -> AppResult<Json<()>> {
///     tracing::info!(patient_id = caller.patient_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CallerIdentity {
    pub patient_id: DbId,
}

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let patient_id = parts
            .headers
            .get(PATIENT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<DbId>().ok())
            .ok_or_else(|| {
                AppError::Unauthorized("Missing or invalid X-Patient-Id header".into())
            })?;

        Ok(CallerIdentity { patient_id })
    }
}
