//! Route definitions for the `/ai` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::ai;
use crate::state::AppState;

/// Routes mounted at `/ai`.
///
/// ```text
/// POST   /predict  -> predict
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/predict", post(ai::predict))
}
