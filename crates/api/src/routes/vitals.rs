//! Route definitions for the `/vitals` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::vitals;
use crate::state::AppState;

/// Routes mounted at `/vitals`.
///
/// ```text
/// POST   /ingest  -> ingest_reading  (202, buffered)
/// GET    /recent  -> recent_vitals
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ingest", post(vitals::ingest_reading))
        .route("/recent", get(vitals::recent_vitals))
}
