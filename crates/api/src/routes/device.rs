//! Route definitions for the `/devices` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::device;
use crate::state::AppState;

/// Routes mounted at `/devices`.
///
/// ```text
/// POST   /bind  -> bind_device
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/bind", post(device::bind_device))
}
