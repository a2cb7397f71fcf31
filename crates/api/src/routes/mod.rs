pub mod ai;
pub mod device;
pub mod health;
pub mod vitals;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                              telemetry WebSocket
///
/// /vitals/ingest                   buffer one raw reading (POST)
/// /vitals/recent                   recent aggregated records (GET)
///
/// /devices/bind                    bind device serial to caller (POST)
///
/// /ai/predict                      synchronous classification (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // WebSocket endpoint.
        .route("/ws", get(ws::ws_handler))
        // Buffered ingestion and aggregated history.
        .nest("/vitals", vitals::router())
        // Device identity binding.
        .nest("/devices", device::router())
        // Live classification, bypassing the buffer.
        .nest("/ai", ai::router())
}
