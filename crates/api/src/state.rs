use std::sync::Arc;

use somnia_events::EventBus;
use somnia_pipeline::{
    DeviceDirectory, EscalationTracker, InboundReading, IngestService, RateLimiter,
    SeverityClassifier,
};
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: somnia_db::DbPool,
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// WebSocket connection manager (patient/doctor clients).
    pub ws_manager: Arc<WsManager>,
    /// Centralized event bus for real-time fan-out.
    pub event_bus: Arc<EventBus>,
    /// Device identity directory (bind/resolve).
    pub directory: Arc<dyn DeviceDirectory>,
    /// Validated ingestion entrypoint.
    pub ingest: Arc<IngestService>,
    /// Fixed-window ingestion rate limiter.
    pub limiter: Arc<RateLimiter>,
    /// Severity escalation tracker (live classification path).
    pub tracker: Arc<EscalationTracker>,
    /// External severity classifier client.
    pub classifier: Arc<dyn SeverityClassifier>,
    /// Sender half of the push-feed channel; WebSocket readings go here.
    pub feed_tx: mpsc::Sender<InboundReading>,
}
