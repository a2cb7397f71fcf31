//! Event-to-WebSocket fan-out.
//!
//! [`EventFanout`] subscribes to the telemetry event bus and pushes each
//! aggregation result and escalation alert to the WebSocket connections
//! subscribed to the affected patient.

use std::sync::Arc;

use axum::extract::ws::Message;
use somnia_core::events::{EVENT_ESCALATION_ALERT, EVENT_VITALS_AGGREGATED};
use somnia_events::TelemetryEvent;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::ws::WsManager;

/// Routes telemetry events to patient-subscribed WebSocket clients.
///
/// Consumes events from the broadcast channel and, for each event,
/// renders the client-facing frame and delivers it to every connection
/// following the event's patient.
pub struct EventFanout {
    ws_manager: Arc<WsManager>,
}

impl EventFanout {
    /// Create a new fan-out with the given WebSocket manager.
    pub fn new(ws_manager: Arc<WsManager>) -> Self {
        Self { ws_manager }
    }

    /// Run the main fan-out loop.
    ///
    /// Subscribes to the event bus via `receiver` and processes each event.
    /// The loop exits when `cancel` fires or when the channel is closed
    /// (i.e. the last [`EventBus`](somnia_events::EventBus) handle is
    /// dropped), whichever happens first.
    pub async fn run(
        self,
        mut receiver: broadcast::Receiver<TelemetryEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Event fan-out stopping");
                    break;
                }
                result = receiver.recv() => match result {
                    Ok(event) => self.route_event(&event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Event fan-out lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, fan-out shutting down");
                        break;
                    }
                },
            }
        }
    }

    /// Render and deliver a single event.
    ///
    /// Events without a patient id have no audience and are dropped;
    /// unknown event types are ignored.
    async fn route_event(&self, event: &TelemetryEvent) {
        let Some(patient_id) = event.patient_id else {
            return;
        };

        let frame = match event.event_type.as_str() {
            EVENT_VITALS_AGGREGATED => serde_json::json!({
                "type": "newVitals",
                "patientId": patient_id,
                "vitals": event.payload.get("vitals"),
            }),
            EVENT_ESCALATION_ALERT => serde_json::json!({
                "type": "alert",
                "patientId": patient_id,
                "alert": event.payload,
            }),
            other => {
                tracing::debug!(event_type = %other, "Unrouted event type");
                return;
            }
        };

        let text = frame.to_string();
        let delivered = self
            .ws_manager
            .send_to_patient(patient_id, Message::Text(text.into()))
            .await;

        tracing::debug!(
            event_type = %event.event_type,
            patient_id,
            delivered,
            "Fanned out event"
        );
    }
}
