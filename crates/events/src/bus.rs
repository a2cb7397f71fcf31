//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publisher capability handed to the flush
//! scheduler and the escalation tracker. It is designed to be shared
//! via `Arc<EventBus>` across the application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use somnia_core::types::DbId;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// TelemetryEvent
// ---------------------------------------------------------------------------

/// A domain event produced by the telemetry pipeline.
///
/// Constructed via [`TelemetryEvent::new`] and enriched with the
/// builder methods [`for_patient`](TelemetryEvent::for_patient),
/// [`from_device`](TelemetryEvent::from_device), and
/// [`with_payload`](TelemetryEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Dot-separated event name, e.g. `"vitals.aggregated"`.
    pub event_type: String,

    /// Patient the event concerns; fan-out routes on this.
    pub patient_id: Option<DbId>,

    /// Device that produced the underlying data, if any.
    pub device_id: Option<DbId>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl TelemetryEvent {
    /// Create a new event with only the required `event_type`.
    ///
    /// All optional fields default to `None` / empty object.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            patient_id: None,
            device_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Scope the event to a patient stream.
    pub fn for_patient(mut self, patient_id: DbId) -> Self {
        self.patient_id = Some(patient_id);
        self
    }

    /// Attach the originating device.
    pub fn from_device(mut self, device_id: DbId) -> Self {
        self.device_id = Some(device_id);
        self
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`TelemetryEvent`].
///
/// # Usage
///
/// ```rust
/// use somnia_events::{EventBus, TelemetryEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(TelemetryEvent::new("vitals.aggregated"));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<TelemetryEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// delivery is fire-and-forget by design.
    pub fn publish(&self, event: TelemetryEvent) {
        // Ignore the SendError -- it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
