//! Severity escalation tracker.
//!
//! A "N consecutive severe classifications within W minutes" detector.
//! The per-patient counter lives in the shared store so every process
//! instance sees the same streak; non-severe classifications and window
//! expiry break it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use somnia_core::events::EVENT_ESCALATION_ALERT;
use somnia_core::types::{DbId, Timestamp};
use somnia_core::vitals::Severity;
use somnia_events::{EventBus, TelemetryEvent};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::store::SharedStore;

/// Default consecutive-severe threshold.
const DEFAULT_THRESHOLD: i64 = 5;

/// Default rolling window.
const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Tunables for the escalation detector.
#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    /// Consecutive severe classifications that trigger an alert.
    pub threshold: i64,
    /// Rolling window; a streak that outlives it is forgotten.
    pub window: Duration,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Fired when a patient's severe streak reaches the threshold.
///
/// Emitted through the event bus, never stored; alert persistence is
/// an external collaborator's concern.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub patient_id: DbId,
    pub severity: Severity,
    pub timestamp: Timestamp,
    /// The classification that tipped the counter over the threshold.
    pub classification_id: Uuid,
}

/// Per-patient rolling counter over live classification results.
pub struct EscalationTracker {
    store: Arc<dyn SharedStore>,
    policy: EscalationPolicy,
    bus: Arc<EventBus>,
}

impl EscalationTracker {
    pub fn new(store: Arc<dyn SharedStore>, policy: EscalationPolicy, bus: Arc<EventBus>) -> Self {
        Self { store, policy, bus }
    }

    fn key(patient_id: DbId) -> String {
        format!("escalation:{patient_id}")
    }

    /// Feed one live classification result into the tracker.
    ///
    /// Returns the alert if this observation crossed the threshold.
    /// The counter resets to zero both on a non-severe classification
    /// and after an alert fires, so re-triggering needs a full new
    /// streak.
    pub async fn observe(
        &self,
        patient_id: DbId,
        severity: Severity,
        classification_id: Uuid,
    ) -> Result<Option<AlertEvent>, PipelineError> {
        let key = Self::key(patient_id);

        if severity != Severity::Severe {
            self.store.delete(&key).await?;
            return Ok(None);
        }

        let count = self
            .store
            .incr_with_expiry(&key, self.policy.window)
            .await?;

        if count < self.policy.threshold {
            tracing::debug!(patient_id, count, "Severe streak continuing");
            return Ok(None);
        }

        self.store.delete(&key).await?;

        let alert = AlertEvent {
            patient_id,
            severity,
            timestamp: Utc::now(),
            classification_id,
        };

        tracing::warn!(
            patient_id,
            count,
            %classification_id,
            "Escalation threshold crossed, emitting alert"
        );

        self.bus.publish(
            TelemetryEvent::new(EVENT_ESCALATION_ALERT)
                .for_patient(patient_id)
                .with_payload(serde_json::json!({
                    "patient_id": alert.patient_id,
                    "severity": alert.severity,
                    "timestamp": alert.timestamp,
                    "classification_id": alert.classification_id,
                })),
        );

        Ok(Some(alert))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
