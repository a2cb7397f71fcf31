//! Periodic flush-and-aggregate job.
//!
//! Every cycle, each device holding a pending batch is drained into a
//! working copy, averaged, classified, persisted as one immutable
//! record, and published. The discipline is drain-after-success: a
//! working copy that fails to persist is merged back ahead of newer
//! readings, so an accepted reading is never lost.
//!
//! Per-device processing is isolated -- one device's storage error or
//! classifier timeout is logged and retried next cycle without
//! touching its siblings -- and devices are drained concurrently.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use somnia_core::events::EVENT_VITALS_AGGREGATED;
use somnia_core::vitals::{average_batch, RawReading, Severity, SeveritySource};
use somnia_db::models::{NewVitalsRecord, VitalsRecord};
use somnia_events::{EventBus, TelemetryEvent};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::buffer::IngestionBuffer;
use crate::classifier::SeverityClassifier;
use crate::error::PipelineError;
use crate::escalation::EscalationTracker;
use crate::identity::DeviceDirectory;

/// Default flush period: 30 minutes.
const DEFAULT_PERIOD: Duration = Duration::from_secs(30 * 60);

/// Default per-device classifier call timeout.
const DEFAULT_CLASSIFIER_TIMEOUT: Duration = Duration::from_secs(10);

/// Provenance tag on scheduler-produced records.
const SOURCE_DEVICE: &str = "device";

/// Tunables for the flush scheduler.
#[derive(Debug, Clone)]
pub struct FlushConfig {
    /// How often a flush cycle runs.
    pub period: Duration,
    /// Budget for one classifier call; on expiry the cycle falls back
    /// to device-embedded severity instead of stalling.
    pub classifier_timeout: Duration,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            classifier_timeout: DEFAULT_CLASSIFIER_TIMEOUT,
        }
    }
}

/// Durable destination for aggregated records.
#[async_trait]
pub trait VitalsSink: Send + Sync {
    /// Persist one record, returning the stored row.
    async fn persist(&self, record: &NewVitalsRecord) -> Result<VitalsRecord, PipelineError>;
}

/// Periodic job draining per-device buffers into aggregated records.
pub struct FlushScheduler {
    buffer: IngestionBuffer,
    directory: Arc<dyn DeviceDirectory>,
    sink: Arc<dyn VitalsSink>,
    classifier: Arc<dyn SeverityClassifier>,
    tracker: Arc<EscalationTracker>,
    bus: Arc<EventBus>,
    config: FlushConfig,
    /// Serials currently draining; bounds re-entrancy on one key when
    /// cycles overlap.
    in_flight: Mutex<HashSet<String>>,
}

impl FlushScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        buffer: IngestionBuffer,
        directory: Arc<dyn DeviceDirectory>,
        sink: Arc<dyn VitalsSink>,
        classifier: Arc<dyn SeverityClassifier>,
        tracker: Arc<EscalationTracker>,
        bus: Arc<EventBus>,
        config: FlushConfig,
    ) -> Self {
        Self {
            buffer,
            directory,
            sink,
            classifier,
            tracker,
            bus,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Run the flush loop until `cancel` is triggered.
    ///
    /// Cancellation stops scheduling new cycles; a cycle already in
    /// flight finishes before the loop returns.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            period_secs = self.config.period.as_secs(),
            "Flush scheduler started"
        );

        let mut interval = tokio::time::interval(self.config.period);
        // The first tick fires immediately; skip it so a restart does
        // not double-flush.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Flush scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    let flushed = self.flush_cycle().await;
                    if flushed > 0 {
                        tracing::info!(flushed, "Flush cycle persisted records");
                    } else {
                        tracing::debug!("Flush cycle found nothing to persist");
                    }
                }
            }
        }
    }

    /// Run one flush cycle across all devices with pending data.
    ///
    /// Returns the number of records persisted. Never fails as a
    /// whole: per-device errors are logged and retried next cycle.
    pub async fn flush_cycle(&self) -> usize {
        let serials = match self.buffer.pending_serials().await {
            Ok(serials) => serials,
            Err(e) => {
                tracing::error!(error = %e, "Flush cycle could not list pending devices");
                return 0;
            }
        };

        let drains = serials.iter().map(|serial| self.flush_device(serial));
        let results = futures::future::join_all(drains).await;

        results
            .into_iter()
            .zip(&serials)
            .filter(|(result, serial)| match result {
                Ok(persisted) => *persisted,
                Err(e) => {
                    tracing::error!(serial_number = %serial, error = %e, "Device flush failed, will retry next cycle");
                    false
                }
            })
            .count()
    }

    /// Drain and aggregate one device, guarded against re-entrancy.
    async fn flush_device(&self, serial_number: &str) -> Result<bool, PipelineError> {
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(serial_number.to_string()) {
                tracing::debug!(serial_number, "Previous drain still in flight, skipping");
                return Ok(false);
            }
        }

        let result = self.drain_device(serial_number).await;
        self.in_flight.lock().await.remove(serial_number);
        result
    }

    async fn drain_device(&self, serial_number: &str) -> Result<bool, PipelineError> {
        let batch = self.buffer.take_batch(serial_number).await?;
        if batch.is_empty() {
            return Ok(false);
        }

        match self.process_batch(serial_number, &batch).await {
            Ok(persisted) => Ok(persisted),
            Err(e) => {
                // Drain-after-success: the working copy goes back ahead
                // of anything appended mid-drain.
                if let Err(restore_err) = self.buffer.restore_batch(serial_number, &batch).await {
                    tracing::error!(
                        serial_number,
                        error = %restore_err,
                        dropped = batch.len(),
                        "Could not restore working copy after failed flush"
                    );
                }
                Err(e)
            }
        }
    }

    /// Average, classify, persist, and publish one working copy.
    ///
    /// `Ok(false)` means the batch was deliberately discarded (device
    /// no longer bound); any error leaves restoration to the caller.
    async fn process_batch(
        &self,
        serial_number: &str,
        batch: &[RawReading],
    ) -> Result<bool, PipelineError> {
        // Re-resolve: the binding may have changed since the readings
        // were accepted.
        let Some(binding) = self.directory.resolve(serial_number).await? else {
            tracing::warn!(serial_number, "Device vanished, discarding batch");
            return Ok(false);
        };
        let Some(patient_id) = binding.patient_id else {
            tracing::warn!(serial_number, "Device no longer bound, discarding batch");
            return Ok(false);
        };

        let Some(summary) = average_batch(batch) else {
            return Ok(false);
        };

        let (severity, severity_source) = match tokio::time::timeout(
            self.config.classifier_timeout,
            self.classifier.classify(&summary),
        )
        .await
        {
            Ok(Ok(severity)) => (Some(severity), SeveritySource::Classifier),
            Ok(Err(e)) => {
                tracing::warn!(serial_number, error = %e, "Classifier unavailable, using embedded severity");
                embedded_severity(summary.device_severity)
            }
            Err(_) => {
                tracing::warn!(serial_number, "Classifier call timed out, using embedded severity");
                embedded_severity(summary.device_severity)
            }
        };

        let record = NewVitalsRecord {
            patient_id,
            device_id: binding.device_id,
            heart_rate: summary.heart_rate,
            oxygen_saturation: summary.oxygen_saturation,
            ahi: summary.ahi,
            nasal_airflow: summary.nasal_airflow,
            chest_movement: summary.chest_movement,
            sleep_stage: summary.sleep_stage.clone(),
            severity: severity.map(|s| s.as_str().to_string()),
            severity_source: severity_source.as_str().to_string(),
            sample_count: summary.sample_count as i32,
            source: SOURCE_DEVICE.to_string(),
        };

        let stored = self.sink.persist(&record).await?;

        tracing::info!(
            serial_number,
            patient_id,
            record_id = stored.id,
            sample_count = stored.sample_count,
            "Persisted aggregated vitals"
        );

        self.bus.publish(
            TelemetryEvent::new(EVENT_VITALS_AGGREGATED)
                .for_patient(patient_id)
                .from_device(binding.device_id)
                .with_payload(serde_json::json!({ "vitals": stored })),
        );

        // Each live classification also feeds the escalation tracker;
        // tracker failures never abort the flush path.
        if let Some(severity) = severity {
            if let Err(e) = self
                .tracker
                .observe(patient_id, severity, Uuid::new_v4())
                .await
            {
                tracing::error!(patient_id, error = %e, "Escalation tracking failed");
            }
        }

        Ok(true)
    }
}

/// Fallback when the classifier path is unavailable.
fn embedded_severity(device_severity: Option<Severity>) -> (Option<Severity>, SeveritySource) {
    match device_severity {
        Some(severity) => (Some(severity), SeveritySource::Device),
        None => (None, SeveritySource::Unavailable),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::Utc;
    use somnia_core::vitals::VitalsSummary;

    use super::*;
    use crate::escalation::EscalationPolicy;
    use crate::identity::{DeviceBinding, MemoryDirectory};
    use crate::store::MemoryStore;

    // -- Test doubles -------------------------------------------------------

    /// Persists records in memory; optionally fails the next call.
    #[derive(Default)]
    struct MemorySink {
        records: Mutex<Vec<VitalsRecord>>,
        fail_next: AtomicBool,
    }

    impl MemorySink {
        async fn stored(&self) -> Vec<VitalsRecord> {
            self.records.lock().await.clone()
        }
    }

    #[async_trait]
    impl VitalsSink for MemorySink {
        async fn persist(&self, record: &NewVitalsRecord) -> Result<VitalsRecord, PipelineError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(PipelineError::Storage(sqlx::Error::PoolClosed));
            }
            let mut records = self.records.lock().await;
            let stored = VitalsRecord {
                id: records.len() as i64 + 1,
                patient_id: record.patient_id,
                device_id: record.device_id,
                heart_rate: record.heart_rate,
                oxygen_saturation: record.oxygen_saturation,
                ahi: record.ahi,
                nasal_airflow: record.nasal_airflow,
                chest_movement: record.chest_movement,
                sleep_stage: record.sleep_stage.clone(),
                severity: record.severity.clone(),
                severity_source: record.severity_source.clone(),
                sample_count: record.sample_count,
                source: record.source.clone(),
                created_at: Utc::now(),
            };
            records.push(stored.clone());
            Ok(stored)
        }
    }

    /// Returns a fixed label, or an error when unset.
    struct StubClassifier(Option<Severity>);

    #[async_trait]
    impl SeverityClassifier for StubClassifier {
        async fn classify(&self, _: &VitalsSummary) -> Result<Severity, PipelineError> {
            self.0
                .ok_or_else(|| PipelineError::ClassifierUnavailable("stub down".into()))
        }
    }

    /// Hangs far past any per-call budget before answering.
    struct SlowClassifier;

    #[async_trait]
    impl SeverityClassifier for SlowClassifier {
        async fn classify(&self, _: &VitalsSummary) -> Result<Severity, PipelineError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Severity::Normal)
        }
    }

    // -- Harness ------------------------------------------------------------

    struct Harness {
        buffer: IngestionBuffer,
        directory: Arc<MemoryDirectory>,
        sink: Arc<MemorySink>,
        scheduler: FlushScheduler,
    }

    fn harness(classifier: impl SeverityClassifier + 'static) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let buffer = IngestionBuffer::new(store.clone());
        let directory = Arc::new(MemoryDirectory::new());
        let sink = Arc::new(MemorySink::default());
        let bus = Arc::new(EventBus::default());
        let tracker = Arc::new(EscalationTracker::new(
            store,
            EscalationPolicy::default(),
            bus.clone(),
        ));

        let scheduler = FlushScheduler::new(
            buffer.clone(),
            directory.clone(),
            sink.clone(),
            Arc::new(classifier),
            tracker,
            bus,
            FlushConfig {
                period: Duration::from_secs(1800),
                classifier_timeout: Duration::from_secs(1),
            },
        );

        Harness {
            buffer,
            directory,
            sink,
            scheduler,
        }
    }

    fn reading(oxygen: f64) -> RawReading {
        RawReading {
            heart_rate: 70.0,
            oxygen_saturation: oxygen,
            ahi: 2.0,
            nasal_airflow: 1.0,
            chest_movement: 0.4,
            sleep_stage: None,
            severity: None,
        }
    }

    async fn bound_device(h: &Harness, serial: &str, device_id: i64, patient_id: i64) {
        h.directory
            .insert(DeviceBinding {
                device_id,
                serial_number: serial.into(),
                model: None,
                patient_id: Some(patient_id),
            })
            .await;
    }

    // -- Tests --------------------------------------------------------------

    #[tokio::test]
    async fn one_record_per_nonempty_device_per_cycle() {
        let h = harness(StubClassifier(Some(Severity::Normal)));
        bound_device(&h, "SN-1", 1, 10).await;
        bound_device(&h, "SN-2", 2, 20).await;
        bound_device(&h, "SN-3", 3, 30).await;

        h.buffer.append("SN-1", &reading(95.0)).await.unwrap();
        h.buffer.append("SN-1", &reading(93.0)).await.unwrap();
        h.buffer.append("SN-2", &reading(97.0)).await.unwrap();
        // SN-3 has an empty batch and must produce nothing.

        assert_eq!(h.scheduler.flush_cycle().await, 2);

        let stored = h.sink.stored().await;
        assert_eq!(stored.len(), 2);

        // A second cycle with nothing pending produces nothing.
        assert_eq!(h.scheduler.flush_cycle().await, 0);
        assert_eq!(h.sink.stored().await.len(), 2);
    }

    #[tokio::test]
    async fn averages_and_classifier_tag_land_in_the_record() {
        let h = harness(StubClassifier(Some(Severity::Moderate)));
        bound_device(&h, "SN-1", 1, 10).await;

        for oxygen in [95.0, 93.0, 94.0] {
            h.buffer.append("SN-1", &reading(oxygen)).await.unwrap();
        }

        h.scheduler.flush_cycle().await;

        let stored = h.sink.stored().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].oxygen_saturation, 94.0);
        assert_eq!(stored[0].severity.as_deref(), Some("moderate"));
        assert_eq!(stored[0].severity_source, "classifier");
        assert_eq!(stored[0].sample_count, 3);
        assert_eq!(stored[0].source, "device");
    }

    #[tokio::test]
    async fn persistence_failure_keeps_the_batch_for_the_next_cycle() {
        let h = harness(StubClassifier(Some(Severity::Normal)));
        bound_device(&h, "SN-1", 1, 10).await;

        h.buffer.append("SN-1", &reading(95.0)).await.unwrap();
        h.sink.fail_next.store(true, Ordering::SeqCst);

        assert_eq!(h.scheduler.flush_cycle().await, 0);
        assert!(h.sink.stored().await.is_empty());

        // A reading arrives between the failed and the retry cycle.
        h.buffer.append("SN-1", &reading(93.0)).await.unwrap();

        assert_eq!(h.scheduler.flush_cycle().await, 1);
        let stored = h.sink.stored().await;
        assert_eq!(stored.len(), 1);
        // Both the retained and the new reading are aggregated.
        assert_eq!(stored[0].sample_count, 2);
        assert_eq!(stored[0].oxygen_saturation, 94.0);
    }

    #[tokio::test]
    async fn one_device_failing_does_not_block_its_siblings() {
        let h = harness(StubClassifier(Some(Severity::Normal)));
        // SN-1 resolves to nothing mid-flush; SN-2 is healthy.
        bound_device(&h, "SN-2", 2, 20).await;

        h.buffer.append("SN-1", &reading(95.0)).await.unwrap();
        h.buffer.append("SN-2", &reading(96.0)).await.unwrap();

        assert_eq!(h.scheduler.flush_cycle().await, 1);
        assert_eq!(h.sink.stored().await[0].patient_id, 20);
    }

    #[tokio::test]
    async fn unbound_device_batch_is_discarded_not_persisted() {
        let h = harness(StubClassifier(Some(Severity::Normal)));
        h.directory
            .insert(DeviceBinding {
                device_id: 1,
                serial_number: "SN-1".into(),
                model: None,
                patient_id: None,
            })
            .await;

        h.buffer.append("SN-1", &reading(95.0)).await.unwrap();

        assert_eq!(h.scheduler.flush_cycle().await, 0);
        assert!(h.sink.stored().await.is_empty());
        // Discarded for good, not retried.
        assert!(h.buffer.take_batch("SN-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn classifier_outage_falls_back_to_embedded_severity() {
        let h = harness(StubClassifier(None));
        bound_device(&h, "SN-1", 1, 10).await;

        let mut tagged = reading(95.0);
        tagged.severity = Some(Severity::Severe);
        h.buffer.append("SN-1", &reading(94.0)).await.unwrap();
        h.buffer.append("SN-1", &tagged).await.unwrap();

        h.scheduler.flush_cycle().await;

        let stored = h.sink.stored().await;
        assert_eq!(stored[0].severity.as_deref(), Some("severe"));
        assert_eq!(stored[0].severity_source, "device");
    }

    #[tokio::test(start_paused = true)]
    async fn classifier_timeout_falls_back_without_stalling_the_cycle() {
        let h = harness(SlowClassifier);
        bound_device(&h, "SN-1", 1, 10).await;

        let mut tagged = reading(95.0);
        tagged.severity = Some(Severity::Moderate);
        h.buffer.append("SN-1", &tagged).await.unwrap();

        // The per-call budget (1 s in the harness) bounds the cycle even
        // though the classifier itself never answers.
        assert_eq!(h.scheduler.flush_cycle().await, 1);

        let stored = h.sink.stored().await;
        assert_eq!(stored[0].severity.as_deref(), Some("moderate"));
        assert_eq!(stored[0].severity_source, "device");
    }

    #[tokio::test]
    async fn classifier_outage_without_embedded_severity_still_persists() {
        let h = harness(StubClassifier(None));
        bound_device(&h, "SN-1", 1, 10).await;

        h.buffer.append("SN-1", &reading(95.0)).await.unwrap();

        assert_eq!(h.scheduler.flush_cycle().await, 1);

        let stored = h.sink.stored().await;
        assert_eq!(stored[0].severity, None);
        assert_eq!(stored[0].severity_source, "unavailable");
    }

    #[tokio::test]
    async fn aggregated_event_is_published_for_the_patient() {
        let store = Arc::new(MemoryStore::new());
        let buffer = IngestionBuffer::new(store.clone());
        let directory = Arc::new(MemoryDirectory::new());
        let sink = Arc::new(MemorySink::default());
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let tracker = Arc::new(EscalationTracker::new(
            store,
            EscalationPolicy::default(),
            bus.clone(),
        ));
        let scheduler = FlushScheduler::new(
            buffer.clone(),
            directory.clone(),
            sink,
            Arc::new(StubClassifier(Some(Severity::Mild))),
            tracker,
            bus,
            FlushConfig::default(),
        );

        directory
            .insert(DeviceBinding {
                device_id: 7,
                serial_number: "SN-1".into(),
                model: None,
                patient_id: Some(42),
            })
            .await;
        buffer.append("SN-1", &reading(95.0)).await.unwrap();

        scheduler.flush_cycle().await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, EVENT_VITALS_AGGREGATED);
        assert_eq!(event.patient_id, Some(42));
        assert_eq!(event.device_id, Some(7));
        assert_eq!(event.payload["vitals"]["oxygen_saturation"], 95.0);
    }

    #[tokio::test]
    async fn run_loop_stops_on_cancellation() {
        let h = harness(StubClassifier(Some(Severity::Normal)));
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        let run = tokio::spawn(async move { h.scheduler.run(cancel_clone).await });
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("run loop should stop promptly")
            .unwrap();
    }
}
