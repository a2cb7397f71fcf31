//! Per-device ingestion buffer over the shared store.
//!
//! Raw readings accumulate in the list `vitals:{serial}` between flush
//! cycles. Within one device's list, append order equals arrival
//! order; two devices never share a key. The buffer is ephemeral
//! working state, never long-term truth.

use std::sync::Arc;

use somnia_core::vitals::RawReading;

use crate::error::PipelineError;
use crate::store::SharedStore;

/// Key prefix for pending-batch lists.
const KEY_PREFIX: &str = "vitals:";

/// Per-device accumulation of raw readings between flush cycles.
#[derive(Clone)]
pub struct IngestionBuffer {
    store: Arc<dyn SharedStore>,
}

impl IngestionBuffer {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    fn key(serial_number: &str) -> String {
        format!("{KEY_PREFIX}{serial_number}")
    }

    /// Append one reading to the device's pending batch.
    pub async fn append(
        &self,
        serial_number: &str,
        reading: &RawReading,
    ) -> Result<(), PipelineError> {
        let payload = serde_json::to_string(reading)?;
        self.store
            .push_back(&Self::key(serial_number), payload)
            .await?;
        Ok(())
    }

    /// Atomically drain the device's batch into a working copy.
    ///
    /// Readings appended concurrently land in the freshly cleared key
    /// and are picked up next cycle. Entries that fail to deserialize
    /// are dropped with a warning rather than poisoning the batch.
    pub async fn take_batch(&self, serial_number: &str) -> Result<Vec<RawReading>, PipelineError> {
        let raw = self.store.take_all(&Self::key(serial_number)).await?;

        let mut batch = Vec::with_capacity(raw.len());
        for payload in raw {
            match serde_json::from_str(&payload) {
                Ok(reading) => batch.push(reading),
                Err(e) => {
                    tracing::warn!(serial_number, error = %e, "Dropping malformed buffered reading");
                }
            }
        }
        Ok(batch)
    }

    /// Merge a working copy back ahead of anything appended since.
    ///
    /// Called when persistence fails so the batch is retried next cycle
    /// in its original order.
    pub async fn restore_batch(
        &self,
        serial_number: &str,
        batch: &[RawReading],
    ) -> Result<(), PipelineError> {
        let payloads = batch
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        self.store
            .push_front(&Self::key(serial_number), payloads)
            .await?;
        Ok(())
    }

    /// Serials that currently hold a non-empty pending batch.
    pub async fn pending_serials(&self) -> Result<Vec<String>, PipelineError> {
        let keys = self.store.list_keys(KEY_PREFIX).await?;
        Ok(keys
            .into_iter()
            .map(|key| key[KEY_PREFIX.len()..].to_string())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
