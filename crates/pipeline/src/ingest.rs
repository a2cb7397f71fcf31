//! Validated ingestion entrypoint.
//!
//! [`IngestService::accept`] is the single door through which raw
//! readings enter the system, whether they arrive over HTTP or through
//! the push-feed consumer. It resolves the device binding first so
//! that data for unknown or unbound devices is never buffered, and it
//! propagates shared-store failures loudly: an accepted reading is a
//! promise that it will eventually be aggregated.

use std::sync::Arc;

use somnia_core::vitals::RawReading;
use somnia_core::CoreError;

use crate::buffer::IngestionBuffer;
use crate::error::PipelineError;
use crate::identity::DeviceDirectory;

/// Fronts the ingestion buffer with device-identity validation.
pub struct IngestService {
    directory: Arc<dyn DeviceDirectory>,
    buffer: IngestionBuffer,
}

impl IngestService {
    pub fn new(directory: Arc<dyn DeviceDirectory>, buffer: IngestionBuffer) -> Self {
        Self { directory, buffer }
    }

    /// Accept one raw reading for buffering.
    ///
    /// Returns as soon as the reading is in the shared buffer; no
    /// aggregation happens on this path.
    pub async fn accept(
        &self,
        serial_number: &str,
        reading: &RawReading,
    ) -> Result<(), PipelineError> {
        let binding = self
            .directory
            .resolve(serial_number)
            .await?
            .ok_or_else(|| CoreError::not_found("Device", serial_number))?;

        if !binding.is_bound() {
            return Err(CoreError::DeviceUnbound(serial_number.to_string()).into());
        }

        self.buffer.append(serial_number, reading).await?;

        tracing::debug!(serial_number, "Buffered raw reading");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
