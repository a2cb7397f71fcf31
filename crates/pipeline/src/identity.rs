//! Device identity resolution and the bind state machine.
//!
//! A device starts unbound, transitions to bound exactly once per
//! patient, and must be explicitly unbound before it can be given to a
//! different patient. [`bind_device`] implements that state machine on
//! top of the [`DeviceDirectory`] primitives so it can be exercised
//! against any backend.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use somnia_core::types::DbId;
use somnia_core::CoreError;
use tokio::sync::Mutex;

use crate::error::PipelineError;

/// The association between a physical device and the patient it
/// reports for.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceBinding {
    pub device_id: DbId,
    pub serial_number: String,
    pub model: Option<String>,
    /// `None` while the device is unbound.
    pub patient_id: Option<DbId>,
}

impl DeviceBinding {
    /// Whether the device is currently assigned to a patient.
    pub fn is_bound(&self) -> bool {
        self.patient_id.is_some()
    }
}

/// Storage primitives for device bindings.
///
/// Implementations must make [`assign`](Self::assign) atomic: it only
/// succeeds while the device is still unbound, returning `None` when a
/// concurrent caller won the race.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Look up a binding by hardware serial.
    async fn resolve(&self, serial_number: &str) -> Result<Option<DeviceBinding>, PipelineError>;

    /// Register a previously unknown device, bound to `patient_id`.
    async fn register_bound(
        &self,
        serial_number: &str,
        model: &str,
        patient_id: DbId,
    ) -> Result<DeviceBinding, PipelineError>;

    /// Assign an existing, unbound device to `patient_id`.
    ///
    /// Returns `None` if the device was no longer unbound.
    async fn assign(
        &self,
        device_id: DbId,
        patient_id: DbId,
    ) -> Result<Option<DeviceBinding>, PipelineError>;
}

/// Bind a device to a patient.
///
/// - Unknown serial with a `model`: the device is registered and bound.
/// - Unknown serial without a `model`: validation error.
/// - Known, unbound: assigned to `patient_id`.
/// - Known, bound to `patient_id` already: idempotent no-op.
/// - Known, bound to a different patient: conflict, binding unchanged.
pub async fn bind_device(
    directory: &dyn DeviceDirectory,
    serial_number: &str,
    patient_id: DbId,
    model: Option<&str>,
) -> Result<DeviceBinding, PipelineError> {
    let serial_number = serial_number.trim();
    if serial_number.is_empty() {
        return Err(CoreError::Validation("serial_number is required".into()).into());
    }

    let existing = directory.resolve(serial_number).await?;

    let binding = match existing {
        None => {
            let Some(model) = model else {
                return Err(CoreError::Validation(
                    "Device not found; include the device model to register it".into(),
                )
                .into());
            };
            directory
                .register_bound(serial_number, model, patient_id)
                .await?
        }
        Some(binding) if binding.patient_id == Some(patient_id) => binding,
        Some(binding) if binding.is_bound() => {
            return Err(CoreError::Conflict(format!(
                "Device '{serial_number}' is already bound to another patient"
            ))
            .into());
        }
        Some(binding) => directory
            .assign(binding.device_id, patient_id)
            .await?
            .ok_or_else(|| {
                // Lost the race to a concurrent bind.
                CoreError::Conflict(format!(
                    "Device '{serial_number}' is already bound to another patient"
                ))
            })?,
    };

    tracing::info!(
        serial_number,
        patient_id,
        device_id = binding.device_id,
        "Device bound to patient"
    );

    Ok(binding)
}

// ---------------------------------------------------------------------------
// MemoryDirectory
// ---------------------------------------------------------------------------

/// In-process [`DeviceDirectory`] keyed by serial number.
///
/// Used by tests and single-node demos; production uses
/// [`PgDeviceDirectory`](crate::pg::PgDeviceDirectory).
#[derive(Default)]
pub struct MemoryDirectory {
    devices: Mutex<HashMap<String, DeviceBinding>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a device row directly, bypassing the bind state machine.
    pub async fn insert(&self, binding: DeviceBinding) {
        self.devices
            .lock()
            .await
            .insert(binding.serial_number.clone(), binding);
    }
}

#[async_trait]
impl DeviceDirectory for MemoryDirectory {
    async fn resolve(&self, serial_number: &str) -> Result<Option<DeviceBinding>, PipelineError> {
        Ok(self.devices.lock().await.get(serial_number).cloned())
    }

    async fn register_bound(
        &self,
        serial_number: &str,
        model: &str,
        patient_id: DbId,
    ) -> Result<DeviceBinding, PipelineError> {
        let mut devices = self.devices.lock().await;
        let binding = DeviceBinding {
            device_id: devices.len() as DbId + 1,
            serial_number: serial_number.to_string(),
            model: Some(model.to_string()),
            patient_id: Some(patient_id),
        };
        devices.insert(serial_number.to_string(), binding.clone());
        Ok(binding)
    }

    async fn assign(
        &self,
        device_id: DbId,
        patient_id: DbId,
    ) -> Result<Option<DeviceBinding>, PipelineError> {
        let mut devices = self.devices.lock().await;
        let target = devices
            .values_mut()
            .find(|b| b.device_id == device_id && !b.is_bound());
        Ok(target.map(|binding| {
            binding.patient_id = Some(patient_id);
            binding.clone()
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn binding_unknown_device_with_model_registers_it() {
        let dir = MemoryDirectory::new();

        let binding = bind_device(&dir, "SN-1", 10, Some("SomniaRing v2"))
            .await
            .unwrap();

        assert_eq!(binding.patient_id, Some(10));
        assert_eq!(binding.model.as_deref(), Some("SomniaRing v2"));
    }

    #[tokio::test]
    async fn binding_unknown_device_without_model_is_rejected() {
        let dir = MemoryDirectory::new();

        let err = bind_device(&dir, "SN-1", 10, None).await.unwrap_err();
        assert_matches!(err, PipelineError::Core(CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn empty_serial_is_rejected() {
        let dir = MemoryDirectory::new();

        let err = bind_device(&dir, "   ", 10, None).await.unwrap_err();
        assert_matches!(err, PipelineError::Core(CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn binding_unbound_device_assigns_it() {
        let dir = MemoryDirectory::new();
        dir.insert(DeviceBinding {
            device_id: 1,
            serial_number: "SN-1".into(),
            model: None,
            patient_id: None,
        })
        .await;

        let binding = bind_device(&dir, "SN-1", 10, None).await.unwrap();
        assert_eq!(binding.patient_id, Some(10));
    }

    #[tokio::test]
    async fn repeating_same_bind_is_idempotent() {
        let dir = MemoryDirectory::new();

        let first = bind_device(&dir, "SN-1", 10, Some("m")).await.unwrap();
        let second = bind_device(&dir, "SN-1", 10, None).await.unwrap();

        assert_eq!(first.device_id, second.device_id);
        assert_eq!(second.patient_id, Some(10));
    }

    #[tokio::test]
    async fn binding_to_a_different_patient_conflicts_and_keeps_original() {
        let dir = MemoryDirectory::new();
        bind_device(&dir, "SN-1", 10, Some("m")).await.unwrap();

        let err = bind_device(&dir, "SN-1", 99, None).await.unwrap_err();
        assert_matches!(err, PipelineError::Core(CoreError::Conflict(_)));

        let binding = dir.resolve("SN-1").await.unwrap().unwrap();
        assert_eq!(binding.patient_id, Some(10));
    }
}
