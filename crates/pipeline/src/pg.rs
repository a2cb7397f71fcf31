//! Postgres-backed implementations of the pipeline trait seams.

use async_trait::async_trait;
use somnia_core::types::DbId;
use somnia_db::models::{Device, NewVitalsRecord, VitalsRecord};
use somnia_db::repositories::{DeviceRepo, VitalsRepo};
use somnia_db::DbPool;

use crate::error::PipelineError;
use crate::flush::VitalsSink;
use crate::identity::{DeviceBinding, DeviceDirectory};

fn binding_from_row(device: Device) -> DeviceBinding {
    DeviceBinding {
        device_id: device.id,
        serial_number: device.serial_number,
        model: device.model,
        patient_id: device.patient_id,
    }
}

/// [`DeviceDirectory`] over the `devices` table.
pub struct PgDeviceDirectory {
    pool: DbPool,
}

impl PgDeviceDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceDirectory for PgDeviceDirectory {
    async fn resolve(&self, serial_number: &str) -> Result<Option<DeviceBinding>, PipelineError> {
        let device = DeviceRepo::find_by_serial(&self.pool, serial_number).await?;
        Ok(device.map(binding_from_row))
    }

    async fn register_bound(
        &self,
        serial_number: &str,
        model: &str,
        patient_id: DbId,
    ) -> Result<DeviceBinding, PipelineError> {
        let device = DeviceRepo::create_bound(&self.pool, serial_number, model, patient_id).await?;
        Ok(binding_from_row(device))
    }

    async fn assign(
        &self,
        device_id: DbId,
        patient_id: DbId,
    ) -> Result<Option<DeviceBinding>, PipelineError> {
        let device = DeviceRepo::assign_patient(&self.pool, device_id, patient_id).await?;
        Ok(device.map(binding_from_row))
    }
}

/// [`VitalsSink`] over the `vitals_records` table.
pub struct PgVitalsSink {
    pool: DbPool,
}

impl PgVitalsSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VitalsSink for PgVitalsSink {
    async fn persist(&self, record: &NewVitalsRecord) -> Result<VitalsRecord, PipelineError> {
        Ok(VitalsRepo::insert(&self.pool, record).await?)
    }
}
