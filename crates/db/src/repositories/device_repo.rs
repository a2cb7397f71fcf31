//! Repository for the `devices` table.
//!
//! These are the atomic primitives behind the device identity
//! resolver; the bind state machine itself lives in
//! `somnia_pipeline::identity`.

use somnia_core::types::DbId;
use sqlx::PgPool;

use crate::models::Device;

/// Column list for `devices` SELECT queries.
const COLUMNS: &str = "\
    id, serial_number, model, is_assigned, patient_id, created_at, updated_at";

/// Provides query operations for devices.
pub struct DeviceRepo;

impl DeviceRepo {
    /// Look up a device by its hardware serial.
    pub async fn find_by_serial(
        pool: &PgPool,
        serial_number: &str,
    ) -> Result<Option<Device>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM devices WHERE serial_number = $1");
        sqlx::query_as::<_, Device>(&query)
            .bind(serial_number)
            .fetch_optional(pool)
            .await
    }

    /// Register a new device, bound to a patient from the start.
    pub async fn create_bound(
        pool: &PgPool,
        serial_number: &str,
        model: &str,
        patient_id: DbId,
    ) -> Result<Device, sqlx::Error> {
        let query = format!(
            "INSERT INTO devices (serial_number, model, is_assigned, patient_id) \
             VALUES ($1, $2, TRUE, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Device>(&query)
            .bind(serial_number)
            .bind(model)
            .bind(patient_id)
            .fetch_one(pool)
            .await
    }

    /// Assign an unbound device to a patient.
    ///
    /// The `patient_id IS NULL` guard makes the transition atomic:
    /// `None` means the device was bound by a concurrent caller and the
    /// caller should re-read and report a conflict.
    pub async fn assign_patient(
        pool: &PgPool,
        device_id: DbId,
        patient_id: DbId,
    ) -> Result<Option<Device>, sqlx::Error> {
        let query = format!(
            "UPDATE devices \
             SET patient_id = $2, is_assigned = TRUE, updated_at = now() \
             WHERE id = $1 AND patient_id IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Device>(&query)
            .bind(device_id)
            .bind(patient_id)
            .fetch_optional(pool)
            .await
    }
}
