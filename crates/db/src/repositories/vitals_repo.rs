//! Repository for the `vitals_records` table (append-only).

use somnia_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::{NewVitalsRecord, VitalsRecord};

/// Column list for `vitals_records` SELECT queries (includes `id` and `created_at`).
const COLUMNS: &str = "\
    id, patient_id, device_id, \
    heart_rate, oxygen_saturation, ahi, nasal_airflow, chest_movement, \
    sleep_stage, severity, severity_source, sample_count, source, created_at";

/// Column list for INSERT statements (excludes auto-generated `id` and `created_at`).
const INSERT_COLUMNS: &str = "\
    patient_id, device_id, heart_rate, oxygen_saturation, ahi, \
    nasal_airflow, chest_movement, sleep_stage, severity, severity_source, \
    sample_count, source";

/// Provides query operations for aggregated vitals records.
pub struct VitalsRepo;

impl VitalsRepo {
    /// Insert one aggregated record, returning the stored row.
    pub async fn insert(
        pool: &PgPool,
        record: &NewVitalsRecord,
    ) -> Result<VitalsRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO vitals_records ({INSERT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VitalsRecord>(&query)
            .bind(record.patient_id)
            .bind(record.device_id)
            .bind(record.heart_rate)
            .bind(record.oxygen_saturation)
            .bind(record.ahi)
            .bind(record.nasal_airflow)
            .bind(record.chest_movement)
            .bind(record.sleep_stage.as_deref())
            .bind(record.severity.as_deref())
            .bind(&record.severity_source)
            .bind(record.sample_count)
            .bind(&record.source)
            .fetch_one(pool)
            .await
    }

    /// Records for a patient created after `since`, newest first.
    pub async fn list_recent_for_patient(
        pool: &PgPool,
        patient_id: DbId,
        since: Timestamp,
    ) -> Result<Vec<VitalsRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM vitals_records \
             WHERE patient_id = $1 AND created_at >= $2 \
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, VitalsRecord>(&query)
            .bind(patient_id)
            .bind(since)
            .fetch_all(pool)
            .await
    }
}
