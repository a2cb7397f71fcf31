//! Aggregated vitals entity model.

use serde::Serialize;
use somnia_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `vitals_records` table.
///
/// Rows are append-only and immutable; one is created per device per
/// flush cycle by the aggregation scheduler.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VitalsRecord {
    pub id: DbId,
    pub patient_id: DbId,
    pub device_id: DbId,
    pub heart_rate: f64,
    pub oxygen_saturation: f64,
    pub ahi: f64,
    pub nasal_airflow: f64,
    pub chest_movement: f64,
    pub sleep_stage: Option<String>,
    /// Severity label (`normal` .. `severe`), absent when classification
    /// was unavailable for the cycle.
    pub severity: Option<String>,
    /// `classifier`, `device` or `unavailable`.
    pub severity_source: String,
    pub sample_count: i32,
    /// Provenance tag; always `device` for scheduler-produced rows.
    pub source: String,
    pub created_at: Timestamp,
}

/// Insert payload for a new aggregated record.
#[derive(Debug, Clone)]
pub struct NewVitalsRecord {
    pub patient_id: DbId,
    pub device_id: DbId,
    pub heart_rate: f64,
    pub oxygen_saturation: f64,
    pub ahi: f64,
    pub nasal_airflow: f64,
    pub chest_movement: f64,
    pub sleep_stage: Option<String>,
    pub severity: Option<String>,
    pub severity_source: String,
    pub sample_count: i32,
    pub source: String,
}
