//! Device entity model.

use serde::Serialize;
use somnia_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `devices` table.
///
/// `is_assigned` and `patient_id` move together: a device is either
/// unbound (`false`, `NULL`) or bound to exactly one patient.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Device {
    pub id: DbId,
    /// Unique hardware serial (printed as a QR code on the device).
    pub serial_number: String,
    pub model: Option<String>,
    pub is_assigned: bool,
    pub patient_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
