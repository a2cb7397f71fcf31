//! Reading shape, severity labels, and batch averaging.
//!
//! [`RawReading`] is the wire shape a monitoring device reports.
//! [`average_batch`] folds an ordered batch of readings into one
//! [`VitalsSummary`]: arithmetic mean for numeric fields, latest-wins
//! for categorical fields, maximum for the optional embedded severity.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Classification label for a vitals summary.
///
/// Ordered so that `max()` over a batch picks the worst embedded label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    /// Stable string form used in database rows and event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }
}

/// Where a record's severity tag came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeveritySource {
    /// The external classifier scored the averaged feature vector.
    Classifier,
    /// Fallback: the worst severity embedded in the raw readings.
    Device,
    /// Classifier down and no embedded severity in the batch.
    Unavailable,
}

impl SeveritySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeveritySource::Classifier => "classifier",
            SeveritySource::Device => "device",
            SeveritySource::Unavailable => "unavailable",
        }
    }
}

// ---------------------------------------------------------------------------
// RawReading
// ---------------------------------------------------------------------------

/// One raw telemetry sample as reported by a device.
///
/// Numeric fields are averaged at flush time; `sleep_stage` is
/// categorical (latest wins); `severity` is an optional label some
/// device firmwares embed per sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub heart_rate: f64,
    pub oxygen_saturation: f64,
    pub ahi: f64,
    pub nasal_airflow: f64,
    pub chest_movement: f64,
    #[serde(default)]
    pub sleep_stage: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
}

// ---------------------------------------------------------------------------
// VitalsSummary
// ---------------------------------------------------------------------------

/// The averaged result of one device's batch for one flush cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsSummary {
    pub heart_rate: f64,
    pub oxygen_saturation: f64,
    pub ahi: f64,
    pub nasal_airflow: f64,
    pub chest_movement: f64,
    /// Sleep stage from the most recently appended reading, if any.
    pub sleep_stage: Option<String>,
    /// Worst severity embedded in the batch, if any reading carried one.
    pub device_severity: Option<Severity>,
    /// How many readings went into the averages.
    pub sample_count: usize,
}

/// Fold an ordered, non-empty batch into a summary.
///
/// Returns `None` for an empty batch -- an empty batch must never
/// produce a record.
pub fn average_batch(batch: &[RawReading]) -> Option<VitalsSummary> {
    if batch.is_empty() {
        return None;
    }

    let n = batch.len() as f64;
    let mut heart_rate = 0.0;
    let mut oxygen_saturation = 0.0;
    let mut ahi = 0.0;
    let mut nasal_airflow = 0.0;
    let mut chest_movement = 0.0;
    let mut device_severity: Option<Severity> = None;

    for reading in batch {
        heart_rate += reading.heart_rate;
        oxygen_saturation += reading.oxygen_saturation;
        ahi += reading.ahi;
        nasal_airflow += reading.nasal_airflow;
        chest_movement += reading.chest_movement;
        device_severity = match (device_severity, reading.severity) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    // Latest-wins: last reading in append order that carried a stage.
    let sleep_stage = batch
        .iter()
        .rev()
        .find_map(|r| r.sleep_stage.clone());

    Some(VitalsSummary {
        heart_rate: heart_rate / n,
        oxygen_saturation: oxygen_saturation / n,
        ahi: ahi / n,
        nasal_airflow: nasal_airflow / n,
        chest_movement: chest_movement / n,
        sleep_stage,
        device_severity,
        sample_count: batch.len(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
