//! Canonical event type names published on the event bus.
//!
//! Names are dot-separated `<entity>.<verb>` strings so subscribers can
//! match on prefixes.

/// A flush cycle produced a new aggregated vitals record.
pub const EVENT_VITALS_AGGREGATED: &str = "vitals.aggregated";

/// The escalation tracker crossed its consecutive-severe threshold.
pub const EVENT_ESCALATION_ALERT: &str = "alert.escalation";
