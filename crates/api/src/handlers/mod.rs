//! HTTP handlers, grouped by resource.

pub mod ai;
pub mod device;
pub mod vitals;
