//! Row models and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A plain create struct used by the repositories for inserts

pub mod device;
pub mod vitals;

pub use device::Device;
pub use vitals::{NewVitalsRecord, VitalsRecord};
