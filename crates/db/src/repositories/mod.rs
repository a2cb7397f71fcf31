//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods
//! that accept `&PgPool` as the first argument.

pub mod device_repo;
pub mod vitals_repo;

pub use device_repo::DeviceRepo;
pub use vitals_repo::VitalsRepo;
