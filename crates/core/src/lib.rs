//! Shared domain types for the Somnia remote-monitoring backend.
//!
//! This crate holds everything the other crates agree on: ID and
//! timestamp aliases, the domain error taxonomy, and the pure vitals
//! math (reading shape, batch averaging, severity labels). It has no
//! I/O and no async code.

pub mod error;
pub mod events;
pub mod types;
pub mod vitals;

pub use error::CoreError;
