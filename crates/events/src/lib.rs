//! Somnia event bus.
//!
//! The real-time fan-out path between the telemetry pipeline and
//! connected clients:
//!
//! - [`EventBus`] -- in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`TelemetryEvent`] -- the canonical event envelope carrying the
//!   patient scope and a JSON payload.
//!
//! Delivery is best-effort/at-most-once: events published while a
//! subscriber is disconnected are gone; clients recover state through
//! the persisted-record query endpoint, not through replay.

pub mod bus;

pub use bus::{EventBus, TelemetryEvent};
