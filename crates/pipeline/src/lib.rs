//! Somnia telemetry pipeline.
//!
//! Everything between a raw device reading and a pushed result lives
//! here:
//!
//! - [`store`] -- shared key-value store abstraction (atomic list and
//!   counter operations) with an in-memory implementation.
//! - [`identity`] -- device-to-patient binding resolution.
//! - [`buffer`] -- per-device ingestion buffer over the shared store.
//! - [`ingest`] -- the validated ingestion entrypoint.
//! - [`flush`] -- the periodic drain/average/classify/persist job.
//! - [`escalation`] -- rolling consecutive-severe alert tracker.
//! - [`classifier`] -- external severity classifier client.
//! - [`rate_limit`] -- fixed-window ingestion rate limiter.
//! - [`feed`] -- long-lived consumer bridging a push feed into ingestion.
//! - [`pg`] -- Postgres-backed implementations of the trait seams.

pub mod buffer;
pub mod classifier;
pub mod error;
pub mod escalation;
pub mod feed;
pub mod flush;
pub mod identity;
pub mod ingest;
pub mod pg;
pub mod rate_limit;
pub mod store;

pub use buffer::IngestionBuffer;
pub use classifier::{HttpClassifier, SeverityClassifier};
pub use error::PipelineError;
pub use escalation::{AlertEvent, EscalationPolicy, EscalationTracker};
pub use feed::{FeedConsumer, InboundReading};
pub use flush::{FlushConfig, FlushScheduler, VitalsSink};
pub use identity::{bind_device, DeviceBinding, DeviceDirectory, MemoryDirectory};
pub use ingest::IngestService;
pub use pg::{PgDeviceDirectory, PgVitalsSink};
pub use rate_limit::RateLimiter;
pub use store::{MemoryStore, SharedStore, StoreError};
