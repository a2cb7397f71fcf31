use somnia_core::CoreError;

use crate::store::StoreError;

/// Error type shared by the pipeline components.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A domain-level error (validation, not-found, conflict, unbound).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The shared buffer/counter store is unavailable. Ingestion must
    /// reject loudly on this rather than accept and drop data.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Durable storage failed; isolated per device and retried next cycle.
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// The external classifier could not be reached or timed out.
    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    /// A buffered payload could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The caller exhausted its fixed-window ingestion quota.
    #[error("Too many requests for caller '{0}'")]
    RateLimited(String),
}
