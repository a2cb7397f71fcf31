//! External severity classifier client.
//!
//! The classification model is an opaque HTTP service: it is fed the
//! averaged feature vector and returns a severity label. The trait is
//! the seam that keeps the flush scheduler and the prediction endpoint
//! testable without a live model server.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use somnia_core::vitals::{Severity, VitalsSummary};

use crate::error::PipelineError;

/// Maps an averaged feature vector to a severity label.
#[async_trait]
pub trait SeverityClassifier: Send + Sync {
    async fn classify(&self, summary: &VitalsSummary) -> Result<Severity, PipelineError>;
}

/// Response body of the classifier's `/predict` endpoint.
#[derive(Debug, Deserialize)]
struct PredictionResponse {
    severity: Severity,
}

/// HTTP client for the classifier service.
pub struct HttpClassifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClassifier {
    /// Create a client for the service at `base_url` with a per-request
    /// timeout, so a slow classifier can never stall a flush cycle.
    ///
    /// Fails if the underlying HTTP client cannot be built (e.g. TLS
    /// backend initialization).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::ClassifierUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl SeverityClassifier for HttpClassifier {
    async fn classify(&self, summary: &VitalsSummary) -> Result<Severity, PipelineError> {
        let url = format!("{}/predict", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(summary)
            .send()
            .await
            .map_err(|e| PipelineError::ClassifierUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| PipelineError::ClassifierUnavailable(e.to_string()))?;

        let prediction: PredictionResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::ClassifierUnavailable(e.to_string()))?;

        Ok(prediction.severity)
    }
}
