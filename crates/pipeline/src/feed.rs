//! Push-feed consumer.
//!
//! Devices that stream through a realtime transport (the WebSocket
//! endpoint, or any upstream bridge) land here: a long-lived consumer
//! task owns the receiving half of an mpsc channel and forwards every
//! inbound reading into [`IngestService::accept`]. Per-event
//! rejections are logged, never fatal to the consumer.

use std::sync::Arc;

use serde::Deserialize;
use somnia_core::vitals::RawReading;
use tokio::sync::mpsc;

use crate::ingest::IngestService;

/// One reading as it arrives from the push feed.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundReading {
    pub serial_number: String,
    #[serde(flatten)]
    pub reading: RawReading,
}

/// Long-lived consumer bridging the push feed into the ingestion buffer.
pub struct FeedConsumer {
    ingest: Arc<IngestService>,
}

impl FeedConsumer {
    pub fn new(ingest: Arc<IngestService>) -> Self {
        Self { ingest }
    }

    /// Consume the feed until the sending side is dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<InboundReading>) {
        while let Some(inbound) = rx.recv().await {
            if inbound.serial_number.is_empty() {
                tracing::warn!("Feed event missing serial_number, skipping");
                continue;
            }

            match self
                .ingest
                .accept(&inbound.serial_number, &inbound.reading)
                .await
            {
                Ok(()) => {}
                Err(e) => {
                    tracing::warn!(
                        serial_number = %inbound.serial_number,
                        error = %e,
                        "Feed reading rejected"
                    );
                }
            }
        }

        tracing::info!("Push feed closed, consumer stopping");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
