//! Metrics ingestion.
//!
//! [`MetricsSink::ingest`] runs the whole accept path for one request:
//!
//! 1. normalize the body ([`envelope::normalize`]),
//! 2. validate `event` / `jobId` and the measurements,
//! 3. append one line to the local log and wait for the write,
//! 4. hand the payload to the forwarder on a detached task,
//! 5. report success as soon as step 3 is done.
//!
//! Nothing the forwarder does can change the outcome of an ingest.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::task::TaskTracker;
use videogenie_core::metrics::MetricsEvent;

use crate::envelope;
use crate::error::SinkError;
use crate::forward::Forwarder;
use crate::log::{format_log_line, MetricsWriter};

/// Records metrics events locally and relays them to the collector.
pub struct MetricsSink {
    writer: Arc<dyn MetricsWriter>,
    /// `None` when no collector credential is configured.
    forwarder: Option<Arc<dyn Forwarder>>,
    /// In-flight forward tasks, drained on shutdown.
    in_flight: TaskTracker,
}

impl MetricsSink {
    /// A sink that only records locally.
    pub fn new(writer: Arc<dyn MetricsWriter>) -> Self {
        Self {
            writer,
            forwarder: None,
            in_flight: TaskTracker::new(),
        }
    }

    /// Relay every accepted payload to `forwarder`.
    pub fn with_forwarder(mut self, forwarder: Arc<dyn Forwarder>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    /// Whether accepted events are relayed to a collector.
    pub fn forwarding_enabled(&self) -> bool {
        self.forwarder.is_some()
    }

    /// Number of forward attempts still running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Accept one request body.
    ///
    /// Returns once the log line is written. Every accepted request appends
    /// exactly one line and triggers at most one forward attempt; duplicates
    /// are recorded as duplicates.
    pub async fn ingest(&self, body: &[u8]) -> Result<(), SinkError> {
        let payload = envelope::normalize(body)?;
        // The payload is already a JSON object here, so a failure can only be
        // a field of the wrong type: the sender's mistake, not ours.
        let event: MetricsEvent = serde_json::from_value(payload.clone())
            .map_err(|e| SinkError::InvalidField(format!("unexpected field type: {e}")))?;
        event.validate()?;

        let job_id = event.job_id.clone().unwrap_or_default();
        if !event.is_render_complete() {
            tracing::debug!(job_id = %job_id, event = ?event.event, "Recording unrecognised metrics event kind");
        }

        let line = format_log_line(chrono::Utc::now(), &event);
        self.writer.append(&line).await?;
        tracing::info!(job_id = %job_id, event = ?event.event, "Metrics event recorded");

        self.spawn_forward(payload, job_id);
        Ok(())
    }

    /// Relay `payload` without waiting for the outcome.
    fn spawn_forward(&self, payload: serde_json::Value, job_id: String) {
        let Some(forwarder) = &self.forwarder else {
            return;
        };
        let forwarder = Arc::clone(forwarder);
        self.in_flight.spawn(async move {
            match forwarder.forward(&payload).await {
                Ok(()) => tracing::debug!(job_id = %job_id, "Metrics event forwarded to collector"),
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Metrics forward failed, dropping event")
                }
            }
        });
    }

    /// Wait up to `timeout` for in-flight forwards. Returns `false` if some
    /// were still running when the time ran out.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.in_flight.close();
        let pending = self.in_flight.len();
        let drained = tokio::time::timeout(timeout, self.in_flight.wait())
            .await
            .is_ok();
        if drained {
            tracing::info!(pending, "Metrics forwards drained");
        } else {
            tracing::warn!(
                remaining = self.in_flight.len(),
                "Metrics forwards still running at shutdown"
            );
        }
        drained
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
