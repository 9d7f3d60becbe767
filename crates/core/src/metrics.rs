//! Completion telemetry recorded by the metrics sink.
//!
//! The sink is a recorder, not an authority: it checks that an event names
//! its kind and its job, and that measurements are not negative, but it
//! never looks the job up.

use serde::{Deserialize, Serialize};

/// The only event kind the platform currently emits.
pub const EVENT_RENDER_COMPLETE: &str = "render_complete";

/// A telemetry event as sent by the browser, e.g.
///
/// ```json
/// {"event":"render_complete","jobId":"b2c8599b-3e6b","latencyMs":9342,"gpuSeconds":47,"browser":"Chrome/126"}
/// ```
///
/// Every field is optional at the type level so that a payload missing its
/// required fields still decodes and can be rejected by [`validate`](Self::validate)
/// with a client error rather than a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsEvent {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub gpu_seconds: Option<f64>,
    #[serde(default)]
    pub browser: Option<String>,
}

/// Why a decoded metrics event was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricsValidationError {
    #[error("missing event or jobId")]
    MissingEventOrJobId,

    #[error("{field} must be a non-negative number")]
    Negative { field: &'static str },
}

impl MetricsEvent {
    /// Check required fields and measurement ranges.
    pub fn validate(&self) -> Result<(), MetricsValidationError> {
        if is_blank(&self.event) || is_blank(&self.job_id) {
            return Err(MetricsValidationError::MissingEventOrJobId);
        }
        for (field, value) in [("latencyMs", self.latency_ms), ("gpuSeconds", self.gpu_seconds)] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(MetricsValidationError::Negative { field });
                }
            }
        }
        Ok(())
    }

    pub fn is_render_complete(&self) -> bool {
        self.event.as_deref() == Some(EVENT_RENDER_COMPLETE)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}
