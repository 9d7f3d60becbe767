//! Job lifecycle states and the status event pushed to subscribers.
//!
//! A job moves `queued -> rendering -> complete | failed` and never goes
//! backwards. Steps may be skipped (a job can fail while still queued) but a
//! terminal state is final.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Lifecycle state of a rendering job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Rendering,
    Complete,
    Failed,
}

impl JobStatus {
    /// Wire name, identical to the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Rendering => "rendering",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    /// `complete` and `failed` end the job.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Rendering => 1,
            Self::Complete | Self::Failed => 2,
        }
    }

    /// Whether a job currently in `self` may move to `next`.
    ///
    /// Only strictly forward moves out of a non-terminal state are allowed,
    /// so repeats and regressions are both rejected.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One push on a job status channel: `{"status": ..., "url"?: ...}`.
///
/// `url` is present exactly when `status` is `complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl StatusEvent {
    /// Build an event, enforcing the url-iff-complete rule.
    pub fn new(status: JobStatus, url: Option<String>) -> Result<Self, CoreError> {
        let url = url.filter(|u| !u.trim().is_empty());
        match (status, &url) {
            (JobStatus::Complete, None) => Err(CoreError::Validation(
                "a complete status must carry a result url".into(),
            )),
            (JobStatus::Complete, Some(_)) => Ok(Self { status, url }),
            (other, Some(_)) => Err(CoreError::Validation(format!(
                "status '{other}' must not carry a result url"
            ))),
            (_, None) => Ok(Self { status, url }),
        }
    }

    pub fn queued() -> Self {
        Self {
            status: JobStatus::Queued,
            url: None,
        }
    }

    pub fn rendering() -> Self {
        Self {
            status: JobStatus::Rendering,
            url: None,
        }
    }

    pub fn failed() -> Self {
        Self {
            status: JobStatus::Failed,
            url: None,
        }
    }

    pub fn complete(url: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Complete,
            url: Some(url.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Re-check the url-iff-complete rule on an event that came off the wire.
    pub fn validate(&self) -> Result<(), CoreError> {
        Self::new(self.status, self.url.clone()).map(|_| ())
    }
}
