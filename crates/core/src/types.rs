use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Maximum accepted length of a job identifier.
pub const MAX_JOB_ID_LEN: usize = 128;

/// Characters allowed in a job identifier. Safe to embed in a query string
/// or a path segment without escaping.
const JOB_ID_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._:-]*$";

static JOB_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(JOB_ID_PATTERN).expect("valid regex"));

/// Opaque identifier of a rendering job, assigned by the submission service.
///
/// Only the shape is checked; whether a job with this id exists is never
/// verified here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Validate and wrap a raw identifier.
    pub fn parse(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(CoreError::Validation("jobId must not be empty".into()));
        }
        if raw.len() > MAX_JOB_ID_LEN {
            return Err(CoreError::Validation(format!(
                "jobId must be at most {MAX_JOB_ID_LEN} characters"
            )));
        }
        if !JOB_ID_RE.is_match(&raw) {
            return Err(CoreError::Validation(format!(
                "jobId '{raw}' contains unsupported characters"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl std::str::FromStr for JobId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
