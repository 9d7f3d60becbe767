use videogenie_core::metrics::MetricsValidationError;

/// Outcome of a refused or failed ingest.
///
/// The first two variants are the caller's fault and must not be retried
/// as-is; the last two are worth retrying.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// `event` or `jobId` is absent or empty.
    #[error("missing event or jobId")]
    MissingFields,

    /// A field is present but out of range.
    #[error("{0}")]
    InvalidField(String),

    /// The body could not be decoded into a metrics payload.
    #[error("Malformed metrics payload: {0}")]
    Decode(String),

    /// The local log line could not be written.
    #[error("Failed to append metrics log: {0}")]
    Write(#[from] std::io::Error),
}

impl From<MetricsValidationError> for SinkError {
    fn from(err: MetricsValidationError) -> Self {
        match err {
            MetricsValidationError::MissingEventOrJobId => Self::MissingFields,
            other => Self::InvalidField(other.to_string()),
        }
    }
}

impl SinkError {
    /// Whether the failure lies with the request rather than the sink.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingFields | Self::InvalidField(_))
    }
}
