//! VideoGenie metrics sink.
//!
//! Records completion telemetry sent by the browser:
//!
//! - [`envelope`]: normalizes plain and base64-wrapped request bodies.
//! - [`log`]: the local append-only log ([`AppendLog`]) behind the
//!   [`MetricsWriter`] seam.
//! - [`forward`]: best-effort relay to the external collector
//!   ([`HttpCollector`]) behind the [`Forwarder`] seam.
//! - [`sink`]: [`MetricsSink`], which ties the three together.

pub mod envelope;
pub mod error;
pub mod forward;
pub mod log;
pub mod sink;

pub use error::SinkError;
pub use forward::{CollectorConfig, ForwardError, Forwarder, HttpCollector};
pub use log::{format_log_line, AppendLog, MetricsWriter};
pub use sink::MetricsSink;
