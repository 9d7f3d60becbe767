//! Local append-only metrics log.
//!
//! One line per accepted event:
//!
//! ```text
//! 2026-10-17T09:12:44.518Z render_complete b2c8599b-3e6b 9342ms 47s Chrome/126
//! ```
//!
//! [`AppendLog`] serializes all writes through a single task that owns the
//! file, so concurrent ingests never interleave partial lines. Each caller
//! still waits for its own line to be written before it answers.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::SecondsFormat;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use videogenie_core::metrics::MetricsEvent;
use videogenie_core::types::Timestamp;

/// Pending lines the writer task will buffer before `append` waits.
const QUEUE_CAPACITY: usize = 1024;

/// Placeholder for an absent field, keeping the column count fixed.
const MISSING: &str = "-";

// ---------------------------------------------------------------------------
// Line format
// ---------------------------------------------------------------------------

/// Render one newline-terminated log line for `event` recorded at `at`.
pub fn format_log_line(at: Timestamp, event: &MetricsEvent) -> String {
    format!(
        "{} {} {} {}ms {}s {}\n",
        at.to_rfc3339_opts(SecondsFormat::Millis, true),
        text_field(event.event.as_deref()),
        text_field(event.job_id.as_deref()),
        number_field(event.latency_ms),
        number_field(event.gpu_seconds),
        text_field(event.browser.as_deref()),
    )
}

/// Free text is flattened so a value can never split or forge a line.
fn text_field(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect(),
        _ => MISSING.to_string(),
    }
}

fn number_field(value: Option<f64>) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| v.to_string())
}

// ---------------------------------------------------------------------------
// MetricsWriter
// ---------------------------------------------------------------------------

/// Destination for formatted log lines.
///
/// `append` must write the whole line or fail; a returned `Ok` means the
/// line has been handed to the operating system.
#[async_trait]
pub trait MetricsWriter: Send + Sync {
    async fn append(&self, line: &str) -> io::Result<()>;
}

// ---------------------------------------------------------------------------
// AppendLog
// ---------------------------------------------------------------------------

struct AppendRequest {
    line: String,
    ack: oneshot::Sender<io::Result<()>>,
}

/// File-backed [`MetricsWriter`] with a single writer task.
///
/// Cheap to share behind an `Arc`. The writer task stops once every handle
/// has been dropped.
pub struct AppendLog {
    path: PathBuf,
    queue: mpsc::Sender<AppendRequest>,
}

impl AppendLog {
    /// Open (creating if needed) the log at `path` in append mode and start
    /// its writer task.
    pub async fn open(path: impl Into<PathBuf>) -> io::Result<(Self, JoinHandle<()>)> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (queue, requests) = mpsc::channel(QUEUE_CAPACITY);
        let handle = tokio::spawn(write_loop(file, path.clone(), requests));

        tracing::info!(path = %path.display(), "Metrics log opened");
        Ok((Self { path, queue }, handle))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MetricsWriter for AppendLog {
    async fn append(&self, line: &str) -> io::Result<()> {
        let (ack, done) = oneshot::channel();
        let request = AppendRequest {
            line: line.to_owned(),
            ack,
        };
        self.queue
            .send(request)
            .await
            .map_err(|_| writer_gone())?;
        done.await.map_err(|_| writer_gone())?
    }
}

fn writer_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "metrics log writer has stopped")
}

/// Drain append requests until every [`AppendLog`] handle is dropped.
async fn write_loop(mut file: File, path: PathBuf, mut requests: mpsc::Receiver<AppendRequest>) {
    while let Some(request) = requests.recv().await {
        let result = write_line(&mut file, &request.line).await;
        if let Err(e) = &result {
            tracing::error!(path = %path.display(), error = %e, "Failed to append metrics log line");
        }
        // The caller may have gone away; the line is written either way.
        let _ = request.ack.send(result);
    }
    tracing::info!(path = %path.display(), "Metrics log writer stopped");
}

async fn write_line(file: &mut File, line: &str) -> io::Result<()> {
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
