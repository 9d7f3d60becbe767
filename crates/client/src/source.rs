//! Status channel transport.
//!
//! [`WsStatusSource`] connects to `<ws base>/api/v1/ws?jobId=<id>` and yields
//! each text frame as a [`StatusEvent`]. The ws base is derived from the HTTP
//! API url the rest of the client already knows.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use videogenie_core::job::StatusEvent;
use videogenie_core::types::JobId;

use crate::error::ClientError;

/// Path of the status channel endpoint, relative to the API base.
const STATUS_CHANNEL_PATH: &str = "/api/v1/ws";

/// An open status channel for a single job.
#[async_trait]
pub trait StatusChannel: Send {
    /// Next status pushed by the server. `None` once the channel is closed.
    async fn next(&mut self) -> Option<Result<StatusEvent, ClientError>>;

    /// Close the channel. Called exactly once by its owner.
    async fn close(&mut self);
}

/// Opens status channels.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn open(&self, job_id: &JobId) -> Result<Box<dyn StatusChannel>, ClientError>;
}

/// Map an HTTP(S) API url onto its WebSocket counterpart.
///
/// `https://` becomes `wss://`, `http://` becomes `ws://`; urls that are
/// already `ws(s)://` are kept. Trailing slashes are dropped.
pub fn to_ws_url(api_url: &str) -> String {
    let base = api_url.trim().trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    }
}

// ---------------------------------------------------------------------------
// WsStatusSource
// ---------------------------------------------------------------------------

/// [`StatusSource`] over tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WsStatusSource {
    ws_base: String,
}

impl WsStatusSource {
    /// Create a source for the API at `api_url` (e.g. `https://api.example.com`).
    pub fn new(api_url: &str) -> Self {
        Self {
            ws_base: to_ws_url(api_url),
        }
    }

    /// Full channel url for `job_id`.
    ///
    /// Job ids are restricted to url-safe characters, so no escaping is needed.
    pub fn channel_url(&self, job_id: &JobId) -> String {
        format!("{}{STATUS_CHANNEL_PATH}?jobId={job_id}", self.ws_base)
    }
}

#[async_trait]
impl StatusSource for WsStatusSource {
    async fn open(&self, job_id: &JobId) -> Result<Box<dyn StatusChannel>, ClientError> {
        let url = self.channel_url(job_id);
        let (stream, _response) = connect_async(&url).await.map_err(|e| {
            ClientError::Connection(format!("Failed to open status channel at {url}: {e}"))
        })?;

        tracing::info!(job_id = %job_id, url = %url, "Status channel connected");

        Ok(Box::new(WsStatusChannel {
            job_id: job_id.clone(),
            stream,
        }))
    }
}

struct WsStatusChannel {
    job_id: JobId,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl StatusChannel for WsStatusChannel {
    async fn next(&mut self) -> Option<Result<StatusEvent, ClientError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(ClientError::Protocol(e.to_string()))),
            };
            match frame {
                Message::Text(text) => return Some(decode(&text)),
                Message::Close(_) => return None,
                // Pings are answered by tungstenite on the next read.
                _ => continue,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(job_id = %self.job_id, error = %e, "Status channel close failed");
        }
    }
}

fn decode(text: &str) -> Result<StatusEvent, ClientError> {
    let event: StatusEvent =
        serde_json::from_str(text).map_err(|e| ClientError::Decode(e.to_string()))?;
    event
        .validate()
        .map_err(|e| ClientError::Decode(e.to_string()))?;
    Ok(event)
}
