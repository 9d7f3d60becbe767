use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};
use videogenie_core::types::{JobId, Timestamp};

/// Channel sender half for pushing control frames to a status channel.
pub type ChannelSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single open status channel.
pub struct StatusChannelConn {
    /// Job the channel is scoped to.
    pub job_id: JobId,
    /// Control frames (keepalive pings, shutdown close) for this channel.
    pub sender: ChannelSender,
    /// When this channel was opened.
    pub connected_at: Timestamp,
}

/// Tracks every open status channel.
///
/// Status events do not flow through here; each channel reads its job's
/// events straight from the hub. The registry only carries control frames
/// that concern all channels at once.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct ChannelRegistry {
    connections: RwLock<HashMap<String, StatusChannelConn>>,
}

impl ChannelRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new channel.
    ///
    /// Returns the receiver half of the control queue so the channel task
    /// can forward control frames to its socket.
    pub async fn add(&self, conn_id: String, job_id: JobId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = StatusChannelConn {
            job_id,
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a channel by its connection ID.
    pub async fn remove(&self, conn_id: &str) {
        if let Some(conn) = self.connections.write().await.remove(conn_id) {
            tracing::debug!(
                conn_id,
                job_id = %conn.job_id,
                open_secs = (chrono::Utc::now() - conn.connected_at).num_seconds(),
                "Status channel unregistered"
            );
        }
    }

    /// Return the current number of open channels.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Number of open channels scoped to `job_id`.
    pub async fn count_for_job(&self, job_id: &JobId) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|conn| &conn.job_id == job_id)
            .count()
    }

    /// Send a Ping frame to every open channel.
    ///
    /// Used by the heartbeat task so idle channels are not reaped by
    /// proxies while a long render is in progress.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }

    /// Send a Close frame to every channel, then clear the map.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all status channels");
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
