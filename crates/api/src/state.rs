use std::sync::Arc;

use videogenie_events::JobStatusHub;
use videogenie_metrics::MetricsSink;

use crate::config::ServerConfig;
use crate::ws::ChannelRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration, resolved once at startup.
    pub config: Arc<ServerConfig>,
    /// Job status hub relaying renderer reports to status channels.
    pub jobs: Arc<JobStatusHub>,
    /// Open status-channel WebSocket connections.
    pub channels: Arc<ChannelRegistry>,
    /// Metrics sink (local log + collector relay).
    pub metrics: Arc<MetricsSink>,
}
