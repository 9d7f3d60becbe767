use std::sync::Arc;
use std::time::Duration;

use crate::ws::manager::ChannelRegistry;

/// Spawn a background task that sends periodic Ping frames to every open
/// status channel.
///
/// Status channels can sit silent for the whole length of a render, so
/// without pings an intermediary may drop them as idle. The returned
/// `JoinHandle` is aborted during shutdown.
pub fn start_heartbeat(
    channels: Arc<ChannelRegistry>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately; nobody needs a ping yet.
        interval.tick().await;

        loop {
            interval.tick().await;
            let count = channels.connection_count().await;
            tracing::debug!(count, "Status channel keepalive ping");
            channels.ping_all().await;
        }
    })
}
