use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use videogenie_core::job::StatusEvent;
use videogenie_core::types::JobId;
use videogenie_events::JobSubscription;

use crate::error::AppResult;
use crate::state::AppState;
use crate::ws::manager::ChannelRegistry;

/// Query string of the status channel endpoint: `?jobId=<id>`.
#[derive(Debug, Deserialize)]
pub struct StatusChannelQuery {
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

/// GET /api/v1/ws?jobId=<id> -- upgrade to a job status channel.
///
/// The job id is validated before the upgrade (400 when missing or
/// malformed). Whether the job exists is not checked: a channel for an
/// unknown job stays open and silent until something is published for it.
///
/// The hub subscription is taken before the upgrade response is sent, so
/// every transition published after the client sees `101` is delivered.
pub async fn status_channel(
    Query(query): Query<StatusChannelQuery>,
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> AppResult<Response> {
    let job_id = JobId::parse(query.job_id.unwrap_or_default())?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let subscription = state.jobs.subscribe(job_id);
    let channels = Arc::clone(&state.channels);
    Ok(ws
        .on_upgrade(move |socket| run_channel(socket, subscription, channels))
        .into_response())
}

/// Why a status channel ended.
#[derive(Debug, Clone, Copy)]
enum ChannelEnd {
    /// A terminal status was sent.
    Terminal,
    /// The subscription ended without a terminal status.
    SubscriptionClosed,
    /// The client closed the socket or it errored.
    ClientGone,
    /// Writing to the socket failed.
    SendFailed,
    /// The server is shutting down.
    Shutdown,
}

/// Drive one status channel until it ends.
///
/// A single task multiplexes three sources with `tokio::select!`:
///   1. hub events for the job, each sent as a JSON text frame,
///   2. control frames from the registry (keepalive ping, shutdown close),
///   3. inbound frames, only watched for close and errors.
///
/// Every exit path unregisters the channel and drops the subscription,
/// which releases its listener on the hub.
async fn run_channel(
    socket: WebSocket,
    mut subscription: JobSubscription,
    channels: Arc<ChannelRegistry>,
) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let job_id = subscription.job_id().clone();
    tracing::info!(conn_id = %conn_id, job_id = %job_id, "Status channel opened");

    let mut control = channels.add(conn_id.clone(), job_id.clone()).await;
    let (mut sink, mut stream) = socket.split();

    let end = loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    break ChannelEnd::SubscriptionClosed;
                };
                if let Err(e) = send_event(&mut sink, &event).await {
                    tracing::debug!(conn_id = %conn_id, error = %e, "Status send failed");
                    break ChannelEnd::SendFailed;
                }
                if event.is_terminal() {
                    let _ = sink.send(Message::Close(None)).await;
                    break ChannelEnd::Terminal;
                }
            }
            frame = control.recv() => match frame {
                Some(Message::Close(close)) => {
                    let _ = sink.send(Message::Close(close)).await;
                    break ChannelEnd::Shutdown;
                }
                Some(frame) => {
                    if sink.send(frame).await.is_err() {
                        break ChannelEnd::SendFailed;
                    }
                }
                // Registry dropped this channel's sender (shutdown_all).
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break ChannelEnd::Shutdown;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break ChannelEnd::ClientGone,
                Some(Ok(Message::Pong(_))) => {
                    tracing::trace!(conn_id = %conn_id, "Pong received");
                }
                Some(Ok(_)) => {
                    // No client-to-server messages are defined.
                }
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "Status channel receive error");
                    break ChannelEnd::ClientGone;
                }
            },
        }
    };

    channels.remove(&conn_id).await;
    drop(subscription);
    tracing::info!(conn_id = %conn_id, job_id = %job_id, end = ?end, "Status channel closed");
}

/// Serialize one event as a JSON text frame.
async fn send_event(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &StatusEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).map_err(axum::Error::new)?;
    sink.send(Message::Text(text.into())).await
}
