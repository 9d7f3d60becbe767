//! End-to-end tests for the job status channel over a real socket.

mod common;

use std::time::Duration;

use common::TestApp;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use videogenie_api::ws::start_heartbeat;
use videogenie_core::job::StatusEvent;
use videogenie_core::types::JobId;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const STEP: Duration = Duration::from_secs(5);

async fn connect(addr: std::net::SocketAddr, job_id: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/api/v1/ws?jobId={job_id}"))
        .await
        .expect("handshake");
    ws
}

/// Next data frame, skipping keepalive traffic. `None` once the server has
/// closed the channel.
async fn next_frame(ws: &mut Client) -> Option<Message> {
    loop {
        let frame = tokio::time::timeout(STEP, ws.next())
            .await
            .expect("timed out waiting for a frame");
        match frame {
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Ok(other)) => return Some(other),
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return None,
            Some(Err(e)) => panic!("websocket error: {e}"),
        }
    }
}

async fn next_json(ws: &mut Client) -> serde_json::Value {
    match next_frame(ws).await {
        Some(Message::Text(text)) => serde_json::from_str(&text).expect("json frame"),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

/// Poll `check` until it holds or the step timeout elapses.
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + STEP;
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// Test: each transition arrives in order, then the server closes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transitions_arrive_in_order_then_channel_closes() {
    let app = TestApp::new().await;
    let addr = app.spawn_server().await;
    let job_id = JobId::parse("job-e2e").unwrap();

    let mut ws = connect(addr, "job-e2e").await;

    let url = "https://cdn.example.com/v/job-e2e.mp4";
    app.state.jobs.publish(&job_id, StatusEvent::queued()).unwrap();
    app.state.jobs.publish(&job_id, StatusEvent::rendering()).unwrap();
    app.state.jobs.publish(&job_id, StatusEvent::complete(url)).unwrap();

    assert_eq!(next_json(&mut ws).await, serde_json::json!({ "status": "queued" }));
    assert_eq!(next_json(&mut ws).await, serde_json::json!({ "status": "rendering" }));
    assert_eq!(
        next_json(&mut ws).await,
        serde_json::json!({ "status": "complete", "url": url })
    );
    assert!(next_frame(&mut ws).await.is_none(), "channel should close after terminal");

    let channels = app.state.channels.clone();
    eventually(|| {
        let channels = channels.clone();
        async move { channels.connection_count().await == 0 }
    })
    .await;
    assert_eq!(app.state.jobs.subscriber_count(&job_id), 0);
}

#[tokio::test]
async fn failed_status_has_no_url() {
    let app = TestApp::new().await;
    let addr = app.spawn_server().await;
    let job_id = JobId::parse("job-fail").unwrap();

    let mut ws = connect(addr, "job-fail").await;
    app.state.jobs.publish(&job_id, StatusEvent::failed()).unwrap();

    let json = next_json(&mut ws).await;
    assert_eq!(json, serde_json::json!({ "status": "failed" }));
    assert!(json.get("url").is_none());
    assert!(next_frame(&mut ws).await.is_none());
}

// ---------------------------------------------------------------------------
// Test: handshake rejects a missing or malformed job id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_job_id_fails_handshake() {
    let app = TestApp::new().await;
    let addr = app.spawn_server().await;

    let err = connect_async(format!("ws://{addr}/api/v1/ws"))
        .await
        .expect_err("handshake should be refused");

    match err {
        WsError::Http(response) => assert_eq!(response.status(), 400),
        other => panic!("expected an HTTP error, got {other:?}"),
    }
    assert_eq!(app.state.jobs.job_count(), 0);
}

#[tokio::test]
async fn empty_job_id_fails_handshake() {
    let app = TestApp::new().await;
    let addr = app.spawn_server().await;

    let err = connect_async(format!("ws://{addr}/api/v1/ws?jobId="))
        .await
        .expect_err("handshake should be refused");

    assert!(matches!(err, WsError::Http(ref r) if r.status() == 400));
}

// ---------------------------------------------------------------------------
// Test: client disconnect releases the listener
// ---------------------------------------------------------------------------

#[tokio::test]
async fn client_close_releases_listener() {
    let app = TestApp::new().await;
    let addr = app.spawn_server().await;
    let job_id = JobId::parse("job-leave").unwrap();

    let mut ws = connect(addr, "job-leave").await;
    assert_eq!(app.state.jobs.subscriber_count(&job_id), 1);

    ws.close(None).await.unwrap();

    let jobs = app.state.jobs.clone();
    let id = job_id.clone();
    eventually(move || {
        let jobs = jobs.clone();
        let id = id.clone();
        async move { jobs.subscriber_count(&id) == 0 }
    })
    .await;

    // Publishing afterwards reaches nobody and does not fail.
    assert_eq!(app.state.jobs.publish(&job_id, StatusEvent::queued()).unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Test: a subscriber arriving late sees the latest snapshot
// ---------------------------------------------------------------------------

#[tokio::test]
async fn late_subscriber_receives_terminal_snapshot() {
    let app = TestApp::new().await;
    let addr = app.spawn_server().await;
    let job_id = JobId::parse("job-late").unwrap();
    let url = "https://cdn.example.com/v/job-late.mp4";

    app.state.jobs.publish(&job_id, StatusEvent::queued()).unwrap();
    app.state.jobs.publish(&job_id, StatusEvent::complete(url)).unwrap();

    let mut ws = connect(addr, "job-late").await;

    assert_eq!(
        next_json(&mut ws).await,
        serde_json::json!({ "status": "complete", "url": url })
    );
    assert!(next_frame(&mut ws).await.is_none());
}

#[tokio::test]
async fn late_subscriber_continues_from_snapshot() {
    let app = TestApp::new().await;
    let addr = app.spawn_server().await;
    let job_id = JobId::parse("job-mid").unwrap();

    app.state.jobs.publish(&job_id, StatusEvent::rendering()).unwrap();
    let mut ws = connect(addr, "job-mid").await;
    app.state.jobs.publish(&job_id, StatusEvent::failed()).unwrap();

    assert_eq!(next_json(&mut ws).await["status"], "rendering");
    assert_eq!(next_json(&mut ws).await["status"], "failed");
    assert!(next_frame(&mut ws).await.is_none());
}

// ---------------------------------------------------------------------------
// Test: channels are scoped to their job
// ---------------------------------------------------------------------------

#[tokio::test]
async fn channel_ignores_other_jobs() {
    let app = TestApp::new().await;
    let addr = app.spawn_server().await;

    let mut ws = connect(addr, "job-a").await;
    app.state
        .jobs
        .publish(&JobId::parse("job-b").unwrap(), StatusEvent::queued())
        .unwrap();

    let silent = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(silent.is_err(), "no frame expected for another job");
}

#[tokio::test]
async fn two_channels_for_one_job_both_receive() {
    let app = TestApp::new().await;
    let addr = app.spawn_server().await;
    let job_id = JobId::parse("job-shared").unwrap();

    let mut first = connect(addr, "job-shared").await;
    let mut second = connect(addr, "job-shared").await;
    assert_eq!(app.state.jobs.subscriber_count(&job_id), 2);

    app.state.jobs.publish(&job_id, StatusEvent::queued()).unwrap();

    assert_eq!(next_json(&mut first).await["status"], "queued");
    assert_eq!(next_json(&mut second).await["status"], "queued");
}

// ---------------------------------------------------------------------------
// Test: registry-driven control frames
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_all_closes_open_channels() {
    let app = TestApp::new().await;
    let addr = app.spawn_server().await;
    let job_id = JobId::parse("job-shutdown").unwrap();

    let mut ws = connect(addr, "job-shutdown").await;
    let channels = app.state.channels.clone();
    eventually(|| {
        let channels = channels.clone();
        async move { channels.connection_count().await == 1 }
    })
    .await;

    app.state.channels.shutdown_all().await;

    assert!(next_frame(&mut ws).await.is_none());
    let jobs = app.state.jobs.clone();
    eventually(move || {
        let jobs = jobs.clone();
        let id = job_id.clone();
        async move { jobs.subscriber_count(&id) == 0 }
    })
    .await;
}

#[tokio::test]
async fn heartbeat_pings_idle_channels() {
    let app = TestApp::new().await;
    let addr = app.spawn_server().await;

    let mut ws = connect(addr, "job-idle").await;
    let channels = app.state.channels.clone();
    eventually(|| {
        let channels = channels.clone();
        async move { channels.connection_count().await == 1 }
    })
    .await;

    let heartbeat = start_heartbeat(app.state.channels.clone(), Duration::from_millis(50));

    let frame = tokio::time::timeout(STEP, ws.next())
        .await
        .expect("timed out waiting for ping")
        .expect("stream ended")
        .expect("websocket error");
    assert!(matches!(frame, Message::Ping(_)), "expected Ping, got {frame:?}");

    heartbeat.abort();
}
