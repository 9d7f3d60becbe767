#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use videogenie_api::config::ServerConfig;
use videogenie_api::router::build_app_router;
use videogenie_api::state::AppState;
use videogenie_api::ws::ChannelRegistry;
use videogenie_events::JobStatusHub;
use videogenie_metrics::{AppendLog, Forwarder, MetricsSink};

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default),
/// disables keepalive pings and points the metrics log at `log_path`.
pub fn test_config(log_path: PathBuf) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        metrics_log_path: log_path,
        status_keepalive_secs: 0,
        job_retention_secs: 3600,
        job_stall_secs: 86_400,
        collector: None,
    }
}

/// A fully wired application backed by a temporary metrics log.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub log_path: PathBuf,
    // Keeps the log directory alive for the duration of the test.
    _dir: TempDir,
}

impl TestApp {
    /// App with local metrics only.
    pub async fn new() -> Self {
        Self::build(None).await
    }

    /// App that relays accepted metrics to `forwarder`.
    pub async fn with_forwarder(forwarder: Arc<dyn Forwarder>) -> Self {
        Self::build(Some(forwarder)).await
    }

    async fn build(forwarder: Option<Arc<dyn Forwarder>>) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_path = dir.path().join("metrics.log");
        let config = test_config(log_path.clone());

        let (log, _writer) = AppendLog::open(log_path.clone())
            .await
            .expect("open metrics log");
        let mut sink = MetricsSink::new(Arc::new(log));
        if let Some(forwarder) = forwarder {
            sink = sink.with_forwarder(forwarder);
        }

        let state = AppState {
            config: Arc::new(config.clone()),
            jobs: Arc::new(JobStatusHub::new()),
            channels: Arc::new(ChannelRegistry::new()),
            metrics: Arc::new(sink),
        };

        // This mirrors the router construction in `main.rs` so integration
        // tests exercise the same middleware stack production uses.
        let router = build_app_router(state.clone(), &config);

        Self {
            router,
            state,
            log_path,
            _dir: dir,
        }
    }

    /// Lines currently in the metrics log.
    pub async fn log_lines(&self) -> Vec<String> {
        tokio::fs::read_to_string(&self.log_path)
            .await
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    /// Serve the app on an ephemeral local port, for WebSocket tests.
    pub async fn spawn_server(&self) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        addr
    }
}

/// Send a GET request through the router.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request with a JSON body through the router.
pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request with an arbitrary body through the router.
pub async fn post_raw(app: Router, uri: &str, body: impl Into<Body>) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
