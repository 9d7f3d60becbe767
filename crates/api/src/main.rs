use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use videogenie_api::config::ServerConfig;
use videogenie_api::router::build_app_router;
use videogenie_api::state::AppState;
use videogenie_api::ws;
use videogenie_events::retention::RetentionPolicy;
use videogenie_events::JobStatusHub;
use videogenie_metrics::{AppendLog, HttpCollector, MetricsSink};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "videogenie_api=debug,videogenie_events=debug,videogenie_metrics=debug,tower_http=debug"
                        .into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Metrics sink ---
    let (metrics_log, writer_handle) = AppendLog::open(config.metrics_log_path.clone())
        .await
        .expect("Failed to open metrics log");

    let mut sink = MetricsSink::new(Arc::new(metrics_log));
    match &config.collector {
        Some(collector) => {
            let collector =
                HttpCollector::new(collector.clone()).expect("Failed to build collector client");
            tracing::info!(url = %collector.url(), "Metrics collector relay enabled");
            sink = sink.with_forwarder(Arc::new(collector));
        }
        None => tracing::info!("No collector ingest key configured, metrics stay local"),
    }
    let metrics = Arc::new(sink);

    // --- Job status hub ---
    let jobs = Arc::new(JobStatusHub::new());

    let retention_cancel = CancellationToken::new();
    let retention_handle = tokio::spawn(videogenie_events::retention::run(
        Arc::clone(&jobs),
        RetentionPolicy {
            finished: config.job_retention(),
            stalled: config.job_stall(),
        },
        retention_cancel.clone(),
    ));

    // --- Status channels ---
    let channels = Arc::new(ws::ChannelRegistry::new());

    // --- Heartbeat ---
    let heartbeat_handle = config
        .status_keepalive()
        .map(|every| ws::start_heartbeat(Arc::clone(&channels), every));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        jobs,
        channels: Arc::clone(&channels),
        metrics: Arc::clone(&metrics),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    // Upgraded sockets keep the server alive until they end, so status
    // channels are closed as soon as the signal arrives.
    let shutdown_channels = Arc::clone(&channels);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let count = shutdown_channels.connection_count().await;
            tracing::info!(count, "Closing status channels");
            shutdown_channels.shutdown_all().await;
        })
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    retention_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    tracing::info!("Job retention sweep stopped");

    if let Some(handle) = heartbeat_handle {
        handle.abort();
        tracing::info!("Heartbeat task stopped");
    }

    metrics.shutdown(config.shutdown_timeout()).await;

    // The writer task exits once the last handle to the log is gone.
    drop(metrics);
    let _ = tokio::time::timeout(Duration::from_secs(5), writer_handle).await;
    tracing::info!("Metrics log closed");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
