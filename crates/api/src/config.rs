use std::path::PathBuf;
use std::time::Duration;

use videogenie_metrics::CollectorConfig;

/// Default location of the local metrics log.
pub const DEFAULT_METRICS_LOG_PATH: &str = "/tmp/metrics.log";

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on draining in-flight metric forwards at shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Local append-only metrics log (default: `/tmp/metrics.log`).
    pub metrics_log_path: PathBuf,
    /// Keepalive ping interval on status channels; `0` disables (default: `30`).
    pub status_keepalive_secs: u64,
    /// How long finished jobs stay queryable in the hub (default: `3600`).
    pub job_retention_secs: u64,
    /// How long an unfinished, unwatched job may stay silent before it is
    /// forgotten (default: `86400`).
    pub job_stall_secs: u64,
    /// External collector, `None` when no ingest key is configured.
    pub collector: Option<CollectorConfig>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                    |
    /// |-------------------------|----------------------------|
    /// | `HOST`                  | `0.0.0.0`                  |
    /// | `PORT`                  | `3000`                     |
    /// | `CORS_ORIGINS`          | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                       |
    /// | `METRICS_LOG_PATH`      | `/tmp/metrics.log`         |
    /// | `STATUS_KEEPALIVE_SECS` | `30`                       |
    /// | `JOB_RETENTION_SECS`    | `3600`                     |
    /// | `JOB_STALL_SECS`        | `86400`                    |
    ///
    /// Collector settings are read by [`CollectorConfig::from_env`].
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = env_u64("REQUEST_TIMEOUT_SECS", 30);
        let shutdown_timeout_secs = env_u64("SHUTDOWN_TIMEOUT_SECS", 30);

        let metrics_log_path = std::env::var("METRICS_LOG_PATH")
            .unwrap_or_else(|_| DEFAULT_METRICS_LOG_PATH.into())
            .into();

        let status_keepalive_secs = env_u64("STATUS_KEEPALIVE_SECS", 30);
        let job_retention_secs = env_u64("JOB_RETENTION_SECS", 3600);
        let job_stall_secs = env_u64("JOB_STALL_SECS", 86_400);

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            metrics_log_path,
            status_keepalive_secs,
            job_retention_secs,
            job_stall_secs,
            collector: CollectorConfig::from_env(),
        }
    }

    /// Keepalive interval, `None` when disabled.
    pub fn status_keepalive(&self) -> Option<Duration> {
        (self.status_keepalive_secs > 0).then(|| Duration::from_secs(self.status_keepalive_secs))
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    pub fn job_stall(&self) -> Duration {
        Duration::from_secs(self.job_stall_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid u64")),
        Err(_) => default,
    }
}
