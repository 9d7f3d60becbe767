//! `videogenie-watch` -- follow one job's status channel from the terminal.
//!
//! Prints every status the server pushes until the job finishes, then exits
//! with status 0 for `complete` and 1 otherwise.
//!
//! # Usage
//!
//! ```text
//! videogenie-watch <jobId>
//! ```
//!
//! # Environment variables
//!
//! | Variable             | Required | Default                 | Description        |
//! |----------------------|----------|-------------------------|--------------------|
//! | `VIDEOGENIE_API_URL` | no       | `http://localhost:3000` | API base url       |

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use videogenie_client::{SubscriptionManager, WsStatusSource};
use videogenie_core::job::JobStatus;

const DEFAULT_API_URL: &str = "http://localhost:3000";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "videogenie_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let job_id = std::env::args().nth(1).unwrap_or_else(|| {
        eprintln!("usage: videogenie-watch <jobId>");
        std::process::exit(2);
    });

    let api_url = std::env::var("VIDEOGENIE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
    tracing::info!(api_url = %api_url, job_id = %job_id, "Starting videogenie-watch");

    let mut manager = SubscriptionManager::new(Arc::new(WsStatusSource::new(&api_url)));
    let mut updates = manager.watch();

    if let Err(e) = manager.set_job(Some(&job_id)).await {
        tracing::error!(error = %e, "Invalid job id");
        std::process::exit(2);
    }
    println!("{job_id}: {}", manager.status_text());

    let mut last = None;
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if let Some(event) = snapshot.status.filter(|e| last.as_ref() != Some(e)) {
                    match &event.url {
                        Some(url) => println!("{job_id}: {} {url}", event.status),
                        None => println!("{job_id}: {}", event.status),
                    }
                    last = Some(event);
                }
                if snapshot.ended {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    manager.deactivate().await;

    match last.map(|e| e.status) {
        Some(JobStatus::Complete) => {}
        Some(JobStatus::Failed) => std::process::exit(1),
        _ => {
            tracing::warn!("Status channel ended before the job finished");
            std::process::exit(1);
        }
    }
}
