//! Periodic cleanup of finished and abandoned jobs.
//!
//! The hub keeps a terminal snapshot around so that a client opening its
//! channel after the job finished still learns the outcome. This task drops
//! those snapshots once they are older than the configured retention and no
//! subscription is open for them. Unfinished jobs nobody listens to are
//! dropped too once they have been silent for the (longer) stall limit, so a
//! renderer that dies mid-job does not pin its entry forever.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::hub::JobStatusHub;

/// Lower bound on the sweep interval.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Age limits applied by the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// How long a finished job stays queryable.
    pub finished: Duration,
    /// How long an unfinished job may go without a status report.
    pub stalled: Duration,
}

/// Sweep interval derived from the retention: a quarter of it, at least 1 s.
pub fn sweep_interval(retention: Duration) -> Duration {
    (retention / 4).max(MIN_SWEEP_INTERVAL)
}

/// Run the retention loop until `cancel` is triggered.
pub async fn run(hub: Arc<JobStatusHub>, policy: RetentionPolicy, cancel: CancellationToken) {
    let every = sweep_interval(policy.finished.min(policy.stalled));
    tracing::info!(
        retention_secs = policy.finished.as_secs(),
        stall_secs = policy.stalled.as_secs(),
        interval_secs = every.as_secs(),
        "Job retention sweep started"
    );

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention sweep stopping");
                break;
            }
            _ = interval.tick() => {
                let finished = hub.prune_terminal(policy.finished);
                let stalled = hub.prune_stalled(policy.stalled);
                if stalled > 0 {
                    tracing::warn!(stalled, "Job retention: forgot jobs that never finished");
                }
                if finished > 0 {
                    tracing::info!(finished, "Job retention: forgot finished jobs");
                } else if stalled == 0 {
                    tracing::debug!("Job retention: nothing to forget");
                }
            }
        }
    }
}
