//! In-process job status hub.
//!
//! [`JobStatusHub`] keeps the latest known [`StatusEvent`] of every job it
//! has heard about, plus one unbounded queue per open subscription. It is
//! designed to be shared via `Arc<JobStatusHub>` across the application.
//!
//! Unlike a broadcast channel, a slow subscriber never loses events: each
//! subscription owns its own FIFO queue, so two transitions published
//! back-to-back are both delivered, in order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use videogenie_core::error::CoreError;
use videogenie_core::job::StatusEvent;
use videogenie_core::types::JobId;

type JobTable = Mutex<HashMap<JobId, JobEntry>>;

fn lock(table: &JobTable) -> MutexGuard<'_, HashMap<JobId, JobEntry>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// JobEntry
// ---------------------------------------------------------------------------

/// Hub-side state of one job.
struct JobEntry {
    /// Most recent status published for the job, if any.
    latest: Option<StatusEvent>,
    /// When `latest` last changed.
    updated_at: Instant,
    /// Open subscriptions keyed by listener id.
    listeners: HashMap<u64, mpsc::UnboundedSender<StatusEvent>>,
}

impl JobEntry {
    fn empty() -> Self {
        Self {
            latest: None,
            updated_at: Instant::now(),
            listeners: HashMap::new(),
        }
    }

    /// Nothing known and nobody listening.
    fn is_idle(&self) -> bool {
        self.latest.is_none() && self.listeners.is_empty()
    }
}

// ---------------------------------------------------------------------------
// JobStatusHub
// ---------------------------------------------------------------------------

/// Relays job status transitions to the subscriptions open for each job.
pub struct JobStatusHub {
    jobs: Arc<JobTable>,
    next_listener_id: AtomicU64,
}

impl JobStatusHub {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Record a new status for `job_id` and push it to every subscriber.
    ///
    /// The status must move the job strictly forward; repeats, regressions
    /// and anything after a terminal status are rejected with
    /// [`CoreError::Conflict`]. After a terminal status all subscriber
    /// queues for the job are dropped, which ends those subscriptions once
    /// they have drained.
    ///
    /// Returns the number of subscriptions the event was delivered to.
    pub fn publish(&self, job_id: &JobId, event: StatusEvent) -> Result<usize, CoreError> {
        event.validate()?;

        let mut jobs = lock(&self.jobs);
        let entry = jobs.entry(job_id.clone()).or_insert_with(JobEntry::empty);

        if let Some(current) = &entry.latest {
            if !current.status.can_advance_to(event.status) {
                return Err(CoreError::Conflict(format!(
                    "job {job_id} cannot move from '{}' to '{}'",
                    current.status, event.status
                )));
            }
        }

        entry.latest = Some(event.clone());
        entry.updated_at = Instant::now();

        // Queues whose receiver is gone are pruned on the way through.
        entry
            .listeners
            .retain(|_, tx| tx.send(event.clone()).is_ok());
        let delivered = entry.listeners.len();

        if event.is_terminal() {
            entry.listeners.clear();
        }

        tracing::debug!(
            job_id = %job_id,
            status = %event.status,
            delivered,
            "Job status published"
        );
        Ok(delivered)
    }

    /// Open a subscription to the status transitions of `job_id`.
    ///
    /// The job does not have to exist: an unknown id yields a subscription
    /// that stays silent until something is published for it. If the job
    /// already has a status, that snapshot is delivered first; when the
    /// snapshot is terminal it is the only event the subscription yields.
    pub fn subscribe(&self, job_id: JobId) -> JobSubscription {
        let (tx, receiver) = mpsc::unbounded_channel();
        let listener_id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);

        let mut jobs = lock(&self.jobs);
        let entry = jobs.entry(job_id.clone()).or_insert_with(JobEntry::empty);

        let mut registered = Some(listener_id);
        if let Some(latest) = &entry.latest {
            let _ = tx.send(latest.clone());
            if latest.is_terminal() {
                registered = None;
            }
        }
        if registered.is_some() {
            entry.listeners.insert(listener_id, tx);
        }

        tracing::debug!(job_id = %job_id, listener_id, "Job status subscription opened");

        JobSubscription {
            job_id,
            listener_id: registered,
            receiver,
            jobs: Arc::downgrade(&self.jobs),
            finished: false,
        }
    }

    /// Latest known status of a job, if any has been published.
    pub fn latest(&self, job_id: &JobId) -> Option<StatusEvent> {
        lock(&self.jobs)
            .get(job_id)
            .and_then(|entry| entry.latest.clone())
    }

    /// Number of open subscriptions for a job.
    pub fn subscriber_count(&self, job_id: &JobId) -> usize {
        lock(&self.jobs)
            .get(job_id)
            .map_or(0, |entry| entry.listeners.len())
    }

    /// Number of jobs the hub currently tracks.
    pub fn job_count(&self) -> usize {
        lock(&self.jobs).len()
    }

    /// Forget terminal jobs that nobody listens to and that have not changed
    /// for at least `older_than`. Returns how many were removed.
    pub fn prune_terminal(&self, older_than: Duration) -> usize {
        let mut jobs = lock(&self.jobs);
        let before = jobs.len();
        jobs.retain(|_, entry| {
            let expired = entry.listeners.is_empty()
                && entry.latest.as_ref().is_some_and(StatusEvent::is_terminal)
                && entry.updated_at.elapsed() >= older_than;
            !expired
        });
        before - jobs.len()
    }

    /// Forget unfinished jobs that nobody listens to and that have not
    /// changed for at least `older_than`, i.e. jobs whose renderer went
    /// quiet without reporting an outcome. Returns how many were removed.
    pub fn prune_stalled(&self, older_than: Duration) -> usize {
        let mut jobs = lock(&self.jobs);
        let before = jobs.len();
        jobs.retain(|_, entry| {
            let stalled = entry.listeners.is_empty()
                && entry.latest.as_ref().is_some_and(|e| !e.is_terminal())
                && entry.updated_at.elapsed() >= older_than;
            !stalled
        });
        before - jobs.len()
    }
}

impl Default for JobStatusHub {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// JobSubscription
// ---------------------------------------------------------------------------

/// One open listener on a job's status transitions.
///
/// Dropping the subscription unregisters its listener from the hub, so a
/// closed socket never leaves a queue behind.
pub struct JobSubscription {
    job_id: JobId,
    /// `None` once released, or when the subscription was born finished.
    listener_id: Option<u64>,
    receiver: mpsc::UnboundedReceiver<StatusEvent>,
    jobs: Weak<JobTable>,
    finished: bool,
}

impl JobSubscription {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Wait for the next status event.
    ///
    /// Yields events in publish order up to and including the first terminal
    /// one, then `None` from then on. Cancel-safe, so it can be used as a
    /// `tokio::select!` branch.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        if self.finished {
            return None;
        }
        match self.receiver.recv().await {
            Some(event) => {
                if event.is_terminal() {
                    self.finished = true;
                    self.release();
                }
                Some(event)
            }
            None => {
                self.finished = true;
                self.release();
                None
            }
        }
    }

    /// Whether the subscription has yielded its last event.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn release(&mut self) {
        let Some(listener_id) = self.listener_id.take() else {
            return;
        };
        let Some(jobs) = self.jobs.upgrade() else {
            return;
        };
        let mut jobs = lock(&jobs);
        if let Some(entry) = jobs.get_mut(&self.job_id) {
            entry.listeners.remove(&listener_id);
            if entry.is_idle() {
                jobs.remove(&self.job_id);
            }
        }
        tracing::debug!(job_id = %self.job_id, listener_id, "Job status subscription released");
    }
}

impl Drop for JobSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
