//! Single-channel subscription manager.
//!
//! A [`SubscriptionManager`] belongs to one view of one job. It keeps at most
//! one status channel open, swaps it when the job changes, and publishes the
//! most recent status through a `watch` channel: last write wins, no history.
//!
//! Every channel it opens is closed exactly once, whichever way it ends:
//! the server finishing the job, an explicit [`deactivate`], a job switch,
//! or the manager being dropped.
//!
//! [`deactivate`]: SubscriptionManager::deactivate

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use videogenie_core::job::{JobStatus, StatusEvent};
use videogenie_core::types::JobId;

use crate::error::ClientError;
use crate::source::StatusSource;

/// Shown while a job is selected but nothing has been received yet.
pub const PLACEHOLDER_STATUS: &str = "Initializing job...";

/// What the view currently knows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Job the snapshot belongs to, `None` when no job is selected.
    pub job_id: Option<JobId>,
    /// Most recent status received for `job_id`.
    pub status: Option<StatusEvent>,
    /// The channel for `job_id` has ended (terminal status, server close,
    /// connection failure).
    pub ended: bool,
}

impl StatusSnapshot {
    fn selected(job_id: JobId) -> Self {
        Self {
            job_id: Some(job_id),
            status: None,
            ended: false,
        }
    }

    fn is_for(&self, job_id: &JobId) -> bool {
        self.job_id.as_ref() == Some(job_id)
    }
}

/// The one open subscription.
struct ActiveSubscription {
    job_id: JobId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Keeps one view in sync with the status channel of its job.
pub struct SubscriptionManager {
    source: Arc<dyn StatusSource>,
    current: Option<ActiveSubscription>,
    latest: Arc<watch::Sender<StatusSnapshot>>,
}

impl SubscriptionManager {
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        let (latest, _) = watch::channel(StatusSnapshot::default());
        Self {
            source,
            current: None,
            latest: Arc::new(latest),
        }
    }

    /// Point the manager at `job_id`.
    ///
    /// The same job again is a no-op. Anything else closes the current
    /// channel first; an absent or empty id leaves nothing open. A malformed
    /// id is refused before the current channel is touched.
    pub async fn set_job(&mut self, job_id: Option<&str>) -> Result<(), ClientError> {
        match job_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(raw) => {
                let job_id = JobId::parse(raw)?;
                self.activate(job_id).await;
            }
            None => self.deactivate().await,
        }
        Ok(())
    }

    /// Open a channel for `job_id`, replacing any other.
    ///
    /// Returns once the previous channel's task has finished, so nothing it
    /// received can surface after the switch.
    pub async fn activate(&mut self, job_id: JobId) {
        if self.current_job() == Some(&job_id) {
            return;
        }
        self.deactivate().await;

        self.latest.send_replace(StatusSnapshot::selected(job_id.clone()));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_subscription(
            Arc::clone(&self.source),
            job_id.clone(),
            Arc::clone(&self.latest),
            cancel.clone(),
        ));

        tracing::debug!(job_id = %job_id, "Subscription activated");
        self.current = Some(ActiveSubscription {
            job_id,
            cancel,
            task,
        });
    }

    /// Close the current channel, if any, and clear the latest status.
    pub async fn deactivate(&mut self) {
        let Some(active) = self.current.take() else {
            return;
        };
        active.cancel.cancel();
        if let Err(e) = active.task.await {
            tracing::error!(job_id = %active.job_id, error = %e, "Subscription task failed");
        }
        self.latest.send_replace(StatusSnapshot::default());
        tracing::debug!(job_id = %active.job_id, "Subscription deactivated");
    }

    pub fn current_job(&self) -> Option<&JobId> {
        self.current.as_ref().map(|active| &active.job_id)
    }

    pub fn latest(&self) -> StatusSnapshot {
        self.latest.borrow().clone()
    }

    /// Receiver that is notified on every status change.
    pub fn watch(&self) -> watch::Receiver<StatusSnapshot> {
        self.latest.subscribe()
    }

    /// Text for the status line: the status name, or [`PLACEHOLDER_STATUS`]
    /// until the first event arrives.
    pub fn status_text(&self) -> String {
        self.latest
            .borrow()
            .status
            .as_ref()
            .map_or_else(|| PLACEHOLDER_STATUS.to_string(), |e| e.status.to_string())
    }

    /// Result url, once the job is complete.
    pub fn video_url(&self) -> Option<String> {
        let latest = self.latest.borrow();
        latest
            .status
            .as_ref()
            .filter(|e| e.status == JobStatus::Complete)
            .and_then(|e| e.url.clone())
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        // Cannot await here; the task still closes its channel on the way out.
        if let Some(active) = self.current.take() {
            active.cancel.cancel();
        }
    }
}

/// Body of the per-channel task.
async fn run_subscription(
    source: Arc<dyn StatusSource>,
    job_id: JobId,
    latest: Arc<watch::Sender<StatusSnapshot>>,
    cancel: CancellationToken,
) {
    let opened = tokio::select! {
        _ = cancel.cancelled() => return,
        opened = source.open(&job_id) => opened,
    };
    let mut channel = match opened {
        Ok(channel) => channel,
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "Could not open status channel");
            mark_ended(&latest, &job_id);
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = channel.next() => match next {
                Some(Ok(event)) => {
                    let terminal = event.is_terminal();
                    tracing::debug!(job_id = %job_id, status = %event.status, "Status received");
                    latest.send_if_modified(|snapshot| {
                        if !snapshot.is_for(&job_id) {
                            return false;
                        }
                        snapshot.status = Some(event);
                        true
                    });
                    if terminal {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Status channel failed");
                    break;
                }
                None => {
                    tracing::debug!(job_id = %job_id, "Status channel closed by server");
                    break;
                }
            },
        }
    }

    channel.close().await;
    mark_ended(&latest, &job_id);
}

fn mark_ended(latest: &watch::Sender<StatusSnapshot>, job_id: &JobId) {
    latest.send_if_modified(|snapshot| {
        if !snapshot.is_for(job_id) || snapshot.ended {
            return false;
        }
        snapshot.ended = true;
        true
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::source::StatusChannel;

    const STEP: Duration = Duration::from_secs(5);

    /// Source whose channels are fed by the test.
    #[derive(Default)]
    struct FakeSource {
        pending: Mutex<HashMap<JobId, mpsc::UnboundedReceiver<StatusEvent>>>,
        opens: AtomicUsize,
        closes: Arc<Mutex<HashMap<JobId, usize>>>,
    }

    impl FakeSource {
        /// Prepare a channel for `job_id` and return its feeding end.
        fn feed(&self, job_id: &str) -> mpsc::UnboundedSender<StatusEvent> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.pending.lock().unwrap().insert(job(job_id), rx);
            tx
        }

        fn closes(&self, job_id: &str) -> usize {
            self.closes
                .lock()
                .unwrap()
                .get(&job(job_id))
                .copied()
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl StatusSource for FakeSource {
        async fn open(&self, job_id: &JobId) -> Result<Box<dyn StatusChannel>, ClientError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let events = self
                .pending
                .lock()
                .unwrap()
                .remove(job_id)
                .ok_or_else(|| ClientError::Connection(format!("no channel for {job_id}")))?;
            Ok(Box::new(FakeChannel {
                job_id: job_id.clone(),
                events,
                closes: Arc::clone(&self.closes),
            }))
        }
    }

    struct FakeChannel {
        job_id: JobId,
        events: mpsc::UnboundedReceiver<StatusEvent>,
        closes: Arc<Mutex<HashMap<JobId, usize>>>,
    }

    #[async_trait]
    impl StatusChannel for FakeChannel {
        async fn next(&mut self) -> Option<Result<StatusEvent, ClientError>> {
            self.events.recv().await.map(Ok)
        }

        async fn close(&mut self) {
            *self
                .closes
                .lock()
                .unwrap()
                .entry(self.job_id.clone())
                .or_default() += 1;
        }
    }

    fn job(id: &str) -> JobId {
        JobId::parse(id).unwrap()
    }

    fn manager() -> (Arc<FakeSource>, SubscriptionManager) {
        let source = Arc::new(FakeSource::default());
        let manager = SubscriptionManager::new(source.clone());
        (source, manager)
    }

    async fn wait_for(
        rx: &mut watch::Receiver<StatusSnapshot>,
        check: impl FnMut(&StatusSnapshot) -> bool,
    ) {
        tokio::time::timeout(STEP, rx.wait_for(check))
            .await
            .expect("timed out waiting for snapshot")
            .expect("manager dropped");
    }

    /// Wait until the manager's task has opened `n` channels in total.
    async fn opened(source: &FakeSource, n: usize) {
        let deadline = tokio::time::Instant::now() + STEP;
        while source.opens.load(Ordering::SeqCst) < n {
            assert!(tokio::time::Instant::now() < deadline, "channel never opened");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn absent_or_empty_job_opens_nothing() {
        let (source, mut manager) = manager();

        manager.set_job(None).await.unwrap();
        manager.set_job(Some("")).await.unwrap();
        manager.set_job(Some("   ")).await.unwrap();

        assert_eq!(source.opens.load(Ordering::SeqCst), 0);
        assert_eq!(manager.current_job(), None);
        assert_eq!(manager.status_text(), PLACEHOLDER_STATUS);
    }

    #[tokio::test]
    async fn malformed_job_is_refused_without_touching_current() {
        let (source, mut manager) = manager();
        let _tx = source.feed("job-1");
        manager.set_job(Some("job-1")).await.unwrap();

        let result = manager.set_job(Some("not a job id")).await;

        assert!(matches!(result, Err(ClientError::InvalidJobId(_))));
        assert_eq!(manager.current_job(), Some(&job("job-1")));
        assert_eq!(source.closes("job-1"), 0);
    }

    #[tokio::test]
    async fn placeholder_until_first_event() {
        let (source, mut manager) = manager();
        let tx = source.feed("job-1");
        let mut rx = manager.watch();

        manager.set_job(Some("job-1")).await.unwrap();
        assert_eq!(manager.status_text(), PLACEHOLDER_STATUS);

        tx.send(StatusEvent::queued()).unwrap();
        wait_for(&mut rx, |s| s.status.is_some()).await;

        assert_eq!(manager.status_text(), "queued");
        assert_eq!(manager.video_url(), None);
    }

    #[tokio::test]
    async fn latest_event_wins() {
        let (source, mut manager) = manager();
        let tx = source.feed("job-1");
        let mut rx = manager.watch();
        manager.set_job(Some("job-1")).await.unwrap();

        tx.send(StatusEvent::queued()).unwrap();
        tx.send(StatusEvent::rendering()).unwrap();
        wait_for(&mut rx, |s| s.status == Some(StatusEvent::rendering())).await;

        assert_eq!(manager.status_text(), "rendering");
    }

    #[tokio::test]
    async fn terminal_event_exposes_url_and_closes_once() {
        let (source, mut manager) = manager();
        let tx = source.feed("job-1");
        let mut rx = manager.watch();
        manager.set_job(Some("job-1")).await.unwrap();

        let url = "https://cdn.example.com/v/job-1.mp4";
        tx.send(StatusEvent::complete(url)).unwrap();
        wait_for(&mut rx, |s| s.ended).await;

        assert_eq!(manager.video_url().as_deref(), Some(url));
        assert_eq!(source.closes("job-1"), 1);

        // Leaving the view afterwards does not close it a second time.
        manager.deactivate().await;
        assert_eq!(source.closes("job-1"), 1);
    }

    #[tokio::test]
    async fn same_job_twice_keeps_one_channel() {
        let (source, mut manager) = manager();
        let _tx = source.feed("job-1");

        manager.set_job(Some("job-1")).await.unwrap();
        opened(&source, 1).await;
        manager.set_job(Some("job-1")).await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(source.opens.load(Ordering::SeqCst), 1);
        assert_eq!(source.closes("job-1"), 0);
    }

    #[tokio::test]
    async fn switching_jobs_closes_previous_channel_first() {
        let (source, mut manager) = manager();
        let old_tx = source.feed("job-a");
        let _new_tx = source.feed("job-b");
        let mut rx = manager.watch();

        manager.set_job(Some("job-a")).await.unwrap();
        old_tx.send(StatusEvent::queued()).unwrap();
        wait_for(&mut rx, |s| s.status.is_some()).await;

        manager.set_job(Some("job-b")).await.unwrap();

        assert_eq!(source.closes("job-a"), 1);
        assert_eq!(manager.current_job(), Some(&job("job-b")));
        let snapshot = manager.latest();
        assert_eq!(snapshot.job_id, Some(job("job-b")));
        assert_eq!(snapshot.status, None);

        // The old channel is gone; nothing it would have said can surface.
        assert!(old_tx.send(StatusEvent::rendering()).is_err());
        tokio::task::yield_now().await;
        assert_eq!(manager.latest().status, None);
    }

    #[tokio::test]
    async fn deactivate_closes_and_clears() {
        let (source, mut manager) = manager();
        let _tx = source.feed("job-1");
        manager.set_job(Some("job-1")).await.unwrap();
        opened(&source, 1).await;

        manager.set_job(None).await.unwrap();

        assert_eq!(source.closes("job-1"), 1);
        assert_eq!(manager.current_job(), None);
        assert_eq!(manager.latest(), StatusSnapshot::default());

        manager.deactivate().await;
        assert_eq!(source.closes("job-1"), 1);
    }

    #[tokio::test]
    async fn dropping_manager_closes_channel() {
        let (source, mut manager) = manager();
        let tx = source.feed("job-1");
        let mut rx = manager.watch();
        manager.set_job(Some("job-1")).await.unwrap();
        tx.send(StatusEvent::queued()).unwrap();
        wait_for(&mut rx, |s| s.status.is_some()).await;

        drop(manager);

        let deadline = tokio::time::Instant::now() + STEP;
        while source.closes("job-1") == 0 {
            assert!(tokio::time::Instant::now() < deadline, "channel never closed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(source.closes("job-1"), 1);
    }

    #[tokio::test]
    async fn open_failure_marks_snapshot_ended() {
        let (source, mut manager) = manager();
        let mut rx = manager.watch();

        manager.set_job(Some("job-missing")).await.unwrap();
        wait_for(&mut rx, |s| s.ended).await;

        assert_eq!(source.opens.load(Ordering::SeqCst), 1);
        assert_eq!(source.closes("job-missing"), 0);
        assert_eq!(manager.status_text(), PLACEHOLDER_STATUS);
    }
}
