//! Bounded-concurrency driver for save-by-url transfers.
//!
//! Each admitted item runs end to end on its own task: submit, then poll the
//! remote job until it completes, fails, or exhausts its poll budget. A
//! semaphore caps how many items hold a slot at once, and items are admitted
//! in input order. Outcomes are appended to the report as jobs finish.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use super::models::{
    DestinationContainer, JobState, Outcome, ReportEntry, RunReport, TransferItem, TransferJob,
};
use super::progress::ProgressTracker;
use crate::destination::{DestinationService, RemoteJobStatus, SaveUrlResponse};
use crate::error::{OrchestratorError, PollError, SubmitError};
use crate::logging::LogThrottle;

pub const DEFAULT_CONCURRENCY_LIMIT: usize = 20;

const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// How long to keep asking about one remote job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_polls: 1800,
        }
    }
}

pub struct TransferOrchestrator {
    destination: Arc<dyn DestinationService>,
    policy: PollPolicy,
    progress: ProgressTracker,
    cancel: CancellationToken,
}

impl TransferOrchestrator {
    pub fn new(destination: Arc<dyn DestinationService>, policy: PollPolicy) -> Self {
        Self {
            destination,
            policy,
            progress: ProgressTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    /// Once `cancel` fires, no further items are admitted. Jobs already
    /// holding a slot run to a terminal state.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Transfer every item into `container`, at most `concurrency_limit` at a
    /// time. Item failures are recorded in the report, never returned.
    pub async fn run(
        &self,
        items: Vec<TransferItem>,
        container: &DestinationContainer,
        concurrency_limit: usize,
    ) -> Result<RunReport, OrchestratorError> {
        if concurrency_limit == 0 {
            return Err(OrchestratorError::ZeroConcurrency);
        }

        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(concurrency_limit));
        let sink = ReportSink::default();
        let throttle = Arc::new(LogThrottle::new(PROGRESS_LOG_INTERVAL));
        let mut workers = JoinSet::new();
        let mut keys_by_task = HashMap::new();
        let mut pending = items.into_iter();

        info!(
            container = %container.path(),
            items = total,
            concurrency_limit,
            "Starting transfers"
        );

        while let Some(item) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    Some(permit.map_err(|_| OrchestratorError::PoolClosed)?)
                }
            };

            let Some(permit) = permit else {
                let skipped = 1 + pending.len();
                warn!(skipped, "Run cancelled, not admitting remaining items");
                for item in std::iter::once(item).chain(pending.by_ref()) {
                    sink.push(ReportEntry::new(item.source_key, Outcome::Skipped, 0))
                        .await;
                }
                break;
            };

            let key = item.source_key.clone();
            let span = info_span!("transfer", source_key = %key);
            let destination = Arc::clone(&self.destination);
            let policy = self.policy;
            let progress = self.progress.clone();
            let job_sink = sink.clone();
            let throttle = Arc::clone(&throttle);

            let handle = workers.spawn(
                async move {
                    let entry = drive(destination.as_ref(), item, policy, &progress).await;
                    let done = job_sink.push(entry).await;
                    if throttle.should_log() {
                        let in_flight = progress.active_count().await;
                        info!(completed = done, total, in_flight, "Transfer progress");
                    }
                    drop(permit);
                }
                .instrument(span),
            );
            keys_by_task.insert(handle.id(), key);

            while let Some(joined) = workers.try_join_next() {
                self.reap(joined, &keys_by_task, &sink).await;
            }
        }

        while let Some(joined) = workers.join_next().await {
            self.reap(joined, &keys_by_task, &sink).await;
        }

        let report = sink.into_report().await;
        info!(
            total = report.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            timed_out = report.timed_out(),
            skipped = report.skipped(),
            "Transfers finished"
        );
        Ok(report)
    }

    /// Record a failure for a worker task that panicked before reporting.
    async fn reap(
        &self,
        joined: Result<(), JoinError>,
        keys_by_task: &HashMap<tokio::task::Id, String>,
        sink: &ReportSink,
    ) {
        let Err(err) = joined else {
            return;
        };
        let Some(key) = keys_by_task.get(&err.id()) else {
            return;
        };

        warn!(source_key = %key, error = %err, "Transfer worker crashed");
        self.progress.remove(key).await;
        sink.push(ReportEntry::new(
            key.clone(),
            Outcome::Failure {
                reason: format!("worker crashed: {}", err),
            },
            0,
        ))
        .await;
    }
}

/// Run one item through submit and poll to a terminal state.
async fn drive(
    destination: &dyn DestinationService,
    item: TransferItem,
    policy: PollPolicy,
    progress: &ProgressTracker,
) -> ReportEntry {
    let key = item.source_key.clone();
    let mut job = TransferJob::new(item);
    progress.update(&key, JobState::Pending).await;

    submit_and_poll(destination, &mut job, policy, progress).await;
    progress.remove(&key).await;

    match &job.outcome {
        Some(Outcome::Success) => {
            info!(polls = job.attempts_polled, path = %job.item.destination_path, "Transfer complete");
        }
        Some(outcome) => {
            warn!(polls = job.attempts_polled, outcome = %outcome, "Transfer did not complete");
        }
        None => {}
    }

    ReportEntry::from(job)
}

async fn submit_and_poll(
    destination: &dyn DestinationService,
    job: &mut TransferJob,
    policy: PollPolicy,
    progress: &ProgressTracker,
) {
    let key = job.item.source_key.clone();

    let submitted = destination
        .save_url(&job.item.destination_path, &job.item.fetch_url)
        .await
        .map_err(SubmitError::from);

    let handle = match submitted {
        Ok(SaveUrlResponse::Started(handle)) => handle,
        Ok(SaveUrlResponse::Complete) => {
            debug!("Destination saved the file synchronously");
            job.succeed();
            return;
        }
        Err(err) => {
            job.fail(err.to_string());
            return;
        }
    };

    debug!(job = %handle, "Submitted");
    job.submitted(handle.clone());
    progress.update(&key, JobState::Submitted).await;

    job.polling();
    progress.update(&key, JobState::Polling).await;

    while job.attempts_polled < policy.max_polls {
        job.attempts_polled += 1;

        match destination.check_job_status(&handle).await {
            Ok(RemoteJobStatus::Complete) => {
                job.succeed();
                return;
            }
            Ok(RemoteJobStatus::Failed(reason)) => {
                job.fail(PollError::RemoteFailure(reason).to_string());
                return;
            }
            Err(err) => {
                job.fail(PollError::from(err).to_string());
                return;
            }
            Ok(RemoteJobStatus::InProgress) => {}
        }

        if job.attempts_polled < policy.max_polls {
            sleep(policy.interval).await;
        }
    }

    // The remote job is left running; we only stop tracking it.
    job.time_out();
}

/// Append-only, completion-ordered collection of report entries.
#[derive(Clone, Default)]
struct ReportSink {
    entries: Arc<Mutex<Vec<ReportEntry>>>,
}

impl ReportSink {
    /// Returns how many entries have been recorded so far.
    async fn push(&self, entry: ReportEntry) -> usize {
        let mut entries = self.entries.lock().await;
        entries.push(entry);
        entries.len()
    }

    async fn into_report(self) -> RunReport {
        let mut entries = self.entries.lock().await;
        RunReport {
            entries: std::mem::take(&mut *entries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::simulated::{Script, SimulatedDestination};
    use crate::core::models::FetchUrl;
    use crate::error::ServiceError;

    fn fast_policy(max_polls: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            max_polls,
        }
    }

    async fn job_for(dest: &SimulatedDestination, key: &str) -> TransferJob {
        dest.create_folder("/f").await.ok();
        let container = DestinationContainer::new("/f");
        TransferJob::new(TransferItem::new(key, FetchUrl::new("sim://b/k"), &container))
    }

    #[tokio::test]
    async fn submit_rejection_skips_polling() {
        let dest = SimulatedDestination::new().with_script(
            "bad.txt",
            Script::RejectSubmit(ServiceError::Other("invalid_url".to_string())),
        );
        let mut job = job_for(&dest, "a/bad.txt").await;

        submit_and_poll(&dest, &mut job, fast_policy(5), &ProgressTracker::new()).await;

        assert_eq!(job.state, JobState::Failed);
        assert!(job.remote_job_handle.is_none());
        assert_eq!(job.attempts_polled, 0);
        assert_eq!(dest.polls_for("bad.txt"), 0);
    }

    #[tokio::test]
    async fn status_error_fails_the_job() {
        let dest = SimulatedDestination::new().with_script(
            "x.txt",
            Script::StatusError(ServiceError::Transport("reset".to_string())),
        );
        let mut job = job_for(&dest, "a/x.txt").await;

        submit_and_poll(&dest, &mut job, fast_policy(5), &ProgressTracker::new()).await;

        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts_polled, 1);
        match job.outcome {
            Some(Outcome::Failure { reason }) => assert!(reason.contains("reset")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn immediate_completion_needs_no_polls() {
        let dest = SimulatedDestination::new().with_default(Script::Immediate);
        let mut job = job_for(&dest, "a/now.txt").await;

        submit_and_poll(&dest, &mut job, fast_policy(5), &ProgressTracker::new()).await;

        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.attempts_polled, 0);
    }

    #[tokio::test]
    async fn zero_concurrency_is_rejected() {
        let orchestrator =
            TransferOrchestrator::new(Arc::new(SimulatedDestination::new()), fast_policy(1));
        let result = orchestrator
            .run(Vec::new(), &DestinationContainer::new("/f"), 0)
            .await;
        assert!(matches!(result, Err(OrchestratorError::ZeroConcurrency)));
    }

    #[tokio::test]
    async fn report_sink_keeps_push_order() {
        let sink = ReportSink::default();
        assert_eq!(sink.push(ReportEntry::new("b", Outcome::Success, 1)).await, 1);
        assert_eq!(sink.push(ReportEntry::new("a", Outcome::Timeout, 2)).await, 2);

        let report = sink.into_report().await;
        let keys: Vec<_> = report.entries.iter().map(|e| e.source_key.as_str()).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }
}
