use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// A time-limited, capability-bearing URL. Debug output never shows it.
#[derive(Clone, PartialEq, Eq)]
pub struct FetchUrl(String);

impl FetchUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FetchUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FetchUrl(***)")
    }
}

/// Opaque token for a long-running destination-side job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(pub String);

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The per-run destination folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationContainer {
    path: String,
}

impl DestinationContainer {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn join(&self, name: &str) -> String {
        format!("{}/{}", self.path.trim_end_matches('/'), name)
    }
}

/// One unit of work: a source object and where it lands.
#[derive(Debug, Clone)]
pub struct TransferItem {
    pub source_key: String,
    pub fetch_url: FetchUrl,
    pub destination_path: String,
}

impl TransferItem {
    /// The destination path is the key's final segment under the container.
    pub fn new(
        source_key: impl Into<String>,
        fetch_url: FetchUrl,
        container: &DestinationContainer,
    ) -> Self {
        let source_key = source_key.into();
        let destination_path = container.join(file_name(&source_key));
        Self {
            source_key,
            fetch_url,
            destination_path,
        }
    }
}

/// Final path segment of an object key.
pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Submitted,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::TimedOut)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure { reason: String },
    Timeout,
    /// Never admitted because the run was cancelled.
    Skipped,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("success"),
            Outcome::Failure { reason } => write!(f, "failed: {}", reason),
            Outcome::Timeout => f.write_str("timed out"),
            Outcome::Skipped => f.write_str("skipped"),
        }
    }
}

/// Runtime state of one transfer, owned by the worker driving it.
#[derive(Debug)]
pub struct TransferJob {
    pub item: TransferItem,
    pub remote_job_handle: Option<JobHandle>,
    pub state: JobState,
    pub attempts_polled: u32,
    pub outcome: Option<Outcome>,
}

impl TransferJob {
    pub fn new(item: TransferItem) -> Self {
        Self {
            item,
            remote_job_handle: None,
            state: JobState::Pending,
            attempts_polled: 0,
            outcome: None,
        }
    }

    pub fn submitted(&mut self, handle: JobHandle) {
        self.remote_job_handle = Some(handle);
        self.state = JobState::Submitted;
    }

    pub fn polling(&mut self) {
        self.state = JobState::Polling;
    }

    pub fn succeed(&mut self) {
        self.finish(JobState::Succeeded, Outcome::Success);
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.finish(
            JobState::Failed,
            Outcome::Failure {
                reason: reason.into(),
            },
        );
    }

    pub fn time_out(&mut self) {
        self.finish(JobState::TimedOut, Outcome::Timeout);
    }

    fn finish(&mut self, state: JobState, outcome: Outcome) {
        debug_assert!(!self.state.is_terminal(), "job finished twice");
        self.state = state;
        self.outcome = Some(outcome);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub source_key: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub polls: u32,
    pub completed_at: DateTime<Utc>,
}

impl ReportEntry {
    pub fn new(source_key: impl Into<String>, outcome: Outcome, polls: u32) -> Self {
        Self {
            source_key: source_key.into(),
            outcome,
            polls,
            completed_at: Utc::now(),
        }
    }
}

impl From<TransferJob> for ReportEntry {
    fn from(job: TransferJob) -> Self {
        let outcome = job.outcome.unwrap_or_else(|| Outcome::Failure {
            reason: "job ended without an outcome".to_string(),
        });
        ReportEntry::new(job.item.source_key, outcome, job.attempts_polled)
    }
}

/// Outcomes of one run, in completion order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub entries: Vec<ReportEntry>,
}

impl RunReport {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, source_key: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.source_key == source_key)
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Success))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failure { .. }))
    }

    pub fn timed_out(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Timeout))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped))
    }

    pub fn all_succeeded(&self) -> bool {
        self.entries.iter().all(|e| e.outcome.is_success())
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_path_uses_final_segment() {
        let container = DestinationContainer::new("/0123456789");
        let item =
            TransferItem::new("photos/2024/img.jpg", FetchUrl::new("https://x"), &container);
        assert_eq!(item.destination_path, "/0123456789/img.jpg");
    }

    #[test]
    fn container_join_handles_trailing_slash() {
        let container = DestinationContainer::new("/backups/42/");
        assert_eq!(container.join("a.txt"), "/backups/42/a.txt");
    }

    #[test]
    fn fetch_url_debug_is_redacted() {
        let url = FetchUrl::new("https://bucket.s3.amazonaws.com/k?X-Amz-Signature=abc");
        assert_eq!(format!("{:?}", url), "FetchUrl(***)");
    }

    #[test]
    fn job_lifecycle_reaches_one_terminal_state() {
        let container = DestinationContainer::new("/f");
        let item = TransferItem::new("a/1.txt", FetchUrl::new("u"), &container);
        let mut job = TransferJob::new(item);
        assert_eq!(job.state, JobState::Pending);

        job.submitted(JobHandle("job-1".to_string()));
        assert_eq!(job.state, JobState::Submitted);
        job.polling();
        job.attempts_polled = 2;
        job.succeed();

        assert!(job.state.is_terminal());
        let entry = ReportEntry::from(job);
        assert_eq!(entry.outcome, Outcome::Success);
        assert_eq!(entry.polls, 2);
    }

    #[test]
    fn report_counts_by_outcome() {
        let report = RunReport {
            entries: vec![
                ReportEntry::new("a", Outcome::Success, 1),
                ReportEntry::new("b", Outcome::Timeout, 3),
                ReportEntry::new(
                    "c",
                    Outcome::Failure {
                        reason: "nope".to_string(),
                    },
                    0,
                ),
            ],
        };
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.timed_out(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.all_succeeded());
        assert_eq!(report.get("b").map(|e| e.polls), Some(3));
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let entry = ReportEntry::new(
            "k",
            Outcome::Failure {
                reason: "download_failed".to_string(),
            },
            4,
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["reason"], "download_failed");
        assert_eq!(json["polls"], 4);
    }
}
