//! In-memory source and destination services.
//!
//! Used by `--simulation` runs and by the test suite. Behaviour is scripted
//! per destination file name so a test can make one file fail, hang, or
//! finish late while its siblings succeed.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

use crate::core::models::{FetchUrl, JobHandle, file_name};
use crate::destination::{DestinationService, RemoteJobStatus, SaveUrlResponse};
use crate::error::ServiceError;
use crate::source::{ListPage, ObjectStore};

const URL_SCHEME: &str = "sim://";

/// Object store backed by a sorted map, paging like S3.
pub struct SimulatedObjectStore {
    bucket: String,
    objects: BTreeMap<String, Vec<u8>>,
    page_size: usize,
    fail_page: Option<usize>,
    signatures: AtomicU64,
}

impl SimulatedObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: BTreeMap::new(),
            page_size: 1000,
            fail_page: None,
            signatures: AtomicU64::new(0),
        }
    }

    /// A store holding `count` small objects under `prefix/`.
    pub fn demo(prefix: &str, count: usize) -> Self {
        let prefix = prefix.trim_end_matches('/');
        (0..count).fold(Self::new("simulated"), |store, i| {
            store.with_object(
                format!("{}/file-{:04}.dat", prefix, i),
                format!("simulated payload {}", i).into_bytes(),
            )
        })
    }

    pub fn with_object(mut self, key: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.objects.insert(key.into(), data.into());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make the given 1-based listing page fail.
    pub fn fail_on_page(mut self, page: usize) -> Self {
        self.fail_page = Some(page);
        self
    }

    /// Resolve a URL from `presign_get` back to the object's bytes.
    pub fn resolve(&self, url: &FetchUrl) -> Option<&[u8]> {
        let rest = url
            .expose()
            .strip_prefix(URL_SCHEME)?
            .strip_prefix(self.bucket.as_str())?
            .strip_prefix('/')?;
        let key = rest.split_once('?').map_or(rest, |(key, _)| key);
        self.objects.get(key).map(Vec::as_slice)
    }
}

#[async_trait]
impl ObjectStore for SimulatedObjectStore {
    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, ServiceError> {
        // Token format: "{page}:{last key of previous page}"
        let (page, after) = match continuation_token.as_deref() {
            None => (1, None),
            Some(token) => {
                let (page, after) = token
                    .split_once(':')
                    .ok_or_else(|| ServiceError::Other(format!("bad continuation token {}", token)))?;
                let page: usize = page
                    .parse()
                    .map_err(|_| ServiceError::Other(format!("bad continuation token {}", token)))?;
                (page, Some(after.to_string()))
            }
        };

        if self.fail_page == Some(page) {
            return Err(ServiceError::Transport(format!("page {} unavailable", page)));
        }

        let mut keys: Vec<String> = self
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| after.as_ref().is_none_or(|a| k.as_str() > a.as_str()))
            .take(self.page_size + 1)
            .cloned()
            .collect();

        let continuation_token = if keys.len() > self.page_size {
            keys.truncate(self.page_size);
            keys.last().map(|last| format!("{}:{}", page + 1, last))
        } else {
            None
        };

        Ok(ListPage {
            keys,
            continuation_token,
        })
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<FetchUrl, ServiceError> {
        let sig = self.signatures.fetch_add(1, Ordering::Relaxed);
        Ok(FetchUrl::new(format!(
            "{}{}/{}?expires={}&sig={}",
            URL_SCHEME,
            self.bucket,
            key,
            expires_in.as_secs(),
            sig
        )))
    }
}

/// How the simulated destination treats one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Report in-progress this many times, then complete.
    CompleteAfter(u32),
    /// `save_url` completes synchronously, no job handle.
    Immediate,
    /// Reject the submission outright.
    RejectSubmit(ServiceError),
    /// Report in-progress this many times, then fail with the reason.
    FailAfter(u32, String),
    /// Report in-progress forever.
    Never,
    /// The status endpoint itself errors.
    StatusError(ServiceError),
}

/// Calls observed by the simulated destination, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationEvent {
    Submit(String),
    Poll(String),
    Finished(String),
}

struct SimJob {
    name: String,
    script: Script,
    polls: u32,
}

#[derive(Default)]
struct DestinationState {
    folders: Vec<String>,
    paths: Vec<String>,
    jobs: HashMap<String, SimJob>,
    next_job: u64,
    in_flight: usize,
    max_in_flight: usize,
    polls: HashMap<String, u32>,
    events: Vec<DestinationEvent>,
}

pub struct SimulatedDestination {
    default_script: Script,
    scripts: HashMap<String, Script>,
    folder_error: Option<ServiceError>,
    latency: Duration,
    state: Mutex<DestinationState>,
}

impl Default for SimulatedDestination {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDestination {
    /// Every file completes on its first status check.
    pub fn new() -> Self {
        Self {
            default_script: Script::CompleteAfter(0),
            scripts: HashMap::new(),
            folder_error: None,
            latency: Duration::ZERO,
            state: Mutex::new(DestinationState::default()),
        }
    }

    pub fn with_default(mut self, script: Script) -> Self {
        self.default_script = script;
        self
    }

    /// Script the file whose destination name is `name`.
    pub fn with_script(mut self, name: impl Into<String>, script: Script) -> Self {
        self.scripts.insert(name.into(), script);
        self
    }

    pub fn failing_folder_creation(mut self, error: ServiceError) -> Self {
        self.folder_error = Some(error);
        self
    }

    /// Delay added to every API call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn folders(&self) -> Vec<String> {
        self.lock().folders.clone()
    }

    pub fn events(&self) -> Vec<DestinationEvent> {
        self.lock().events.clone()
    }

    /// Status checks made for the file named `name`.
    pub fn polls_for(&self, name: &str) -> u32 {
        self.lock().polls.get(name).copied().unwrap_or(0)
    }

    pub fn total_polls(&self) -> u32 {
        self.lock().polls.values().sum()
    }

    /// Highest number of jobs that were accepted but not yet finished.
    pub fn max_in_flight(&self) -> usize {
        self.lock().max_in_flight
    }

    fn lock(&self) -> MutexGuard<'_, DestinationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn script_for(&self, name: &str) -> Script {
        self.scripts
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_script.clone())
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl DestinationService for SimulatedDestination {
    async fn create_folder(&self, path: &str) -> Result<(), ServiceError> {
        self.delay().await;
        if let Some(err) = &self.folder_error {
            return Err(err.clone());
        }

        let mut state = self.lock();
        if state.folders.iter().any(|f| f == path) {
            return Err(ServiceError::Conflict(format!("path/conflict/folder {}", path)));
        }
        state.folders.push(path.to_string());
        Ok(())
    }

    async fn save_url(&self, path: &str, _url: &FetchUrl) -> Result<SaveUrlResponse, ServiceError> {
        self.delay().await;
        let name = file_name(path).to_string();
        let script = self.script_for(&name);

        let mut state = self.lock();
        state.events.push(DestinationEvent::Submit(name.clone()));

        let parent = path.rsplit_once('/').map_or("", |(parent, _)| parent);
        if !state.folders.iter().any(|f| f == parent) {
            return Err(ServiceError::NotFound(format!("path/not_found {}", parent)));
        }
        if state.paths.iter().any(|p| p == path) {
            return Err(ServiceError::Conflict(format!("path/conflict/file {}", path)));
        }

        match script {
            Script::RejectSubmit(err) => Err(err),
            Script::Immediate => {
                state.paths.push(path.to_string());
                state.events.push(DestinationEvent::Finished(name));
                Ok(SaveUrlResponse::Complete)
            }
            script => {
                state.paths.push(path.to_string());
                state.next_job += 1;
                let id = format!("job-{}", state.next_job);
                state.jobs.insert(
                    id.clone(),
                    SimJob {
                        name,
                        script,
                        polls: 0,
                    },
                );
                state.in_flight += 1;
                state.max_in_flight = state.max_in_flight.max(state.in_flight);
                Ok(SaveUrlResponse::Started(JobHandle(id)))
            }
        }
    }

    async fn check_job_status(&self, handle: &JobHandle) -> Result<RemoteJobStatus, ServiceError> {
        self.delay().await;
        let mut state = self.lock();

        let (name, status) = {
            let job = state
                .jobs
                .get_mut(&handle.0)
                .ok_or_else(|| ServiceError::NotFound(format!("unknown job {}", handle)))?;
            job.polls += 1;
            let status = match &job.script {
                Script::CompleteAfter(n) if job.polls > *n => Ok(RemoteJobStatus::Complete),
                Script::FailAfter(n, reason) if job.polls > *n => {
                    Ok(RemoteJobStatus::Failed(reason.clone()))
                }
                Script::StatusError(err) => Err(err.clone()),
                _ => Ok(RemoteJobStatus::InProgress),
            };
            (job.name.clone(), status)
        };

        *state.polls.entry(name.clone()).or_default() += 1;
        state.events.push(DestinationEvent::Poll(name.clone()));

        if matches!(
            status,
            Ok(RemoteJobStatus::Complete | RemoteJobStatus::Failed(_)) | Err(_)
        ) {
            state.jobs.remove(&handle.0);
            state.in_flight = state.in_flight.saturating_sub(1);
            state.events.push(DestinationEvent::Finished(name));
        }

        status
    }
}
