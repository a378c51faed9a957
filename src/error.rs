//! Error types for pullsync.
//!
//! Run-level errors (`ListError`, `SignError`, `ProvisionError`) abort a run.
//! Per-item errors (`SubmitError`, `PollError`) never leave the orchestrator;
//! they are folded into the item's outcome.

use thiserror::Error;

/// Failure reported by a remote service (object store or destination).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}

/// Listing failed on one of the result pages. Earlier pages are discarded.
#[derive(Debug, Error)]
#[error("listing {prefix:?} failed on page {page}: {source}")]
pub struct ListError {
    pub prefix: String,
    pub page: usize,
    #[source]
    pub source: ServiceError,
}

#[derive(Debug, Error)]
#[error("failed to sign URL for {key}: {source}")]
pub struct SignError {
    pub key: String,
    #[source]
    pub source: ServiceError,
}

#[derive(Debug, Error)]
#[error("failed to create destination folder {path}: {source}")]
pub struct ProvisionError {
    pub path: String,
    #[source]
    pub source: ServiceError,
}

/// The destination rejected a save-by-url submission outright.
#[derive(Debug, Error)]
#[error("submit rejected: {0}")]
pub struct SubmitError(#[from] pub ServiceError);

/// A job status query failed, or the remote job reported failure.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("status check failed: {0}")]
    Service(#[from] ServiceError),

    #[error("remote job failed: {0}")]
    RemoteFailure(String),
}

/// The orchestrator could not set up its worker pool.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("concurrency limit must be at least 1")]
    ZeroConcurrency,

    #[error("worker pool closed unexpectedly")]
    PoolClosed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

/// Fatal errors that abort a run before a report exists.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    List(#[from] ListError),

    #[error(transparent)]
    Sign(#[from] SignError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}
