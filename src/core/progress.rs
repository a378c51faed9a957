//! In-memory tracking of in-flight transfers.
//!
//! Workers record each state transition here while a job is live and remove
//! the entry once it reaches a terminal state. Nothing is persisted.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::models::JobState;

/// Shared map of source key to the current state of its transfer.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<RwLock<HashMap<String, JobState>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn update(&self, source_key: &str, state: JobState) {
        let mut map = self.inner.write().await;
        map.insert(source_key.to_string(), state);
    }

    pub async fn remove(&self, source_key: &str) {
        let mut map = self.inner.write().await;
        map.remove(source_key);
    }

    /// Number of jobs currently holding a worker slot.
    pub async fn active_count(&self) -> usize {
        let map = self.inner.read().await;
        map.len()
    }
}
