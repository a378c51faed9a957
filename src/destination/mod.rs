//! Destination file-sync service access.

pub mod dropbox;

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use tracing::{error, info};

use crate::core::models::{DestinationContainer, FetchUrl, JobHandle};
use crate::error::{ProvisionError, ServiceError};

pub use dropbox::DropboxClient;

/// Length of the generated per-run folder name.
pub const FOLDER_NAME_LEN: usize = 10;

/// What the destination said when asked to pull a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveUrlResponse {
    /// The pull runs asynchronously; poll with this handle.
    Started(JobHandle),
    /// The file was saved before the call returned.
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteJobStatus {
    InProgress,
    Complete,
    Failed(String),
}

#[async_trait]
pub trait DestinationService: Send + Sync {
    async fn create_folder(&self, path: &str) -> Result<(), ServiceError>;

    async fn save_url(&self, path: &str, url: &FetchUrl) -> Result<SaveUrlResponse, ServiceError>;

    async fn check_job_status(&self, handle: &JobHandle) -> Result<RemoteJobStatus, ServiceError>;
}

/// Random numeric folder name. Collision avoidance only, not a secret.
pub fn random_folder_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..FOLDER_NAME_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Creates the fresh folder each run writes into.
pub struct FolderProvisioner {
    destination: Arc<dyn DestinationService>,
    root: String,
}

impl FolderProvisioner {
    /// `root` is the parent path; empty places the folder at the top level.
    pub fn new(destination: Arc<dyn DestinationService>, root: impl Into<String>) -> Self {
        Self {
            destination,
            root: root.into(),
        }
    }

    pub async fn provision(&self) -> Result<DestinationContainer, ProvisionError> {
        let name = random_folder_name(&mut rand::thread_rng());
        let path = format!("{}/{}", self.root.trim_end_matches('/'), name);

        match self.destination.create_folder(&path).await {
            Ok(()) => {
                info!(path = %path, "Created destination folder");
                Ok(DestinationContainer::new(path))
            }
            Err(source) => {
                error!(path = %path, error = %source, "Failed to create destination folder");
                Err(ProvisionError { path, source })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn folder_name_is_ten_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let name = random_folder_name(&mut rng);
            assert_eq!(name.len(), FOLDER_NAME_LEN);
            assert!(name.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn folder_names_differ_between_draws() {
        let mut rng = StdRng::seed_from_u64(42);
        let first = random_folder_name(&mut rng);
        let second = random_folder_name(&mut rng);
        assert_ne!(first, second);
    }
}
