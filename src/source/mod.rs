//! Source object store access: paged listing and URL signing.
//!
//! - `ObjectStore`: the narrow seam to a concrete store (S3, or the
//!   in-memory store used for simulation and tests)
//! - `SourceLister`: drains every listing page for a logical folder
//! - `UrlSigner`: turns keys into time-limited fetch URLs

pub mod s3;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::core::models::FetchUrl;
use crate::error::{ListError, ServiceError, SignError};

pub use s3::S3ObjectStore;

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Present when more pages follow.
    pub continuation_token: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one page of keys starting with `prefix`.
    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, ServiceError>;

    /// Produce a GET-only URL for `key`, valid for `expires_in`.
    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<FetchUrl, ServiceError>;
}

/// Listing prefix for a logical folder: always exactly one trailing `/`.
pub fn folder_prefix(prefix: &str) -> String {
    format!("{}/", prefix.trim_end_matches('/'))
}

pub struct SourceLister {
    store: Arc<dyn ObjectStore>,
}

impl SourceLister {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// List every key under `prefix/`, in the order the store reports them.
    ///
    /// Any page failure aborts the whole listing.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, ListError> {
        let folder = folder_prefix(prefix);
        let mut keys = Vec::new();
        let mut token = None;
        let mut page = 0;

        loop {
            page += 1;
            let result = self
                .store
                .list_page(&folder, token.take())
                .await
                .map_err(|source| ListError {
                    prefix: folder.clone(),
                    page,
                    source,
                })?;

            debug!(page, keys = result.keys.len(), "Listed page");
            keys.extend(result.keys);

            match result.continuation_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        info!(prefix = %folder, pages = page, total_keys = keys.len(), "Listing complete");
        Ok(keys)
    }
}

pub struct UrlSigner {
    store: Arc<dyn ObjectStore>,
    expires_in: Duration,
}

impl UrlSigner {
    pub fn new(store: Arc<dyn ObjectStore>, expires_in: Duration) -> Self {
        Self { store, expires_in }
    }

    pub fn expires_in(&self) -> Duration {
        self.expires_in
    }

    pub async fn sign(&self, key: &str) -> Result<FetchUrl, SignError> {
        self.store
            .presign_get(key, self.expires_in)
            .await
            .map_err(|source| SignError {
                key: key.to_string(),
                source,
            })
    }

    /// Sign every key concurrently. The result keeps the input order.
    pub async fn sign_all(&self, keys: &[String]) -> Result<Vec<(String, FetchUrl)>, SignError> {
        let mut tasks = JoinSet::new();
        let mut keys_by_task = HashMap::new();

        for (index, key) in keys.iter().cloned().enumerate() {
            let store = Arc::clone(&self.store);
            let expires_in = self.expires_in;
            let handle = tasks.spawn({
                let key = key.clone();
                async move {
                    let result = store.presign_get(&key, expires_in).await;
                    (index, key, result)
                }
            });
            keys_by_task.insert(handle.id(), key);
        }

        let mut signed: Vec<Option<(String, FetchUrl)>> = vec![None; keys.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, key, result) = match joined {
                Ok(done) => done,
                Err(err) => {
                    return Err(SignError {
                        key: keys_by_task.remove(&err.id()).unwrap_or_default(),
                        source: ServiceError::Other(format!("signing task failed: {}", err)),
                    });
                }
            };
            let url = result.map_err(|source| SignError {
                key: key.clone(),
                source,
            })?;
            signed[index] = Some((key, url));
        }

        debug!(count = keys.len(), "Signed fetch URLs");
        Ok(signed.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_prefix_adds_single_separator() {
        assert_eq!(folder_prefix("photos"), "photos/");
        assert_eq!(folder_prefix("photos/"), "photos/");
        assert_eq!(folder_prefix("a/b//"), "a/b/");
    }
}
