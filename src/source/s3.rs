use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use std::time::Duration;
use tracing::instrument;

use super::{ListPage, ObjectStore};
use crate::core::models::FetchUrl;
use crate::error::ServiceError;

/// S3-backed source store for a single bucket.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client from the ambient AWS credential chain.
    pub async fn from_env(region: &str, bucket: impl Into<String>) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self::new(aws_sdk_s3::Client::new(&shared), bucket)
    }

    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, continuation_token), fields(bucket = %self.bucket))]
    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, ServiceError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(classify)?;

        let keys = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_owned))
            .collect();

        Ok(ListPage {
            keys,
            continuation_token: output.next_continuation_token().map(str::to_owned),
        })
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<FetchUrl, ServiceError> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| ServiceError::Other(format!("invalid presign expiry: {}", e)))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(classify)?;

        Ok(FetchUrl::new(request.uri()))
    }
}

fn classify<E, R>(err: SdkError<E, R>) -> ServiceError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug + 'static,
{
    let detail = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => ServiceError::Transport(detail),
        SdkError::ServiceError(service) => match service.err().code() {
            Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken") => {
                ServiceError::Auth(detail)
            }
            Some("NoSuchBucket" | "NoSuchKey") => ServiceError::NotFound(detail),
            Some("SlowDown") => ServiceError::RateLimited(detail),
            _ => ServiceError::Other(detail),
        },
        _ => ServiceError::Other(detail),
    }
}
