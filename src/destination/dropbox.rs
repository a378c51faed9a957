use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{DestinationService, RemoteJobStatus, SaveUrlResponse};
use crate::config::Secret;
use crate::core::models::{FetchUrl, JobHandle};
use crate::error::ServiceError;

const API_BASE: &str = "https://api.dropboxapi.com/2";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Dropbox HTTP API client covering folder creation and save-by-url jobs.
pub struct DropboxClient {
    base_url: String,
    token: Secret,
    client: reqwest::Client,
}

impl DropboxClient {
    /// `request_timeout` bounds every API call, from connect to the last
    /// byte of the response.
    pub fn new(token: Secret, request_timeout: Duration) -> Result<Self, ServiceError> {
        Self::with_base_url(token, API_BASE, request_timeout)
    }

    pub fn with_base_url(
        token: Secret,
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout.min(CONNECT_TIMEOUT))
            .timeout(request_timeout)
            .build()
            .map_err(|e| ServiceError::Other(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into(),
            token,
            client,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<T, ServiceError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, endpoint))
            .bearer_auth(self.token.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(endpoint, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(endpoint, e))?;

        if !status.is_success() {
            return Err(classify_error(status, &text));
        }

        serde_json::from_str(&text)
            .map_err(|e| ServiceError::Other(format!("unexpected response from {}: {}", endpoint, e)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = ".tag", rename_all = "snake_case")]
enum SaveUrlResult {
    AsyncJobId { async_job_id: String },
    Complete {},
}

#[derive(Debug, Deserialize)]
#[serde(tag = ".tag", rename_all = "snake_case")]
enum JobStatusResult {
    InProgress,
    Complete {},
    Failed { failed: serde_json::Value },
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_summary: String,
}

impl From<SaveUrlResult> for SaveUrlResponse {
    fn from(result: SaveUrlResult) -> Self {
        match result {
            SaveUrlResult::AsyncJobId { async_job_id } => {
                SaveUrlResponse::Started(JobHandle(async_job_id))
            }
            SaveUrlResult::Complete {} => SaveUrlResponse::Complete,
        }
    }
}

impl From<JobStatusResult> for RemoteJobStatus {
    fn from(result: JobStatusResult) -> Self {
        match result {
            JobStatusResult::InProgress => RemoteJobStatus::InProgress,
            JobStatusResult::Complete {} => RemoteJobStatus::Complete,
            JobStatusResult::Failed { failed } => {
                let reason = failed
                    .get(".tag")
                    .and_then(|tag| tag.as_str())
                    .map(str::to_owned)
                    .unwrap_or_else(|| failed.to_string());
                RemoteJobStatus::Failed(reason)
            }
        }
    }
}

fn transport_error(endpoint: &str, err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Transport(format!("{} timed out", endpoint))
    } else {
        ServiceError::Transport(err.without_url().to_string())
    }
}

/// Map an HTTP error response onto the service error taxonomy.
fn classify_error(status: StatusCode, body: &str) -> ServiceError {
    let summary = serde_json::from_str::<ApiErrorBody>(body)
        .map(|e| e.error_summary)
        .unwrap_or_else(|_| body.trim().to_string());
    let detail = format!("{} ({})", summary, status.as_u16());

    match status {
        StatusCode::UNAUTHORIZED => ServiceError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => ServiceError::RateLimited(detail),
        StatusCode::CONFLICT if summary.contains("conflict") => ServiceError::Conflict(detail),
        StatusCode::CONFLICT if summary.contains("not_found") => ServiceError::NotFound(detail),
        s if s.is_server_error() => ServiceError::Transport(detail),
        _ => ServiceError::Other(detail),
    }
}

#[async_trait]
impl DestinationService for DropboxClient {
    async fn create_folder(&self, path: &str) -> Result<(), ServiceError> {
        let _: serde_json::Value = self
            .call(
                "files/create_folder_v2",
                json!({ "path": path, "autorename": false }),
            )
            .await?;
        Ok(())
    }

    async fn save_url(&self, path: &str, url: &FetchUrl) -> Result<SaveUrlResponse, ServiceError> {
        let result: SaveUrlResult = self
            .call("files/save_url", json!({ "path": path, "url": url.expose() }))
            .await?;
        debug!(path = %path, "save_url accepted");
        Ok(result.into())
    }

    async fn check_job_status(&self, handle: &JobHandle) -> Result<RemoteJobStatus, ServiceError> {
        let result: JobStatusResult = self
            .call(
                "files/save_url/check_job_status",
                json!({ "async_job_id": handle.0 }),
            )
            .await?;
        Ok(result.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(body: &str) -> RemoteJobStatus {
        serde_json::from_str::<JobStatusResult>(body).unwrap().into()
    }

    #[test]
    fn parses_async_job_submission() {
        let result: SaveUrlResult =
            serde_json::from_str(r#"{".tag": "async_job_id", "async_job_id": "34g93hh34h04y384084"}"#)
                .unwrap();
        assert_eq!(
            SaveUrlResponse::from(result),
            SaveUrlResponse::Started(JobHandle("34g93hh34h04y384084".to_string()))
        );
    }

    #[test]
    fn parses_immediate_completion() {
        let result: SaveUrlResult = serde_json::from_str(
            r#"{".tag": "complete", "name": "1.txt", "path_lower": "/0123456789/1.txt", "size": 7212}"#,
        )
        .unwrap();
        assert_eq!(SaveUrlResponse::from(result), SaveUrlResponse::Complete);
    }

    #[test]
    fn parses_job_statuses() {
        assert_eq!(status(r#"{".tag": "in_progress"}"#), RemoteJobStatus::InProgress);
        assert_eq!(
            status(r#"{".tag": "complete", "name": "a.txt", "id": "id:a4ayc_80_OEAAAAAAAAAXw"}"#),
            RemoteJobStatus::Complete
        );
        assert_eq!(
            status(r#"{".tag": "failed", "failed": {".tag": "download_failed"}}"#),
            RemoteJobStatus::Failed("download_failed".to_string())
        );
    }

    #[test]
    fn classifies_conflict() {
        let err = classify_error(
            StatusCode::CONFLICT,
            r#"{"error_summary": "path/conflict/folder/..", "error": {".tag": "path"}}"#,
        );
        assert!(matches!(err, ServiceError::Conflict(ref d) if d.contains("path/conflict/folder")));
    }

    #[test]
    fn classifies_auth_and_rate_limit() {
        assert!(matches!(
            classify_error(StatusCode::UNAUTHORIZED, "invalid_access_token"),
            ServiceError::Auth(_)
        ));
        assert!(matches!(
            classify_error(StatusCode::TOO_MANY_REQUESTS, r#"{"error_summary": "too_many_requests/.."}"#),
            ServiceError::RateLimited(_)
        ));
    }

    #[test]
    fn classifies_unparseable_body_as_other() {
        let err = classify_error(StatusCode::BAD_REQUEST, "Error in call to API function");
        assert_eq!(
            err,
            ServiceError::Other("Error in call to API function (400)".to_string())
        );
    }
}
