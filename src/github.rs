//! GitHub REST client for repository dispatch and workflow logs.
//!
//! The dispatch server uses [`WorkflowTrigger`] to start a CI run. The relay
//! uses [`RunLogSource`] to fetch the log of the job it is running in so the
//! log can be archived next to the report.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::GithubConfig;
use crate::dispatch::TriggerPayload;

/// Result type for outbound calls.
pub type RemoteResult<T> = Result<T, RemoteCallError>;

/// Failures of calls to GitHub, S3 or a report callback.
///
/// None of these alter a decision or report that was already computed; the
/// caller logs them.
#[derive(Debug, thiserror::Error)]
pub enum RemoteCallError {
    /// The remote answered with an unexpected status.
    #[error("{url} responded with {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    /// The request could not be sent or the response not read.
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The log archive rejected the upload.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The response did not carry what was expected.
    #[error("Unexpected response: {0}")]
    Payload(String),
}

/// Starts a CI workflow for an admitted request.
#[async_trait]
pub trait WorkflowTrigger: Send + Sync {
    /// Sends a repository-dispatch event to `repo`.
    ///
    /// Any 2xx response is success.
    async fn dispatch(&self, repo: &str, payload: &TriggerPayload) -> RemoteResult<()>;
}

/// Fetches the log text of a workflow run.
#[async_trait]
pub trait RunLogSource: Send + Sync {
    /// Returns the log of the first job of `run_id` in `repository`
    /// (`owner/repo`).
    async fn fetch_run_log(&self, repository: &str, run_id: &str) -> RemoteResult<String>;
}

#[derive(Serialize)]
struct DispatchBody<'a> {
    event_type: &'a str,
    client_payload: &'a TriggerPayload,
}

#[derive(Deserialize)]
struct JobList {
    jobs: Vec<Job>,
}

#[derive(Deserialize)]
struct Job {
    id: u64,
}

/// GitHub API client backed by reqwest.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    owner: String,
    event_type: String,
}

impl GithubClient {
    /// Builds a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteCallError::Payload`] if the token contains characters
    /// that cannot appear in a header, or [`RemoteCallError::Transport`] if
    /// the HTTP client cannot be built.
    pub fn new(config: &GithubConfig) -> RemoteResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("sentinel-relay/", env!("CARGO_PKG_VERSION"))),
        );
        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("token {}", token))
                .map_err(|e| RemoteCallError::Payload(format!("invalid token: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            event_type: config.event_type.clone(),
        })
    }

    fn dispatch_url(&self, repo: &str) -> String {
        format!("{}/repos/{}/{}/dispatches", self.api_url, self.owner, repo)
    }

    async fn get_checked(&self, url: &str) -> RemoteResult<reqwest::Response> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteCallError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl WorkflowTrigger for GithubClient {
    async fn dispatch(&self, repo: &str, payload: &TriggerPayload) -> RemoteResult<()> {
        let url = self.dispatch_url(repo);
        debug!("Dispatching {} to {}", self.event_type, url);

        let body = DispatchBody {
            event_type: &self.event_type,
            client_payload: payload,
        };
        let response = self.http.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteCallError::Status { url, status });
        }

        info!(
            "Dispatched {} for session {}",
            payload.platform_install_data.platform, payload.session_token
        );
        Ok(())
    }
}

#[async_trait]
impl RunLogSource for GithubClient {
    async fn fetch_run_log(&self, repository: &str, run_id: &str) -> RemoteResult<String> {
        let jobs_url = format!(
            "{}/repos/{}/actions/runs/{}/jobs",
            self.api_url, repository, run_id
        );
        let jobs: JobList = self.get_checked(&jobs_url).await?.json().await?;
        let job = jobs
            .jobs
            .first()
            .ok_or_else(|| RemoteCallError::Payload(format!("run {} has no jobs", run_id)))?;

        // Redirects to a signed download URL; reqwest follows it.
        let logs_url = format!(
            "{}/repos/{}/actions/jobs/{}/logs",
            self.api_url, repository, job.id
        );
        let text = self.get_checked(&logs_url).await?.text().await?;
        debug!("Fetched {} bytes of log for job {}", text.len(), job.id);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{PlatformInstallData, SessionToken};

    fn config() -> GithubConfig {
        GithubConfig {
            owner: "electron".to_string(),
            token: Some("ghp_test".to_string()),
            api_url: "https://api.github.com/".to_string(),
            ..GithubConfig::default()
        }
    }

    #[test]
    fn test_dispatch_url() {
        let client = GithubClient::new(&config()).unwrap();
        assert_eq!(
            client.dispatch_url("fiddle-sentinel"),
            "https://api.github.com/repos/electron/fiddle-sentinel/dispatches"
        );
    }

    #[test]
    fn test_rejects_unprintable_token() {
        let mut config = config();
        config.token = Some("bad\ntoken".to_string());
        assert!(matches!(
            GithubClient::new(&config),
            Err(RemoteCallError::Payload(_))
        ));
    }

    #[test]
    fn test_dispatch_body_shape() {
        let payload = TriggerPayload {
            host_os: Some("macos-latest".to_string()),
            session_token: SessionToken::generate("abc", "10.0.0", "electron/fiddle"),
            report_callback: "https://example.com/cb".to_string(),
            version_qualifier: "10.0.0".to_string(),
            platform_install_data: PlatformInstallData::new("darwin-x64"),
            name: "fiddle".to_string(),
            s3_credentials: None,
        };
        let body = DispatchBody {
            event_type: "generate-sentinel-report",
            client_payload: &payload,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["event_type"], "generate-sentinel-report");
        assert_eq!(json["client_payload"]["hostOS"], "macos-latest");
        assert!(json["client_payload"].get("s3Credentials").is_none());
    }
}
