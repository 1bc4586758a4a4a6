//! Workflow-side report relay.
//!
//! Runs inside the CI job started by a repository dispatch. It normalizes the
//! report the tests left behind, archives the job log, and POSTs the result
//! to the registrant's callback URL with the session token attached.
//!
//! ```text
//! report.json ──► normalize ─┐
//!                            ├──► CallbackBody ──► POST reportCallback
//! job log ──► LogArchive ────┘       (sessionId header)
//! ```
//!
//! A report that cannot be normalized stops the relay before anything is
//! posted. A log that cannot be archived does not: the link falls back to
//! `N/A`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::{error, info, warn};

use crate::archive::LogArchive;
use crate::clock::Clock;
use crate::dispatch::{DispatchError, PlatformFamily, SessionToken, TriggerPayload};
use crate::github::{RemoteCallError, RemoteResult, RunLogSource};
use crate::report::{self, CanonicalReport, ReportError};

/// Placeholder for links that are not available.
pub const NOT_AVAILABLE: &str = "N/A";

/// Header carrying the session token on the callback.
pub const SESSION_HEADER: &str = "sessionId";

/// Errors that stop the relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The dispatch event could not be read.
    #[error("Failed to load dispatch event: {0}")]
    Event(String),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Platform(#[from] DispatchError),

    /// The callback was not accepted.
    #[error("Callback failed: {0}")]
    Callback(#[from] RemoteCallError),
}

/// Where the relay is running, as reported by the CI environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowContext {
    /// `owner/repo` of the CI repository.
    pub repository: String,
    pub run_id: String,
    pub server_url: String,
    /// Path of the JSON file holding the triggering event.
    pub event_path: PathBuf,
}

impl WorkflowContext {
    /// Reads `GITHUB_REPOSITORY`, `GITHUB_RUN_ID`, `GITHUB_SERVER_URL` and
    /// `GITHUB_EVENT_PATH` through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Event`] naming the first missing variable.
    pub fn from_env<F>(lookup: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key).ok_or_else(|| RelayError::Event(format!("{} is not set", key)))
        };

        Ok(Self {
            repository: require("GITHUB_REPOSITORY")?,
            run_id: require("GITHUB_RUN_ID")?,
            server_url: lookup("GITHUB_SERVER_URL")
                .unwrap_or_else(|| "https://github.com".to_string()),
            event_path: PathBuf::from(require("GITHUB_EVENT_PATH")?),
        })
    }

    pub fn ci_link(&self) -> String {
        format!(
            "{}/{}/actions/runs/{}",
            self.server_url.trim_end_matches('/'),
            self.repository,
            self.run_id
        )
    }
}

#[derive(Deserialize)]
struct DispatchEvent {
    client_payload: TriggerPayload,
}

/// Loads the `client_payload` of the repository-dispatch event file.
///
/// # Errors
///
/// Returns [`RelayError::Event`] if the file is unreadable or lacks a valid
/// payload.
pub async fn load_event(path: &Path) -> Result<TriggerPayload, RelayError> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|e| RelayError::Event(format!("{}: {}", path.display(), e)))?;
    let event: DispatchEvent = serde_json::from_slice(&content)
        .map_err(|e| RelayError::Event(format!("{}: {}", path.display(), e)))?;
    Ok(event.client_payload)
}

/// CPU summary of the test machine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CpuInfo {
    pub cores: usize,
    pub model: String,
    /// MHz.
    pub speed: u64,
}

/// Description of the machine the tests ran on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAgent {
    pub arch: String,
    pub platform: String,
    pub cpus: CpuInfo,

    /// Bytes.
    pub free_mem: u64,

    /// Kernel release, when the OS reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,

    /// Bytes.
    pub total_mem: u64,

    #[serde(rename = "type")]
    pub os_type: String,

    pub endianness: String,
}

impl TestAgent {
    /// Describes the current machine using registrant-facing names
    /// (`x64`, `darwin`, `Windows_NT`, ...).
    pub fn detect() -> Self {
        let arch = match std::env::consts::ARCH {
            "x86_64" => "x64",
            "x86" => "ia32",
            "aarch64" => "arm64",
            other => other,
        };
        let (platform, os_type) = match std::env::consts::OS {
            "windows" => ("win32", "Windows_NT"),
            "macos" => ("darwin", "Darwin"),
            "linux" => ("linux", "Linux"),
            other => (other, other),
        };
        let endianness = if cfg!(target_endian = "little") {
            "LE"
        } else {
            "BE"
        };

        let system = System::new_all();
        let cpus = system.cpus();
        let (model, speed) = cpus
            .first()
            .map(|cpu| (cpu.brand().trim().to_string(), cpu.frequency()))
            .unwrap_or_default();

        Self {
            arch: arch.to_string(),
            platform: platform.to_string(),
            cpus: CpuInfo {
                cores: cpus.len(),
                model,
                speed,
            },
            free_mem: system.free_memory(),
            release: System::kernel_version(),
            total_mem: system.total_memory(),
            os_type: os_type.to_string(),
            endianness: endianness.to_string(),
        }
    }
}

/// Body POSTed to the registrant's callback URL.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackBody {
    pub name: String,

    #[serde(flatten)]
    pub report: CanonicalReport,

    pub os: String,
    pub arch: String,
    pub source_link: String,
    pub workspace_gzip_link: String,
    pub logfile_link: String,
    pub ci_link: String,
    pub test_agent: TestAgent,
}

/// Delivers the final result to a registrant.
#[async_trait]
pub trait CallbackSink: Send + Sync {
    /// POSTs `body` to `url`. Anything but 200 is a failure.
    async fn post(
        &self,
        url: &str,
        session_token: &SessionToken,
        body: &CallbackBody,
    ) -> RemoteResult<()>;
}

/// reqwest-backed [`CallbackSink`].
#[derive(Debug, Clone)]
pub struct HttpCallback {
    http: reqwest::Client,
}

impl HttpCallback {
    /// # Errors
    ///
    /// Returns [`RemoteCallError::Transport`] if the client cannot be built.
    pub fn new(timeout_secs: u64) -> RemoteResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl CallbackSink for HttpCallback {
    async fn post(
        &self,
        url: &str,
        session_token: &SessionToken,
        body: &CallbackBody,
    ) -> RemoteResult<()> {
        let response = self
            .http
            .post(url)
            .header(SESSION_HEADER, session_token.as_str())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(RemoteCallError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(())
    }
}

/// Settings that do not come from the dispatch event.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Default: `report/report.json`
    pub report_path: PathBuf,
    pub source_link: String,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            report_path: PathBuf::from("report").join("report.json"),
            source_link: NOT_AVAILABLE.to_string(),
        }
    }
}

/// Summary of a completed relay.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayOutcome {
    pub run_name: String,
    pub body: CallbackBody,
}

/// Composes normalization, log archiving and the callback.
pub struct Relay {
    log_source: Arc<dyn RunLogSource>,
    archive: Option<Arc<dyn LogArchive>>,
    callback: Arc<dyn CallbackSink>,
    clock: Arc<dyn Clock>,
    agent: TestAgent,
}

impl Relay {
    pub fn new(
        log_source: Arc<dyn RunLogSource>,
        archive: Option<Arc<dyn LogArchive>>,
        callback: Arc<dyn CallbackSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            log_source,
            archive,
            callback,
            clock,
            agent: TestAgent::detect(),
        }
    }

    /// Overrides the detected test agent.
    pub fn with_agent(mut self, agent: TestAgent) -> Self {
        self.agent = agent;
        self
    }

    /// Relays the result of one workflow run.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Report`] if the report cannot be normalized; nothing
    ///   is posted.
    /// - [`RelayError::Platform`] if the payload's runner class is unknown.
    /// - [`RelayError::Callback`] if the callback is not accepted.
    pub async fn run(
        &self,
        payload: &TriggerPayload,
        context: &WorkflowContext,
        options: &RelayOptions,
    ) -> Result<RelayOutcome, RelayError> {
        let report = report::normalize_file(&options.report_path, self.clock.as_ref()).await?;

        let platform = &payload.platform_install_data.platform;
        let family = match &payload.host_os {
            Some(label) => PlatformFamily::from_runner_label(label)?,
            None => PlatformFamily::from_platform(platform)?,
        };
        let arch = platform
            .split_once('-')
            .map(|(_, arch)| arch)
            .unwrap_or_default();

        let run_name = format!(
            "{}-{}-{}",
            payload.name,
            platform,
            self.clock.now().timestamp_millis()
        );

        let logfile_link = self.archive_log(&run_name, context).await;

        let body = CallbackBody {
            name: run_name.clone(),
            report,
            os: family.as_str().to_string(),
            arch: arch.to_string(),
            source_link: options.source_link.clone(),
            workspace_gzip_link: NOT_AVAILABLE.to_string(),
            logfile_link,
            ci_link: context.ci_link(),
            test_agent: self.agent.clone(),
        };

        info!("Sending Test Run Data to: {}", payload.report_callback);
        if let Err(e) = self
            .callback
            .post(&payload.report_callback, &payload.session_token, &body)
            .await
        {
            error!("Failed to send Test Run Data: {}", e);
            return Err(e.into());
        }
        info!("Test Run Data sent successfully");

        Ok(RelayOutcome { run_name, body })
    }

    async fn archive_log(&self, run_name: &str, context: &WorkflowContext) -> String {
        let Some(archive) = &self.archive else {
            return NOT_AVAILABLE.to_string();
        };

        let stored = async {
            let log = self
                .log_source
                .fetch_run_log(&context.repository, &context.run_id)
                .await?;
            archive.store(run_name, log).await
        }
        .await;

        match stored {
            Ok(url) => url,
            Err(e) => {
                warn!("Failed to archive run log: {}", e);
                NOT_AVAILABLE.to_string()
            }
        }
    }
}
