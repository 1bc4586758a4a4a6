//! Dispatch admission: deciding whether a test-run request triggers a CI run.
//!
//! A registrant application asks the relay to test a build. The relay answers
//! with a [`DispatchDecision`] telling the caller how many reports to expect
//! (zero or one) and the [`SessionToken`] those reports will carry. Admitted
//! requests also yield a [`TriggerPayload`] that is forwarded to the CI
//! repository as a repository-dispatch event.
//!
//! # Admission Pipeline
//!
//! ```text
//! DispatchRequest
//!       │
//!       ▼
//!  clean minimum version ──► DispatchError::Config (no decision)
//!       │
//!       ▼
//!  SessionToken::generate (always)
//!       │
//!       ▼
//!  PlatformFamily::from_platform ──► DispatchError::UnrecognizedPlatform
//!       │
//!       ▼
//!  RegistrantPolicy (OSS routes only) ──► { reportsExpected: 0 }
//!       │
//!       ▼
//!  version gate ──► { reportsExpected: 0 }
//!       │
//!       ▼
//!  { reportsExpected: 1 } + TriggerPayload
//! ```

pub mod eligibility;
pub mod platform;
pub mod policy;
pub mod session;
pub mod version;

use serde::{Deserialize, Serialize};

pub use eligibility::{Admission, DispatchEligibility};
pub use platform::{Channel, PlatformFamily};
pub use policy::RegistrantPolicy;
pub use session::SessionToken;

/// Errors that abort an admission check.
///
/// A policy denial or a version below the floor is not an error; those
/// produce a decision with `reportsExpected: 0`.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The relay itself is misconfigured (e.g. no minimum version).
    ///
    /// Fatal for the whole admission path: no decision is returned and
    /// nothing is dispatched.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request names a platform outside the known set.
    #[error("Unrecognized platform {0}")]
    UnrecognizedPlatform(String),
}

/// Platform details supplied by the caller.
///
/// Only `platform` is interpreted; any other fields are forwarded to the CI
/// workflow untouched.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlatformInstallData {
    /// Concrete platform identifier, e.g. `linux-x64`.
    pub platform: String,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PlatformInstallData {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Inbound test-run request body.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub platform_install_data: PlatformInstallData,

    /// URL the final canonical report is POSTed to.
    pub report_callback: String,

    /// Version under test; may embed `nightly` or `beta`.
    pub version_qualifier: String,

    #[serde(default)]
    pub commit_hash: String,

    /// Registrant slug (`owner/repo`), required on multi-tenant routes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registrant: Option<String>,
}

/// Answer returned to the caller for every admission check.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchDecision {
    /// Number of reports the caller should wait for: 0 or 1.
    pub reports_expected: u8,
    pub session_token: SessionToken,
}

impl DispatchDecision {
    pub fn rejected(session_token: SessionToken) -> Self {
        Self {
            reports_expected: 0,
            session_token,
        }
    }

    pub fn accepted(session_token: SessionToken) -> Self {
        Self {
            reports_expected: 1,
            session_token,
        }
    }
}

/// Storage credentials forwarded to the workflow for log archiving.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StorageCredentials {
    #[serde(rename = "S3_BUCKET_NAME")]
    pub bucket: String,

    #[serde(rename = "S3_BUCKET_ACCESS_ID")]
    pub access_id: String,

    #[serde(rename = "S3_BUCKET_ACCESS_KEY")]
    pub access_key: String,
}

/// `client_payload` of the repository-dispatch event.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerPayload {
    /// CI runner class, e.g. `ubuntu-latest`. Older senders omit it.
    #[serde(rename = "hostOS", default, skip_serializing_if = "Option::is_none")]
    pub host_os: Option<String>,

    pub session_token: SessionToken,

    pub report_callback: String,

    pub version_qualifier: String,

    pub platform_install_data: PlatformInstallData,

    /// Registrant route name.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_credentials: Option<StorageCredentials>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserializes_camel_case() {
        let request: DispatchRequest = serde_json::from_str(
            r#"{
                "platformInstallData": {"platform": "linux-x64", "downloadUrl": "https://x"},
                "reportCallback": "https://example.com/report",
                "versionQualifier": "10.1.0",
                "commitHash": "abc123"
            }"#,
        )
        .unwrap();

        assert_eq!(request.platform_install_data.platform, "linux-x64");
        assert_eq!(
            request.platform_install_data.extra["downloadUrl"],
            serde_json::json!("https://x")
        );
        assert_eq!(request.commit_hash, "abc123");
        assert!(request.registrant.is_none());
    }

    #[test]
    fn test_decision_serializes_camel_case() {
        let decision = DispatchDecision::rejected(SessionToken::generate("a", "1.0.0", "b/c"));
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["reportsExpected"], 0);
        assert!(json["sessionToken"].as_str().unwrap().starts_with("a-"));
    }

    #[test]
    fn test_trigger_payload_wire_names() {
        let payload = TriggerPayload {
            host_os: Some("ubuntu-latest".to_string()),
            session_token: SessionToken::generate("a", "1.0.0", "b/c"),
            report_callback: "https://example.com".to_string(),
            version_qualifier: "1.0.0".to_string(),
            platform_install_data: PlatformInstallData::new("linux-x64"),
            name: "fiddle".to_string(),
            s3_credentials: Some(StorageCredentials {
                bucket: "logs".to_string(),
                access_id: "id".to_string(),
                access_key: "key".to_string(),
            }),
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["hostOS"], "ubuntu-latest");
        assert_eq!(json["platformInstallData"]["platform"], "linux-x64");
        assert_eq!(json["s3Credentials"]["S3_BUCKET_NAME"], "logs");
        assert_eq!(json["name"], "fiddle");
    }
}
