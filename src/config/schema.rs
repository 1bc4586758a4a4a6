//! Configuration schema definitions for sentinel-relay.
//!
//! This module defines all configuration types that can be deserialized from
//! TOML configuration files. Secrets are normally supplied through the
//! environment and merged in by [`Config::apply_env`].
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── RelaySettings          - Listen address and minimum version floor
//! ├── GithubConfig           - Dispatch target and API access
//! ├── StorageConfig          - S3 bucket for run logs
//! ├── RouteConfig (map)      - One entry per registrant route
//! └── RegistrantConfig (map) - Platform/channel policy for OSS registrants
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::dispatch::{Channel, PlatformFamily, StorageCredentials};

/// Root configuration structure.
///
/// # TOML Structure
///
/// ```toml
/// [relay]
/// port = 3000
/// minimum_version = "8.0.0"
///
/// [github]
/// owner = "electron"
///
/// [routes.fiddle]
/// repo = "fiddle-sentinel"
/// slug = "electron/fiddle"
///
/// [registrants."microsoft/vscode"]
/// platforms = ["windows", "linux"]
/// channels = ["stable"]
/// ```
///
/// # Example
///
/// ```
/// use sentinel_relay::config::{Config, RouteKind};
///
/// let config: Config = toml::from_str(r#"
///     [routes.fiddle]
///     repo = "fiddle-sentinel"
///
///     [routes.oss]
///     repo = "oss-sentinel"
///     kind = "oss"
/// "#).unwrap();
///
/// assert_eq!(config.relay.port, 3000);
/// assert_eq!(config.routes["oss"].kind, RouteKind::Oss);
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Listen address and admission settings.
    #[serde(default)]
    pub relay: RelaySettings,

    /// GitHub repository-dispatch settings.
    #[serde(default)]
    pub github: GithubConfig,

    /// Log archive bucket (optional; logs are not archived without it).
    #[serde(default)]
    pub storage: StorageConfig,

    /// Registrant routes, keyed by the path segment they are served on.
    #[serde(default)]
    pub routes: BTreeMap<String, RouteConfig>,

    /// Subscriptions for registrants arriving on multi-tenant routes.
    #[serde(default)]
    pub registrants: HashMap<String, RegistrantConfig>,
}

/// Dispatch server settings.
///
/// # Defaults
///
/// | Field | Default | Environment |
/// |-------|---------|-------------|
/// | `host` | `0.0.0.0` | `HOST` |
/// | `port` | 3000 | `PORT` |
/// | `minimum_version` | none | `MINIMUM_ELECTRON_VERSION` |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelaySettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Lowest version that is dispatched.
    ///
    /// Must be a valid semantic version. When it is missing every admission
    /// check fails with a configuration error.
    pub minimum_version: Option<String>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            minimum_version: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

/// GitHub API settings shared by the dispatcher and the relay.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GithubConfig {
    /// Owner of the CI repositories that receive dispatch events.
    #[serde(default)]
    pub owner: String,

    /// Token used for repository dispatch and log download.
    ///
    /// Normally supplied through `GITHUB_TOKEN`.
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    /// Default: `https://api.github.com`
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Default: `generate-sentinel-report`
    #[serde(default = "default_event_type")]
    pub event_type: String,

    /// Timeout for each API call in seconds.
    ///
    /// Default: 30
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            token: None,
            api_url: default_api_url(),
            event_type: default_event_type(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_event_type() -> String {
    "generate-sentinel-report".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// S3 bucket used to archive CI run logs.
///
/// Credentials are forwarded to the workflow in the dispatch payload, so the
/// relay side can upload without its own configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Environment: `S3_BUCKET_NAME`
    pub bucket: Option<String>,

    /// Environment: `S3_BUCKET_ACCESS_ID`
    #[serde(default, skip_serializing)]
    pub access_id: Option<String>,

    /// Environment: `S3_BUCKET_ACCESS_KEY`
    #[serde(default, skip_serializing)]
    pub access_key: Option<String>,

    /// Default: `us-east-1`
    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            access_id: None,
            access_key: None,
            region: default_region(),
        }
    }
}

impl StorageConfig {
    /// Returns the credentials if bucket, id and key are all present.
    pub fn credentials(&self) -> Option<StorageCredentials> {
        match (&self.bucket, &self.access_id, &self.access_key) {
            (Some(bucket), Some(access_id), Some(access_key)) => Some(StorageCredentials {
                bucket: bucket.clone(),
                access_id: access_id.clone(),
                access_key: access_key.clone(),
            }),
            _ => None,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Whether a route serves one registrant or many.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    /// A single registrant owns the route; no policy applies.
    #[default]
    Dedicated,

    /// Multi-tenant route; each request names its registrant and is checked
    /// against the `[registrants]` table.
    Oss,
}

/// A registrant route, served at `POST /{name}`.
///
/// # Example
///
/// ```toml
/// [routes.fiddle]
/// repo = "fiddle-sentinel"
/// slug = "electron/fiddle"
/// kind = "dedicated"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// CI repository (under `github.owner`) that receives the dispatch.
    pub repo: String,

    /// Registrant slug (`owner/repo`) for dedicated routes.
    ///
    /// Defaults to the route name.
    pub slug: Option<String>,

    #[serde(default)]
    pub kind: RouteKind,
}

/// Platform and channel subscriptions of one registrant.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RegistrantConfig {
    #[serde(default)]
    pub platforms: BTreeSet<PlatformFamily>,

    #[serde(default)]
    pub channels: BTreeSet<Channel>,
}
