//! Configuration loading and schema definitions for sentinel-relay.
//!
//! Configuration comes from a TOML file, with secrets and deployment
//! settings overridden from the environment once at start-up. Nothing below
//! the binary reads the environment directly.

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::dispatch::version;

/// Loads configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
///
/// # Example
///
/// ```no_run
/// use sentinel_relay::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("sentinel.toml"))?;
/// println!("Listening on port {}", config.relay.port);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Loads configuration from a TOML string.
///
/// # Example
///
/// ```
/// use sentinel_relay::config::load_config_str;
///
/// let config = load_config_str(r#"
///     [relay]
///     port = 8080
///     minimum_version = "9.0.0"
/// "#)?;
///
/// assert_eq!(config.relay.port, 8080);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    Ok(config)
}

impl Config {
    /// Overrides settings from environment variables.
    ///
    /// `lookup` is usually `|key| std::env::var(key).ok()`; tests pass a map.
    ///
    /// | Variable | Setting |
    /// |----------|---------|
    /// | `MINIMUM_ELECTRON_VERSION` | `relay.minimum_version` |
    /// | `HOST` / `PORT` | `relay.host` / `relay.port` |
    /// | `GITHUB_TOKEN` | `github.token` |
    /// | `GITHUB_OWNER` | `github.owner` |
    /// | `S3_BUCKET_NAME` | `storage.bucket` |
    /// | `S3_BUCKET_ACCESS_ID` | `storage.access_id` |
    /// | `S3_BUCKET_ACCESS_KEY` | `storage.access_key` |
    ///
    /// # Errors
    ///
    /// Returns an error if `PORT` is not a valid port number.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(minimum) = lookup("MINIMUM_ELECTRON_VERSION") {
            self.relay.minimum_version = Some(minimum);
        }
        if let Some(host) = lookup("HOST") {
            self.relay.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.relay.port = port
                .parse()
                .with_context(|| format!("Invalid PORT: {}", port))?;
        }
        if let Some(token) = lookup("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(owner) = lookup("GITHUB_OWNER") {
            self.github.owner = owner;
        }
        if let Some(bucket) = lookup("S3_BUCKET_NAME") {
            self.storage.bucket = Some(bucket);
        }
        if let Some(access_id) = lookup("S3_BUCKET_ACCESS_ID") {
            self.storage.access_id = Some(access_id);
        }
        if let Some(access_key) = lookup("S3_BUCKET_ACCESS_KEY") {
            self.storage.access_key = Some(access_key);
        }
        Ok(())
    }

    /// Checks the settings the dispatch server needs.
    ///
    /// # Errors
    ///
    /// Returns an error if the minimum version is missing or invalid, no
    /// routes are configured, or the GitHub owner is empty.
    pub fn validate_server(&self) -> Result<()> {
        version::clean_minimum(self.relay.minimum_version.as_deref())
            .context("MINIMUM_ELECTRON_VERSION env var invalid or not set")?;

        if self.routes.is_empty() {
            bail!("No routes configured");
        }
        if self.github.owner.is_empty() {
            bail!("github.owner is not set");
        }
        Ok(())
    }
}
