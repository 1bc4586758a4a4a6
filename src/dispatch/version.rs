//! Minimum-version gate.
//!
//! The relay only dispatches runs for versions at or above a configured
//! floor. Versions are compared with semantic-version precedence, so
//! `9.0.0-beta.1` sorts below `9.0.0`. Channel markers such as `nightly` or
//! `beta` are ordinary pre-release identifiers here; channel classification
//! lives in [`super::platform::Channel`].

use std::cmp::Ordering;

use semver::Version;
use tracing::warn;

use super::DispatchError;

/// Normalizes a version string and parses it.
///
/// Surrounding whitespace, one leading `=` and one leading `v` are stripped,
/// so `" v8.4.1 "`, `"=8.4.1"` and `"=v8.4.1"` all clean to `8.4.1`.
///
/// # Errors
///
/// Returns [`DispatchError::Config`] if the cleaned string is not a valid
/// semantic version.
pub fn clean(version: &str) -> Result<Version, DispatchError> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('=').unwrap_or(trimmed);
    let trimmed = trimmed
        .strip_prefix(['v', 'V'])
        .unwrap_or(trimmed)
        .trim();
    Version::parse(trimmed)
        .map_err(|e| DispatchError::Config(format!("invalid version '{}': {}", version, e)))
}

/// Cleans the configured minimum-version floor.
///
/// # Errors
///
/// Returns [`DispatchError::Config`] if the floor is unset or invalid. The
/// caller must abort the admission check.
pub fn clean_minimum(minimum: Option<&str>) -> Result<Version, DispatchError> {
    match minimum {
        Some(raw) if !raw.trim().is_empty() => clean(raw),
        _ => Err(DispatchError::Config(
            "minimum version is not set".to_string(),
        )),
    }
}

/// Returns true if `candidate` is at or above `minimum`.
///
/// Build metadata is ignored. A candidate that does not parse is treated as
/// ineligible.
pub fn is_eligible(minimum: &Version, candidate: &str) -> bool {
    match clean(candidate) {
        Ok(version) => version.cmp_precedence(minimum) != Ordering::Less,
        Err(e) => {
            warn!("Rejecting unparseable version qualifier: {}", e);
            false
        }
    }
}
