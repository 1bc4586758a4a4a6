//! Platform families, CI runner classes and release channels.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::DispatchError;

const WINDOWS_PLATFORMS: &[&str] = &["win32-ia32", "win32-x64", "win32-arm64", "win32-arm64-x64"];
const MACOS_PLATFORMS: &[&str] = &["darwin-x64", "mas-x64"];
const LINUX_PLATFORMS: &[&str] = &["linux-armv7l", "linux-arm64", "linux-ia32", "linux-x64"];

/// Operating-system family a concrete platform identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFamily {
    Windows,
    Macos,
    Linux,
}

impl PlatformFamily {
    /// Maps a platform identifier such as `win32-x64` to its family.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnrecognizedPlatform`] for identifiers outside
    /// the known set; there is no default family.
    pub fn from_platform(platform: &str) -> Result<Self, DispatchError> {
        if WINDOWS_PLATFORMS.contains(&platform) {
            Ok(Self::Windows)
        } else if MACOS_PLATFORMS.contains(&platform) {
            Ok(Self::Macos)
        } else if LINUX_PLATFORMS.contains(&platform) {
            Ok(Self::Linux)
        } else {
            Err(DispatchError::UnrecognizedPlatform(platform.to_string()))
        }
    }

    /// Maps a CI runner label back to its family.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnrecognizedPlatform`] for unknown labels.
    pub fn from_runner_label(label: &str) -> Result<Self, DispatchError> {
        [Self::Windows, Self::Macos, Self::Linux]
            .into_iter()
            .find(|family| family.runner_label() == label)
            .ok_or_else(|| DispatchError::UnrecognizedPlatform(label.to_string()))
    }

    /// The host-OS runner class jobs for this family execute on.
    pub fn runner_label(self) -> &'static str {
        match self {
            Self::Windows => "windows-latest",
            Self::Macos => "macos-latest",
            Self::Linux => "ubuntu-latest",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Macos => "macos",
            Self::Linux => "linux",
        }
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Release cadence derived from a version qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Nightly,
    Beta,
    Stable,
}

impl Channel {
    /// Classifies a version qualifier by its embedded channel marker.
    ///
    /// `nightly` is checked before `beta`, so a qualifier carrying both
    /// markers is nightly. Anything without a marker is stable.
    pub fn classify(version_qualifier: &str) -> Self {
        if version_qualifier.contains("nightly") {
            Self::Nightly
        } else if version_qualifier.contains("beta") {
            Self::Beta
        } else {
            Self::Stable
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nightly => "nightly",
            Self::Beta => "beta",
            Self::Stable => "stable",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_to_runner_label() {
        for platform in WINDOWS_PLATFORMS {
            let family = PlatformFamily::from_platform(platform).unwrap();
            assert_eq!(family.runner_label(), "windows-latest");
        }
        for platform in LINUX_PLATFORMS {
            let family = PlatformFamily::from_platform(platform).unwrap();
            assert_eq!(family.runner_label(), "ubuntu-latest");
        }
        for platform in MACOS_PLATFORMS {
            let family = PlatformFamily::from_platform(platform).unwrap();
            assert_eq!(family.runner_label(), "macos-latest");
        }
    }

    #[test]
    fn test_runner_label_to_friendly_name() {
        assert_eq!(
            PlatformFamily::from_runner_label("macos-latest").unwrap().as_str(),
            "macos"
        );
        assert_eq!(
            PlatformFamily::from_runner_label("windows-latest").unwrap().as_str(),
            "windows"
        );
        assert_eq!(
            PlatformFamily::from_runner_label("ubuntu-latest").unwrap().as_str(),
            "linux"
        );
    }

    #[test]
    fn test_unrecognized_platform() {
        let err = PlatformFamily::from_platform("freebsd-x64").unwrap_err();
        assert!(matches!(err, DispatchError::UnrecognizedPlatform(ref p) if p == "freebsd-x64"));
        assert!(PlatformFamily::from_platform("linux").is_err());
        assert!(PlatformFamily::from_runner_label("solaris-latest").is_err());
    }

    #[test]
    fn test_channel_classification() {
        assert_eq!(Channel::classify("12.0.0-nightly.20200717"), Channel::Nightly);
        assert_eq!(Channel::classify("11.0.0-beta.3"), Channel::Beta);
        assert_eq!(Channel::classify("10.1.2"), Channel::Stable);
    }

    #[test]
    fn test_channel_nightly_wins_tie() {
        assert_eq!(Channel::classify("12.0.0-beta-nightly.1"), Channel::Nightly);
    }

    #[test]
    fn test_serde_names() {
        let family: PlatformFamily = serde_json::from_str("\"macos\"").unwrap();
        assert_eq!(family, PlatformFamily::Macos);
        let channel: Channel = serde_json::from_str("\"beta\"").unwrap();
        assert_eq!(channel, Channel::Beta);
    }
}
