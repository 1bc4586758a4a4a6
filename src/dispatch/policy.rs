//! Per-registrant platform and channel subscriptions.

use std::collections::HashMap;

use tracing::debug;

use super::platform::{Channel, PlatformFamily};
use crate::config::RegistrantConfig;

/// Admission policy for multi-tenant registrants.
///
/// Loaded once from the `[registrants]` table and never mutated.
#[derive(Debug, Clone, Default)]
pub struct RegistrantPolicy {
    registrants: HashMap<String, RegistrantConfig>,
}

impl RegistrantPolicy {
    pub fn new(registrants: HashMap<String, RegistrantConfig>) -> Self {
        Self { registrants }
    }

    /// Returns the subscriptions declared for a registrant, if any.
    pub fn get(&self, registrant: &str) -> Option<&RegistrantConfig> {
        self.registrants.get(registrant)
    }

    /// Decides whether a registrant receives runs for this platform family
    /// and version qualifier.
    ///
    /// An unregistered registrant is denied rather than treated as an error.
    pub fn is_admitted(
        &self,
        registrant: &str,
        family: PlatformFamily,
        version_qualifier: &str,
    ) -> bool {
        let Some(entry) = self.registrants.get(registrant) else {
            debug!("Registrant {} is not registered", registrant);
            return false;
        };

        if !entry.platforms.contains(&family) {
            debug!("Registrant {} does not subscribe to {}", registrant, family);
            return false;
        }

        let channel = Channel::classify(version_qualifier);
        if !entry.channels.contains(&channel) {
            debug!("Registrant {} does not subscribe to {}", registrant, channel);
            return false;
        }

        true
    }
}
