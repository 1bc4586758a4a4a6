//! Composition of the version gate, registrant policy and session token into
//! one admission decision per request.

use tracing::{debug, info};

use super::platform::PlatformFamily;
use super::policy::RegistrantPolicy;
use super::session::SessionToken;
use super::version;
use super::{
    DispatchDecision, DispatchError, DispatchRequest, StorageCredentials, TriggerPayload,
};
use crate::config::{RouteConfig, RouteKind};

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    /// Returned to the caller verbatim.
    pub decision: DispatchDecision,

    /// Present only when `decision.reports_expected == 1`.
    pub trigger: Option<TriggerPayload>,
}

impl Admission {
    fn rejected(session_token: SessionToken) -> Self {
        Self {
            decision: DispatchDecision::rejected(session_token),
            trigger: None,
        }
    }
}

/// Decides, per request, whether a CI run should be dispatched.
///
/// All inputs are injected at construction; evaluation is pure.
#[derive(Debug, Clone)]
pub struct DispatchEligibility {
    minimum_version: Option<String>,
    policy: RegistrantPolicy,
    credentials: Option<StorageCredentials>,
}

impl DispatchEligibility {
    /// Creates an evaluator.
    ///
    /// The minimum version is validated on every evaluation rather than here,
    /// so a misconfigured relay still starts and reports the problem per
    /// request.
    pub fn new(
        minimum_version: Option<String>,
        policy: RegistrantPolicy,
        credentials: Option<StorageCredentials>,
    ) -> Self {
        Self {
            minimum_version,
            policy,
            credentials,
        }
    }

    /// Evaluates a request arriving on the named route.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Config`] if the minimum version is unset or invalid.
    /// - [`DispatchError::UnrecognizedPlatform`] if the request's platform is
    ///   unknown.
    pub fn evaluate(
        &self,
        route_name: &str,
        route: &RouteConfig,
        request: &DispatchRequest,
    ) -> Result<Admission, DispatchError> {
        let minimum = version::clean_minimum(self.minimum_version.as_deref())?;

        let registrant = registrant_slug(route_name, route, request);
        let session_token = SessionToken::generate(
            &request.commit_hash,
            &request.version_qualifier,
            registrant,
        );

        let family = PlatformFamily::from_platform(&request.platform_install_data.platform)?;

        if route.kind == RouteKind::Oss
            && !self
                .policy
                .is_admitted(registrant, family, &request.version_qualifier)
        {
            info!(
                "Registrant {} not admitted for {} {}",
                registrant, family, request.version_qualifier
            );
            return Ok(Admission::rejected(session_token));
        }

        if !version::is_eligible(&minimum, &request.version_qualifier) {
            info!(
                "Version {} is below minimum {}",
                request.version_qualifier, minimum
            );
            return Ok(Admission::rejected(session_token));
        }

        debug!("Admitted {} on {} ({})", registrant, family, session_token);

        let trigger = TriggerPayload {
            host_os: Some(family.runner_label().to_string()),
            session_token: session_token.clone(),
            report_callback: request.report_callback.clone(),
            version_qualifier: request.version_qualifier.clone(),
            platform_install_data: request.platform_install_data.clone(),
            name: route_name.to_string(),
            s3_credentials: self.credentials.clone(),
        };

        Ok(Admission {
            decision: DispatchDecision::accepted(session_token),
            trigger: Some(trigger),
        })
    }
}

/// Registrant slug the session token and policy lookup are keyed on.
///
/// Multi-tenant routes take it from the request body; dedicated routes use
/// the configured slug, falling back to the route name.
fn registrant_slug<'a>(
    route_name: &'a str,
    route: &'a RouteConfig,
    request: &'a DispatchRequest,
) -> &'a str {
    match route.kind {
        RouteKind::Oss => request.registrant.as_deref().unwrap_or_default(),
        RouteKind::Dedicated => route.slug.as_deref().unwrap_or(route_name),
    }
}
