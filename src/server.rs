//! HTTP front door of the dispatch relay.
//!
//! - `GET /` - liveness probe
//! - `POST /{route}` - admission check for one registrant route; an admitted
//!   request also starts a CI workflow in the background

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tracing::{info, warn};

use crate::config::{Config, RouteConfig};
use crate::dispatch::{
    DispatchEligibility, DispatchError, DispatchRequest, RegistrantPolicy, TriggerPayload,
};
use crate::github::WorkflowTrigger;

/// Shared state for HTTP handlers. Immutable after start-up.
pub struct AppState {
    pub eligibility: DispatchEligibility,
    pub routes: BTreeMap<String, RouteConfig>,
    pub trigger: Arc<dyn WorkflowTrigger>,
}

impl AppState {
    /// Builds the state from a loaded configuration.
    pub fn from_config(config: &Config, trigger: Arc<dyn WorkflowTrigger>) -> Self {
        let eligibility = DispatchEligibility::new(
            config.relay.minimum_version.clone(),
            RegistrantPolicy::new(config.registrants.clone()),
            config.storage.credentials(),
        );

        Self {
            eligibility,
            routes: config.routes.clone(),
            trigger,
        }
    }
}

/// Create the HTTP router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/{route}", post(dispatch_handler))
        .with_state(Arc::new(state))
}

/// Binds `addr` and serves until the process is stopped.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn start_server(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await
}

async fn root_handler() -> &'static str {
    "Client Endpoint Up"
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match self {
            DispatchError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DispatchError::UnrecognizedPlatform(_) => StatusCode::BAD_REQUEST,
        };
        error_response(status, self.to_string())
    }
}

async fn dispatch_handler(
    State(state): State<Arc<AppState>>,
    Path(route_name): Path<String>,
    body: Result<Json<DispatchRequest>, JsonRejection>,
) -> Response {
    let Some(route) = state.routes.get(&route_name) else {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("Unknown route: {}", route_name),
        );
    };

    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(rejection.status(), rejection.body_text()),
    };

    info!(
        "Received {} request for {} {}",
        route_name, request.platform_install_data.platform, request.version_qualifier
    );

    let admission = match state.eligibility.evaluate(&route_name, route, &request) {
        Ok(admission) => admission,
        Err(e) => {
            warn!("Rejected {} request: {}", route_name, e);
            return e.into_response();
        }
    };

    if let Some(payload) = admission.trigger {
        spawn_trigger(state.trigger.clone(), route.repo.clone(), payload);
    }

    Json(admission.decision).into_response()
}

fn spawn_trigger(trigger: Arc<dyn WorkflowTrigger>, repo: String, payload: TriggerPayload) {
    tokio::spawn(async move {
        if let Err(e) = trigger.dispatch(&repo, &payload).await {
            warn!(
                "Failed to trigger {} for session {}: {}",
                repo, payload.session_token, e
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RegistrantConfig, RouteKind};
    use crate::dispatch::{Channel, PlatformFamily, StorageCredentials};
    use crate::github::{RemoteCallError, RemoteResult};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::collections::{BTreeSet, HashMap};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    struct ChannelTrigger {
        sent: mpsc::UnboundedSender<(String, TriggerPayload)>,
        fail: bool,
    }

    #[async_trait]
    impl WorkflowTrigger for ChannelTrigger {
        async fn dispatch(&self, repo: &str, payload: &TriggerPayload) -> RemoteResult<()> {
            let _ = self.sent.send((repo.to_string(), payload.clone()));
            if self.fail {
                return Err(RemoteCallError::Payload("boom".to_string()));
            }
            Ok(())
        }
    }

    fn routes() -> BTreeMap<String, RouteConfig> {
        BTreeMap::from([
            (
                "fiddle".to_string(),
                RouteConfig {
                    repo: "fiddle-sentinel".to_string(),
                    slug: Some("electron/fiddle".to_string()),
                    kind: RouteKind::Dedicated,
                },
            ),
            (
                "oss".to_string(),
                RouteConfig {
                    repo: "oss-sentinel".to_string(),
                    slug: None,
                    kind: RouteKind::Oss,
                },
            ),
        ])
    }

    fn state(
        minimum_version: Option<&str>,
        fail: bool,
    ) -> (AppState, mpsc::UnboundedReceiver<(String, TriggerPayload)>) {
        let (sent, received) = mpsc::unbounded_channel();
        let registrants = HashMap::from([(
            "electron/fiddle".to_string(),
            RegistrantConfig {
                platforms: BTreeSet::from([PlatformFamily::Linux]),
                channels: BTreeSet::from([Channel::Stable]),
            },
        )]);
        let credentials = StorageCredentials {
            bucket: "sentinel-logs".to_string(),
            access_id: "id".to_string(),
            access_key: "key".to_string(),
        };

        let app = AppState {
            eligibility: DispatchEligibility::new(
                minimum_version.map(str::to_string),
                RegistrantPolicy::new(registrants),
                Some(credentials),
            ),
            routes: routes(),
            trigger: Arc::new(ChannelTrigger { sent, fail }),
        };
        (app, received)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn request_body(platform: &str, version: &str) -> serde_json::Value {
        json!({
            "platformInstallData": {"platform": platform},
            "reportCallback": "https://example.com/report",
            "versionQualifier": version,
            "commitHash": "0567bb6"
        })
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_root_endpoint() {
        let (app, _rx) = state(Some("8.0.0"), false);
        let response = create_router(app)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"Client Endpoint Up");
    }

    #[tokio::test]
    async fn test_admitted_request_triggers_workflow() {
        let (app, mut rx) = state(Some("8.0.0"), false);
        let response = create_router(app)
            .oneshot(post_json("/fiddle", request_body("linux-x64", "10.0.0")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["reportsExpected"], 1);

        let (repo, payload) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(repo, "fiddle-sentinel");
        assert_eq!(payload.host_os.as_deref(), Some("ubuntu-latest"));
        assert_eq!(payload.name, "fiddle");
        assert_eq!(json["sessionToken"], payload.session_token.as_str());
        assert!(payload.s3_credentials.is_some());
    }

    #[tokio::test]
    async fn test_old_version_is_not_triggered() {
        let (app, mut rx) = state(Some("8.0.0"), false);
        let response = create_router(app)
            .oneshot(post_json("/fiddle", request_body("linux-x64", "7.3.2")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["reportsExpected"], 0);
        assert!(json["sessionToken"].as_str().unwrap().starts_with("0567bb6-"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_trigger_failure_keeps_decision() {
        let (app, mut rx) = state(Some("8.0.0"), true);
        let response = create_router(app)
            .oneshot(post_json("/fiddle", request_body("darwin-x64", "9.1.0")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["reportsExpected"], 1);

        let (_, payload) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload.host_os.as_deref(), Some("macos-latest"));
    }

    #[tokio::test]
    async fn test_oss_route_uses_policy() {
        let (app, _rx) = state(Some("8.0.0"), false);
        let router = create_router(app);

        let mut body = request_body("linux-x64", "10.0.0");
        body["registrant"] = json!("electron/fiddle");
        let response = router
            .clone()
            .oneshot(post_json("/oss", body.clone()))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["reportsExpected"], 1);

        body["platformInstallData"]["platform"] = json!("win32-x64");
        let response = router.oneshot(post_json("/oss", body)).await.unwrap();
        assert_eq!(json_body(response).await["reportsExpected"], 0);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (app, _rx) = state(Some("8.0.0"), false);
        let response = create_router(app)
            .oneshot(post_json("/nope", request_body("linux-x64", "10.0.0")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(json_body(response).await["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_unrecognized_platform() {
        let (app, _rx) = state(Some("8.0.0"), false);
        let response = create_router(app)
            .oneshot(post_json("/fiddle", request_body("solaris-sparc", "10.0.0")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_missing_minimum_version() {
        let (app, _rx) = state(None, false);
        let response = create_router(app)
            .oneshot(post_json("/fiddle", request_body("linux-x64", "10.0.0")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert!(json["error"].as_str().unwrap().starts_with("Configuration error"));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let (app, _rx) = state(Some("8.0.0"), false);
        let response = create_router(app)
            .oneshot(post_json("/fiddle", json!({"reportCallback": 1})))
            .await
            .unwrap();

        assert!(response.status().is_client_error());
        assert!(json_body(response).await["error"].is_string());
    }
}
