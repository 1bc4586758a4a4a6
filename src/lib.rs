//! sentinel-relay: CI fan-out and test report relay.
//!
//! A registrant asks the relay to test a build on one platform. The relay
//! decides whether the request is eligible, starts a CI workflow for it, and
//! later turns whatever report that workflow produced into one canonical
//! result for the registrant's callback.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Dispatch**: admission decisions (version gate, registrant policy,
//!   session tokens)
//! - **Report**: framework detection and normalization (TAP, Mocha, Jest)
//! - **Server**: the HTTP front door that triggers workflows
//! - **Relay**: the in-workflow side that archives logs and posts results
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sentinel_relay::config::load_config;
//! use sentinel_relay::github::GithubClient;
//! use sentinel_relay::server::{AppState, start_server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config(std::path::Path::new("sentinel.toml"))?;
//!     let github = GithubClient::new(&config.github)?;
//!     let state = AppState::from_config(&config, Arc::new(github));
//!     start_server("0.0.0.0:3000".parse()?, state).await?;
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod github;
pub mod relay;
pub mod report;
pub mod server;

// Re-export commonly used types
pub use config::{Config, load_config};
pub use dispatch::{DispatchDecision, DispatchEligibility, DispatchError, DispatchRequest};
pub use report::{CanonicalReport, ReportError, ReportFormat, ReportStatus, normalize};
