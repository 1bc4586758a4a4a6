//! sentinel-relay CLI - CI fan-out and report relay.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sentinel_relay::archive::{LogArchive, S3LogArchive};
use sentinel_relay::clock::SystemClock;
use sentinel_relay::config::{self, Config, RouteKind};
use sentinel_relay::github::GithubClient;
use sentinel_relay::relay::{self, HttpCallback, Relay, RelayOptions, WorkflowContext};
use sentinel_relay::report;
use sentinel_relay::server::{self, AppState};

#[derive(Parser)]
#[command(name = "sentinel-relay")]
#[command(about = "Fan out CI runs and relay their test reports", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "sentinel.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatch HTTP service
    Serve,

    /// Relay the report of the current workflow run to its registrant
    Relay {
        /// Report file written by the test run
        #[arg(short, long, default_value = "report/report.json")]
        report: PathBuf,

        /// Link to the registrant's source, included in the callback
        #[arg(long, default_value = relay::NOT_AVAILABLE)]
        source_link: String,
    },

    /// Normalize a report file and print the result
    Normalize {
        /// Report file to normalize
        path: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose when set
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve => serve(&cli.config).await,
        Commands::Relay {
            report,
            source_link,
        } => relay_report(&cli.config, report, source_link).await,
        Commands::Normalize { path, format } => normalize_report(&path, &format).await,
        Commands::Validate => validate_config(&cli.config),
    }
}

/// Loads the config file and applies environment overrides.
fn load_with_env(config_path: &Path, required: bool) -> Result<Config> {
    let mut config = if required || config_path.exists() {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        Config::default()
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}

async fn serve(config_path: &Path) -> Result<()> {
    let config = load_with_env(config_path, true)?;
    config.validate_server()?;
    info!("Loaded configuration from {}", config_path.display());

    let github = GithubClient::new(&config.github)?;
    let state = AppState::from_config(&config, Arc::new(github));

    let addr: SocketAddr = format!("{}:{}", config.relay.host, config.relay.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.relay.host, config.relay.port
            )
        })?;

    server::start_server(addr, state).await?;
    Ok(())
}

async fn relay_report(config_path: &Path, report: PathBuf, source_link: String) -> Result<()> {
    let config = load_with_env(config_path, false)?;

    let context = WorkflowContext::from_env(|key| std::env::var(key).ok())?;
    let payload = relay::load_event(&context.event_path).await?;
    info!(
        "Relaying {} report for session {}",
        payload.name, payload.session_token
    );

    let archive = payload.s3_credentials.as_ref().map(|credentials| {
        Arc::new(S3LogArchive::new(credentials, &config.storage.region)) as Arc<dyn LogArchive>
    });

    let relay = Relay::new(
        Arc::new(GithubClient::new(&config.github)?),
        archive,
        Arc::new(HttpCallback::new(config.github.timeout_secs)?),
        Arc::new(SystemClock),
    );

    let options = RelayOptions {
        report_path: report,
        source_link,
    };
    let outcome = relay.run(&payload, &context, &options).await?;

    report::print_summary(&outcome.body.report);
    Ok(())
}

async fn normalize_report(path: &Path, format: &str) -> Result<()> {
    let canonical = report::normalize_file(path, &SystemClock)
        .await
        .with_context(|| format!("Failed to normalize {}", path.display()))?;

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&canonical)?;
            println!("{}", json);
        }
        "text" => report::print_summary(&canonical),
        other => bail!("Unknown output format: {}", other),
    }

    Ok(())
}

fn validate_config(config_path: &Path) -> Result<()> {
    match load_with_env(config_path, true).and_then(|config| {
        config.validate_server()?;
        Ok(config)
    }) {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("Settings:");
            println!(
                "  Listen: {}:{}",
                config.relay.host, config.relay.port
            );
            println!(
                "  Minimum version: {}",
                config.relay.minimum_version.as_deref().unwrap_or("-")
            );
            println!("  GitHub owner: {}", config.github.owner);
            println!(
                "  Log archive: {}",
                config.storage.bucket.as_deref().unwrap_or("disabled")
            );
            println!("  Routes:");
            for (name, route) in &config.routes {
                let kind = match route.kind {
                    RouteKind::Dedicated => "dedicated",
                    RouteKind::Oss => "oss",
                };
                println!("    /{} -> {} ({})", name, route.repo, kind);
            }
            println!("  Registrants: {}", config.registrants.len());

            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}
