//! beaver-replay: run a recorded thread session against an in-memory library.
//!
//! Reads a replay file (library items, optional persisted thread, stream
//! events and user actions), drives a thread session through it and prints
//! the resulting citations and sources as JSON.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use beaver_citations::MissingSourcePolicy;
use beaver_session::{Replay, SessionConfig};

#[derive(Parser)]
#[command(name = "beaver-replay")]
#[command(author, version, about = "Replay a Beaver chat thread and print its citations")]
struct Cli {
    /// Replay file (JSON)
    input: PathBuf,

    /// Session config file (default: $BEAVER_CONFIG, then ~/.config/beaver/beaver.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the missing source policy (drop | placeholder)
    #[arg(long)]
    missing_source_policy: Option<MissingSourcePolicy>,

    /// Write output here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Compact JSON output
    #[arg(long)]
    compact: bool,
}

/// Initialize tracing.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors
///   RUST_LOG    - standard env filter (default: "beaver_session=info,beaver_citations=info")
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "beaver_session=info,beaver_citations=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    // Output goes to stdout, so console logs go to stderr.
    let guard = if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("beaver-replay.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stderr)"),
        "Logging initialized"
    );
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_logging();

    let cli = Cli::parse();

    let mut config = SessionConfig::load_from(cli.config.as_deref())
        .context("failed to load session config")?;
    if let Some(policy) = cli.missing_source_policy {
        config.missing_source_policy = policy;
    }
    info!(
        lookup_concurrency = config.lookup_concurrency,
        missing_source_policy = %config.missing_source_policy,
        "Session config loaded"
    );

    let replay = Replay::from_path(&cli.input)
        .with_context(|| format!("failed to read replay {}", cli.input.display()))?;
    let output = replay.run(config).await.context("replay failed")?;

    let json = if cli.compact {
        serde_json::to_string(&output)?
    } else {
        serde_json::to_string_pretty(&output)?
    };

    match cli.output {
        Some(path) => std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}
