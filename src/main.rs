// mcpspy - cognitive observability proxy for MCP servers
//
// The host launches this binary in place of a real MCP server; we spawn the
// real server, forward stdio byte-for-byte, and capture every JSON-RPC
// message into append-only JSONL streams. Separate subcommands correlate the
// streams into interaction flows, score them for cognitive load, assemble
// usability reports, and export live telemetry.
//
// Architecture:
// - Proxy (tokio): three forwarding tasks + a capture worker behind a queue
// - Store: JSONL append logs under the user's data directory
// - Timeline: timestamp-proximity flow reconstruction
// - Scoring: rule-based cognitive load + usability issues
// - Telemetry: interval loop publishing to a pluggable backend

mod cli;
mod config;
mod decision;
mod error;
mod events;
mod proxy;
mod report;
mod rewriter;
mod scoring;
mod store;
mod telemetry;
mod timeline;
mod util;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use scoring::CognitiveScorer;
use std::path::PathBuf;
use store::EventStore;
use telemetry::{BackendHandle, TelemetryExporter};
use timeline::TimelineCorrelator;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config subcommand runs before any logging setup touches the terminal
    if let Commands::Config {
        show,
        reset,
        edit,
        update,
        path,
    } = &cli.command
    {
        cli::handle_config(*show, *reset, *edit, *update, *path);
        return Ok(());
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();
    let config = Config::from_env();

    init_logging(&config);

    match cli.command {
        Commands::Proxy {
            target_command,
            target_args,
            server_name,
            cwd,
        } => run_proxy(&config, target_command, target_args, server_name, cwd).await,
        Commands::Install { server, config: path } => {
            let path = path.unwrap_or_else(rewriter::default_config_path);
            rewriter::install(&path, &server)
                .with_context(|| format!("install failed for `{server}`"))?;
            println!("Proxied `{}` in {}", server, path.display());
            println!("Restart the host so it picks up the new launch command.");
            Ok(())
        }
        Commands::Restore { config: path } => {
            let path = path.unwrap_or_else(rewriter::default_config_path);
            rewriter::restore(&path).context("restore failed")?;
            println!("Restored {}", path.display());
            Ok(())
        }
        Commands::Unwrap { config: path } => {
            let path = path.unwrap_or_else(rewriter::default_config_path);
            run_unwrap(&path)
        }
        Commands::Report {
            server,
            since_hours,
        } => {
            let store = EventStore::new(&config.store.data_dir)?;
            let correlator = TimelineCorrelator::new(store, config.timeline.time_window_seconds);
            let scorer = CognitiveScorer::new(config.scoring.baseline_latency_ms);

            let report = report::generate(&correlator, &scorer, &server, since_hours);
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Export { interval_secs } => {
            let mut telemetry_config = config.telemetry.clone();
            if let Some(interval) = interval_secs {
                telemetry_config.export_interval_secs = interval;
            }

            let store = EventStore::new(&config.store.data_dir)?;
            let correlator = TimelineCorrelator::new(store, config.timeline.time_window_seconds);
            let scorer = CognitiveScorer::new(config.scoring.baseline_latency_ms);

            let handle = BackendHandle::from_config(&telemetry_config);
            let exporter = TelemetryExporter::new(
                handle.backend(),
                correlator,
                scorer,
                telemetry_config,
            );

            let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
            let loop_handle = tokio::spawn(exporter.run(shutdown_rx));

            tokio::signal::ctrl_c().await?;
            tracing::info!("shutting down telemetry export");
            let _ = shutdown_tx.send(());
            let _ = loop_handle.await;
            handle.flush();
            Ok(())
        }
        Commands::Config { .. } => unreachable!("handled above"),
    }
}

/// Logging goes to stderr (stdout belongs to the forwarded wire) plus an
/// optional daily-rotated file.
///
/// Precedence: RUST_LOG env var > config file > default "info".
fn init_logging(config: &Config) {
    let default_filter = format!("mcpspy={}", config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if config.logging.file_enabled {
        let appender = tracing_appender::rolling::daily(
            &config.logging.file_dir,
            format!("{}.log", config.logging.file_prefix),
        );
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(appender)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
    }
}

/// Run the proxy, with the telemetry loop alongside when enabled.
async fn run_proxy(
    config: &Config,
    target_command: String,
    target_args: Vec<String>,
    server_name: Option<String>,
    cwd: Option<PathBuf>,
) -> Result<()> {
    let server_name = server_name
        .or_else(|| std::env::var("MCP_SERVER_NAME").ok())
        .unwrap_or_else(|| "unknown".to_string());
    let working_dir = cwd.or_else(|| std::env::var("MCP_TARGET_CWD").ok().map(PathBuf::from));

    // Telemetry rides along with the proxy when enabled
    let telemetry_shutdown = if config.telemetry.enabled {
        let store = EventStore::new(&config.store.data_dir)?;
        let correlator = TimelineCorrelator::new(store, config.timeline.time_window_seconds);
        let scorer = CognitiveScorer::new(config.scoring.baseline_latency_ms);
        let handle = BackendHandle::from_config(&config.telemetry);
        let exporter = TelemetryExporter::new(
            handle.backend(),
            correlator,
            scorer,
            config.telemetry.clone(),
        );

        let (tx, rx) = tokio::sync::oneshot::channel();
        let join = tokio::spawn(exporter.run(rx));
        Some((tx, join, handle))
    } else {
        None
    };

    let result = proxy::run(
        config,
        proxy::ProxyOptions {
            target_command,
            target_args,
            working_dir,
            server_name,
        },
    )
    .await;

    if let Some((tx, join, handle)) = telemetry_shutdown {
        let _ = tx.send(());
        let _ = join.await;
        handle.flush();
    }

    // Spawn failure is the one fatal proxy error: non-zero exit for the host
    result.context("proxy session failed")
}

fn run_unwrap(path: &PathBuf) -> Result<()> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut document: serde_json::Value =
        serde_json::from_str(&contents).context("parsing host config")?;

    let peeled = rewriter::unwrap_document(&mut document);
    if peeled == 0 {
        println!("Configuration is already clean - no recursion detected");
        return Ok(());
    }

    // Keep a backup of the recursive state before healing it
    let backup = path.with_extension("json.backup");
    std::fs::write(&backup, &contents)
        .with_context(|| format!("writing backup {}", backup.display()))?;
    std::fs::write(path, serde_json::to_string_pretty(&document)?)
        .with_context(|| format!("writing {}", path.display()))?;

    println!(
        "Removed {} recursive proxy layer(s); backup at {}",
        peeled,
        backup.display()
    );
    Ok(())
}
