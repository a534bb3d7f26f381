//! Sentinel Main Binary
//!
//! Wires the components together:
//! - Storage: append-only NDJSON logs for samples and anomalies
//! - Ingestion: sliding-window detection pipeline and log tailing
//! - API: HTTP ingestion, queries and server-sent event streams
//! - Generator: synthetic sample producer

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sentinel_api::prelude::*;
use sentinel_core::{config::Config, types::Channel};
use sentinel_detection::detectors::DetectionConfig;
use sentinel_ingestion::prelude::*;
use sentinel_ingestion::{HttpSink, PipelineSink};
use sentinel_storage::{AppendLog, FileAppendLog, LogReader, Offset};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::{signal, sync::watch};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG_PATH: &str = "config/sentinel.yaml";

/// How often histogram buckets are drained for the exporter
const METRICS_UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Sentinel CLI arguments
#[derive(Debug, Parser)]
#[clap(name = "sentinel", version, about = "Streaming sliding-window anomaly detection")]
struct Cli {
    /// Configuration file path
    #[clap(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[clap(long, env = "SENTINEL_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging
    #[clap(long, env = "SENTINEL_LOG_JSON", global = true)]
    log_json: bool,

    /// Validate configuration and exit
    #[clap(long, global = true)]
    dry_run: bool,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the detection service (default if no subcommand given)
    Serve {
        /// Also run the synthetic producer in-process
        #[clap(long)]
        with_generator: bool,
    },
    /// Post synthetic samples to a running service
    Generate {
        /// Detect endpoint (defaults to generator.target_url)
        #[clap(long)]
        url: Option<String>,

        /// Seed for reproducible output
        #[clap(long)]
        seed: Option<u64>,
    },
    /// Print a persisted log, one JSON record per line
    Replay {
        /// Channel to print (data, anomalies)
        #[clap(long, default_value = "anomalies")]
        channel: Channel,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    info!("Starting Sentinel v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;

    if cli.dry_run {
        info!("Dry run mode - configuration validated, exiting");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Serve { with_generator }) => run_serve_command(config, with_generator).await,
        None => run_serve_command(config, false).await,
        Some(Commands::Generate { url, seed }) => run_generate_command(config, url, seed).await,
        Some(Commands::Replay { channel }) => run_replay_command(config, channel).await,
    }
}

/// Load configuration, falling back to defaults when the default file is absent
fn load_config(cli: &Cli) -> Result<Config> {
    info!("Loading configuration from: {:?}", cli.config);

    if !cli.config.exists() && cli.config == PathBuf::from(DEFAULT_CONFIG_PATH) {
        warn!(
            path = ?cli.config,
            "Configuration file not found, using defaults"
        );
        return Config::from_env().context("Invalid configuration");
    }

    let config = Config::from_file(&cli.config).context("Failed to load configuration")?;
    info!("Configuration loaded successfully");
    Ok(config)
}

/// Run the serve subcommand (default behavior)
async fn run_serve_command(config: Config, with_generator: bool) -> Result<()> {
    let api_config = ApiConfig::from_config(&config).context("Invalid server address")?;

    let log: Arc<dyn AppendLog> = Arc::new(FileAppendLog::new(&config.storage));
    if let Err(e) = log.health_check().await {
        warn!(error = %e, "Storage not reachable at startup");
    }

    let pipeline = Arc::new(
        Pipeline::new(DetectionConfig::from(&config.detection), log.clone())
            .context("Failed to create detection pipeline")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tailer = LogTailer::new(log, config.streaming.poll_interval()).with_shutdown(shutdown_rx.clone());

    let state = AppState::new(
        pipeline.clone(),
        tailer,
        Duration::from_secs(config.streaming.keep_alive_secs),
    )
    .with_version(env!("CARGO_PKG_VERSION"));
    let state = match init_metrics() {
        Some(handle) => state.with_metrics(handle),
        None => state,
    };

    let generator = if with_generator {
        let sink: Arc<dyn SampleSink> = Arc::new(PipelineSink::new(pipeline));
        let generator = SampleGenerator::new(config.generator.clone());
        Some(tokio::spawn(generator.run(sink, shutdown_rx)))
    } else {
        None
    };

    info!(
        data_dir = ?config.storage.data_dir,
        window_size = config.detection.window_size,
        threshold_multiplier = config.detection.threshold_multiplier,
        with_generator,
        "Sentinel configured"
    );

    // Flip the watch first so open event streams end and graceful shutdown can drain
    let shutdown = async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    };

    let result = ApiServer::new(api_config, state)
        .serve(shutdown)
        .await
        .context("API server failed");

    if let Some(handle) = generator {
        match handle.await {
            Ok(delivered) => info!(delivered, "Generator finished"),
            Err(e) => error!(error = %e, "Generator task failed"),
        }
    }

    result
}

/// Install the Prometheus recorder behind the `metrics` facade
fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let upkeep = handle.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(METRICS_UPKEEP_INTERVAL);
                loop {
                    interval.tick().await;
                    upkeep.run_upkeep();
                }
            });
            info!("Prometheus metrics recorder installed");
            Some(handle)
        }
        Err(e) => {
            warn!(error = %e, "Failed to install metrics recorder, metrics disabled");
            None
        }
    }
}

/// Run the generate subcommand
async fn run_generate_command(config: Config, url: Option<String>, seed: Option<u64>) -> Result<()> {
    let url = url.unwrap_or_else(|| config.generator.target_url.clone());
    info!(url = %url, "Posting synthetic samples");

    let sink: Arc<dyn SampleSink> = Arc::new(HttpSink::new(url));
    let generator = match seed {
        Some(seed) => SampleGenerator::with_seed(config.generator, seed),
        None => SampleGenerator::new(config.generator),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(generator.run(sink, shutdown_rx));

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    let delivered = handle.await.context("Generator task failed")?;
    info!(delivered, "Generator finished");
    Ok(())
}

/// Run the replay subcommand
async fn run_replay_command(config: Config, channel: Channel) -> Result<()> {
    let log: Arc<dyn AppendLog> = Arc::new(FileAppendLog::new(&config.storage));
    let mut reader = LogReader::open(log, channel, Offset::START);

    let (records, end) = reader
        .read_available()
        .await
        .with_context(|| format!("Failed to read the {} log", channel))?;

    for record in &records {
        let line = record
            .text()
            .with_context(|| format!("Record at offset {} is not valid UTF-8", record.offset))?;
        println!("{}", line);
    }

    info!(channel = %channel, records = records.len(), offset = %end, "Replay complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or CTRL+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C, shutting down..."); },
        _ = terminate => { info!("Received SIGTERM, shutting down..."); },
    }
}

/// Initialize logging based on CLI arguments
fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .context("Invalid log level")?;

    if cli.log_json {
        // JSON structured logging
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .with(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(log_level.into()),
            )
            .init();
    } else {
        // Human-readable logging
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .with(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(log_level.into()),
            )
            .init();
    }

    info!("Logging initialized at level: {}", log_level);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["sentinel", "serve", "--with-generator"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Serve { with_generator: true })
        ));

        let cli = Cli::try_parse_from(["sentinel", "replay", "--channel", "data"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Replay { channel: Channel::Data })
        ));

        let cli = Cli::try_parse_from(["sentinel", "generate", "--url", "http://x/detect"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Generate { url: Some(_), seed: None })));

        assert!(Cli::try_parse_from(["sentinel", "replay", "--channel", "bogus"]).is_err());
    }

    #[test]
    fn test_missing_default_config_falls_back() {
        let cli = Cli::try_parse_from(["sentinel", "--config", DEFAULT_CONFIG_PATH]).unwrap();
        if !cli.config.exists() {
            let config = load_config(&cli).unwrap();
            assert_eq!(config.detection.window_size, 10);
        }
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let cli = Cli::try_parse_from(["sentinel", "--config", "/nonexistent/sentinel.yaml"]).unwrap();
        assert!(load_config(&cli).is_err());
    }
}
