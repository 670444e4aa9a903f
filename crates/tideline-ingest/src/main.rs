//! Tideline ingest CLI.
//!
//! Reads structured log records (JSONL) and streams them into a Modality
//! ingestion endpoint, one timeline per machine.
//!
//! # Usage
//!
//! ```bash
//! # Stream a log file into the endpoint configured in the environment
//! MODALITY_INGEST_URL=modality-ingest://localhost:14182 \
//! MODALITY_AUTH_TOKEN=... \
//!     tideline-ingest --input logs/run.jsonl
//!
//! # Show what would be sent, without connecting anywhere
//! cat logs/run.jsonl | tideline-ingest --dry-run
//! ```
//!
//! # Graceful Shutdown
//!
//! Ctrl+C stops reading input; the open timeline is closed, the client is
//! flushed and released before exit.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tideline_core::metrics::init_metrics;
use tideline_ingest::{
    Config, Emission, IngestClient, JsonlConfig, JsonlInput, JsonlSource, LogLevel, RecordSource,
    RecordingClient, TelemetryBackend,
};
use tracing_subscriber::EnvFilter;

/// Tideline ingest CLI.
#[derive(Parser, Debug)]
#[command(name = "tideline-ingest")]
#[command(about = "Stream structured log records into per-entity Modality timelines")]
#[command(version)]
struct Args {
    /// Input JSONL file or directory, or `-` for stdin
    #[arg(long, short, default_value = "-")]
    input: String,

    /// Minimum record level to send (overrides TIDELINE_MIN_LEVEL)
    #[arg(long)]
    min_level: Option<LogLevel>,

    /// Record and log client calls instead of connecting
    #[arg(long)]
    dry_run: bool,

    /// Accept self-signed certificates (overrides MODALITY_ALLOW_INSECURE_TLS)
    #[arg(long)]
    allow_insecure_tls: bool,

    /// Name of the global timeline (overrides TIDELINE_GLOBAL_TIMELINE)
    #[arg(long)]
    global_timeline_name: Option<String>,

    /// Stop at the first bad line or failed event
    #[arg(long)]
    fail_fast: bool,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "0")]
    metrics_port: u16,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.metrics_port > 0 {
        init_metrics(args.metrics_port).context("Failed to start metrics exporter")?;
    }

    let config = load_config(&args)?;

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping gracefully...");
        running_clone.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    if args.dry_run {
        let backend = TelemetryBackend::start(&config, || Ok(RecordingClient::new().verbose()));
        return run(backend, &args, &running);
    }

    run_native(&config, &args, &running)
}

#[cfg(feature = "native")]
fn run_native(config: &Config, args: &Args, running: &AtomicBool) -> Result<()> {
    let backend = TelemetryBackend::start(config, tideline_ingest::NativeClient::new);
    run(backend, args, running)
}

#[cfg(not(feature = "native"))]
fn run_native(_config: &Config, _args: &Args, _running: &AtomicBool) -> Result<()> {
    bail!("built without the `native` feature; rebuild with `--features native` or pass --dry-run")
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = if args.dry_run {
        Config::from_env_dry_run()
    } else {
        Config::from_env()
    }
    .context("Failed to load configuration")?;

    if let Some(level) = args.min_level {
        config.min_level = level;
    }
    if args.allow_insecure_tls {
        config.allow_insecure_tls = true;
    }
    if let Some(name) = &args.global_timeline_name {
        config.global_timeline_name = name.clone();
    }
    Ok(config)
}

fn run<C: IngestClient>(
    backend: TelemetryBackend<C>,
    args: &Args,
    running: &AtomicBool,
) -> Result<()> {
    let Some(pipeline) = backend.pipeline() else {
        bail!("Ingest backend failed to start; see the log above");
    };

    let mut source = JsonlSource::new(JsonlConfig {
        input: JsonlInput::parse(&args.input),
        continue_on_error: !args.fail_fast,
        ..Default::default()
    });
    tracing::info!(source = source.name(), input = %args.input, "Starting ingestion");

    let mut submitted = 0usize;
    let mut filtered = 0usize;

    let result = source.process(|record| {
        if !running.load(Ordering::SeqCst) {
            return Ok(false);
        }
        match pipeline.emit(&record)? {
            Emission::Submitted { .. } => submitted += 1,
            Emission::Filtered => filtered += 1,
        }
        Ok(true)
    });

    tracing::info!("Shutting down...");
    backend.shutdown();
    let stats = result.context("Ingestion failed")?;

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("INGESTION COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Records read:         {}", stats.total_records);
    tracing::info!("Events submitted:     {}", submitted);
    tracing::info!("Records filtered:     {}", filtered);
    tracing::info!("Parse errors:         {}", stats.parse_errors);
    tracing::info!("Failed events:        {}", stats.handler_errors);

    Ok(())
}
