//! blobcopy -- start a server-side blob copy and report the destination.
//!
//! The process waits only until the storage service accepts the copy.
//! SIGTERM/SIGINT cancel that wait; a copy the service already accepted
//! keeps running server-side.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

use blobcopy::channel::azure::AzureChannelFactory;
use blobcopy::config::{load_config, Config, LoggingConfig};
use blobcopy::copy::{CopyArgs, CopyChannels, CopyOptions, CopyOrchestrator, CopyOutcome};
use blobcopy::errors::CopyError;
use blobcopy::transfer::azure::AzureCopyStarter;
use blobcopy::transfer::queue::QueuedTransferEngine;

/// Command-line arguments for blobcopy.
#[derive(Parser, Debug)]
#[command(name = "blobcopy", version, about = "Server-side blob copy")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Storage context for the source (defaults to `default_context`).
    #[arg(long, global = true)]
    context: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start copying one blob server-side.
    CopyBlob(CopyBlobArgs),
}

#[derive(Args, Debug)]
struct CopyBlobArgs {
    /// Source container name.
    #[arg(long)]
    src_container: Option<String>,

    /// Source blob name.
    #[arg(long)]
    src_blob: Option<String>,

    /// Destination container name.
    #[arg(long)]
    dest_container: Option<String>,

    /// Destination blob name (defaults to the source blob name).
    #[arg(long)]
    dest_blob: Option<String>,

    /// Source URL the service reads directly (may carry a SAS).
    #[arg(long)]
    src_uri: Option<Url>,

    /// URL of an existing source blob.
    #[arg(long)]
    src_ref: Option<Url>,

    /// URL of an existing source container.
    #[arg(long)]
    src_container_ref: Option<Url>,

    /// URL of the destination blob.
    #[arg(long)]
    dest_ref: Option<Url>,

    /// Storage context for the destination (defaults to the source context).
    #[arg(long)]
    dest_context: Option<String>,

    /// Accepted for compatibility; has no effect.
    #[arg(long)]
    force: bool,
}

impl CopyBlobArgs {
    fn copy_args(&self) -> CopyArgs {
        CopyArgs {
            src_container: self.src_container.clone(),
            src_blob: self.src_blob.clone(),
            dest_container: self.dest_container.clone(),
            dest_blob: self.dest_blob.clone(),
            src_uri: self.src_uri.clone(),
            src_ref: self.src_ref.clone(),
            src_container_ref: self.src_container_ref.clone(),
            dest_ref: self.dest_ref.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("ConfigurationError: failed to load {}: {}", path.display(), e);
                std::process::exit(2);
            }
        },
        None => Config::default(),
    };

    init_tracing(&config.logging);
    if let Some(path) = &cli.config {
        info!("Loaded configuration from {}", path.display());
    }

    let write_metrics = config.observability.metrics && !config.observability.metrics_path.is_empty();
    if write_metrics {
        blobcopy::metrics::init_metrics()?;
        blobcopy::metrics::describe_metrics();
    }

    let Command::CopyBlob(args) = cli.command;
    let exit_code = match copy_blob(&config, cli.context, &args).await {
        Ok(CopyOutcome::Copied(record)) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            0
        }
        Ok(CopyOutcome::Pending(pending)) => {
            println!("{}", pending);
            0
        }
        Err(e) => {
            error!(code = e.code(), "{}", e);
            eprintln!("{}: {}", e.code(), e);
            e.exit_code()
        }
    };

    if write_metrics {
        let path = &config.observability.metrics_path;
        if let Err(e) = blobcopy::metrics::write_textfile(path) {
            warn!("Failed to write metrics to {}: {}", path, e);
        }
    }

    std::process::exit(exit_code);
}

/// Initialize tracing on stderr so stdout carries only the result.
/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.init(),
    }
}

async fn copy_blob(
    config: &Config,
    context: Option<String>,
    args: &CopyBlobArgs,
) -> Result<CopyOutcome, CopyError> {
    // Shape selection happens before any channel is opened.
    let input = args.copy_args().into_input()?;

    let source_context = context.unwrap_or_else(|| config.default_context.clone());
    let factory = Arc::new(AzureChannelFactory::new(config.clone()).map_err(|e| {
        CopyError::Channel {
            context: source_context.clone(),
            reason: e.to_string(),
        }
    })?);
    let channels = CopyChannels::open(
        factory.as_ref(),
        &source_context,
        args.dest_context.as_deref(),
    )?;

    let starter = Arc::new(AzureCopyStarter::new(
        factory.as_ref(),
        &channels.source_context,
        &channels.destination_context,
    )?);
    let engine = Arc::new(QueuedTransferEngine::start(starter, &config.transfer));
    let orchestrator = CopyOrchestrator::new(channels, engine.clone());

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(shutdown_signal(cancel.clone()));

    let result = orchestrator
        .copy_blob(input, CopyOptions { force: args.force }, &cancel)
        .await;

    watcher.abort();
    engine.shutdown();
    result
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then cancel the acceptance wait.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, cancelling copy");
        },
        _ = terminate => {
            info!("Received SIGTERM, cancelling copy");
        },
    }
    cancel.cancel();
}
