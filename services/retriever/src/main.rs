//! Regional forecast retriever.
//!
//! Command line front end for the adaptor library: checks and normalizes
//! requests, decodes field headers, writes decoder parameter tables and runs
//! retrievals against a local directory of fields.

mod commands;
mod config;
mod local_source;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use adaptors::Backends;
use config::{LoggingConfig, RetrieverConfig};
use definitions::Registry;
use local_source::LocalDirectorySource;

#[derive(Parser, Debug)]
#[command(name = "retriever")]
#[command(about = "Regional forecast data retriever")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/retriever.yaml", env = "RETRIEVER_CONFIG")]
    config: PathBuf,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a request and report its constrained form, cost and licences
    Check {
        /// Request JSON file
        request: PathBuf,
    },
    /// Translate a request into its backend form
    Normalize {
        /// Request JSON file
        request: PathBuf,
    },
    /// Reconstruct the backend request for a decoded field header
    Decode {
        /// Header JSON file
        header: PathBuf,
    },
    /// Write decoder definition files for synthesized parameters
    ParamTable {
        /// Output directory
        #[arg(short, long, default_value = "definitions")]
        out: PathBuf,
    },
    /// Retrieve fields and write the result files
    Retrieve {
        /// Request JSON file
        request: PathBuf,

        /// Output directory (overrides the config file)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = config::load_config(&args.config)?;
    init_tracing(&config.logging, args.log_level.as_deref())?;
    info!(config = ?args.config, adaptor = %config.adaptor.kind.as_str(), "Starting retriever");

    if config.metrics.enabled {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.metrics.port))
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(port = config.metrics.port, "Metrics exporter listening");
    }

    let registry = Arc::new(load_registry(&config)?);
    info!(
        variables = registry.variable_count(),
        models = registry.model_count(),
        "Loaded definitions"
    );

    let report = match args.command {
        Commands::Check { request } => {
            let request = commands::read_request(&request)?;
            commands::check(&config.adaptor, registry, &request)?
        }
        Commands::Normalize { request } => {
            let request = commands::read_request(&request)?;
            commands::normalize_request(&registry, &request)?
        }
        Commands::Decode { header } => commands::decode_header(registry, &header)?,
        Commands::ParamTable { out } => commands::write_param_table(registry, &out)?,
        Commands::Retrieve { request, output } => {
            let request = commands::read_request(&request)?;
            let output_dir = output.unwrap_or_else(|| config.output_dir.clone());
            run_retrieve(&config, registry, &request, &output_dir).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_retrieve(
    config: &RetrieverConfig,
    registry: Arc<Registry>,
    request: &adaptor_common::Request,
    output_dir: &Path,
) -> Result<serde_json::Value> {
    let backends = Backends::new().with_source(Arc::new(LocalDirectorySource::new(
        config.source.directory.clone(),
    )));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling retrieval");
            trigger.cancel();
        }
    });

    commands::retrieve(&config.adaptor, registry, backends, request, output_dir, &cancel).await
}

fn load_registry(config: &RetrieverConfig) -> Result<Registry> {
    let registry = match &config.definitions_path {
        Some(path) => Registry::load_path(path),
        None => Registry::load_default(),
    };
    registry.context("Failed to load definitions")
}

fn init_tracing(logging: &LoggingConfig, override_level: Option<&str>) -> Result<()> {
    let level = match override_level.unwrap_or(&logging.level).to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if logging.format == "pretty" {
        tracing::subscriber::set_global_default(builder.pretty().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    }
    Ok(())
}
