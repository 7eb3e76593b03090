mod config;

use binstore::{DocumentService, RetryPolicy, StoreError, WriteError};
use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use inspections::errors::InspectionsError;
use metrics_exporter_statsd::StatsdBuilder;
use shared::metrics_defs::describe_all;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const METRICS_PREFIX: &str = "qcform";

#[derive(Parser)]
#[command(name = "qcform", about = "Quality inspection records service")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the inspections API and the admin endpoints
    Serve(ServeArgs),
    /// Rewrite a document as a flat list with one entry per id
    Repair(RepairArgs),
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long)]
    config: PathBuf,
}

#[derive(Args)]
struct RepairArgs {
    #[arg(long)]
    config: PathBuf,
    /// Document to repair; defaults to the records document
    #[arg(long)]
    document: Option<String>,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("could not install metrics exporter: {0}")]
    Metrics(String),
    #[error(transparent)]
    Inspections(#[from] InspectionsError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting");
            eprintln!("qcform: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = match &cli.command {
        CliCommand::Serve(args) => &args.config,
        CliCommand::Repair(args) => &args.config,
    };
    let config = Config::load(config_path)?;

    // keep the guard alive so buffered events are flushed on exit
    let _sentry = config.logging.as_ref().map(init_sentry);
    init_tracing(config.logging.is_some());
    if let Some(metrics) = &config.metrics {
        init_metrics(metrics)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        match cli.command {
            CliCommand::Serve(_) => {
                tracing::info!("Starting inspections service");
                inspections::run(config.inspections).await?;
            }
            CliCommand::Repair(args) => {
                let inspections = config.inspections;
                let document = args.document.unwrap_or(inspections.documents.records);
                let service = DocumentService::new(
                    inspections.store.build()?,
                    RetryPolicy::from(&inspections.retry),
                );
                let count = service.repair(&document).await?;
                println!("{document}: {count} entries after repair");
            }
        }
        Ok::<(), CliError>(())
    })
}

fn init_sentry(logging: &LoggingConfig) -> sentry::ClientInitGuard {
    sentry::init((
        logging.sentry_dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    ))
}

fn init_tracing(with_sentry: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let sentry_layer = with_sentry.then(|| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;

    describe_all(binstore::metrics_defs::ALL_METRICS);
    describe_all(inspections::metrics_defs::ALL_METRICS);
    Ok(())
}
