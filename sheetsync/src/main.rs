mod config;

use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use publisher::mapping::MappingConfig;
use shared::metrics_defs::describe_all;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tabstore::{MemoryStore, SheetsConfig, SheetsStore, TabularStore, token_provider};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(version, about = "Publishes JSON snapshots into a two-tab spreadsheet")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the HTTP service
    Serve(ServeArgs),
    /// Load the service config and the mapping file, then exit
    CheckConfig(ServeArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Service config file. Without one, defaults and the environment are used.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Keep rows in memory instead of writing to the spreadsheet
    #[arg(long)]
    dry_run: bool,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Mapping(#[from] publisher::mapping::MappingError),
    #[error("invalid sheets base url: {0}")]
    BaseUrl(#[from] url::ParseError),
    #[error(transparent)]
    Credentials(#[from] tabstore::CredentialsError),
    #[error("could not set up statsd: {0}")]
    Metrics(#[from] metrics_exporter_statsd::StatsdError),
    #[error("metrics recorder already installed")]
    RecorderInstalled,
    #[error(transparent)]
    Publisher(#[from] publisher::PublisherError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    // .env is optional
    let _ = dotenvy::dotenv();

    let (args, check_only) = match cli.command {
        CliCommand::Serve(args) => (args, false),
        CliCommand::CheckConfig(args) => (args, true),
    };

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _sentry = init_logging(&config.logging);

    let result = if check_only {
        check(&config)
    } else {
        serve(config, args.dry_run)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &ServeArgs) -> Result<Config, ConfigError> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env(|name| std::env::var(name).ok());
    config.validate(args.dry_run)?;
    Ok(config)
}

/// Installs the tracing subscriber. The returned guard flushes pending Sentry
/// events on drop.
fn init_logging(logging: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper=warn", logging.level)));

    let dsn = logging.sentry_dsn.as_deref().and_then(|dsn| match dsn.parse::<sentry::types::Dsn>() {
        Ok(dsn) => Some(dsn),
        Err(e) => {
            eprintln!("Ignoring invalid Sentry DSN: {e}");
            None
        }
    });
    let guard = dsn.map(|dsn| {
        sentry::init(sentry::ClientOptions {
            dsn: Some(dsn),
            release: sentry::release_name!(),
            ..Default::default()
        })
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    guard
}

fn init_metrics(metrics: &MetricsConfig) -> Result<(), CliError> {
    let recorder =
        StatsdBuilder::from(metrics.statsd_host.as_str(), metrics.statsd_port).build(Some(&metrics.prefix))?;
    metrics::set_global_recorder(recorder).map_err(|_| CliError::RecorderInstalled)?;

    describe_all(publisher::metrics_defs::ALL_METRICS);
    describe_all(tabstore::metrics_defs::ALL_METRICS);
    tracing::info!(
        host = %metrics.statsd_host,
        port = metrics.statsd_port,
        "Sending metrics to statsd"
    );
    Ok(())
}

fn check(config: &Config) -> Result<(), CliError> {
    let path = &config.publisher.mapping.path;
    let mapping = MappingConfig::from_file(path)?;
    tracing::info!(
        mapping = %path.display(),
        main = %mapping.tabs.main,
        processes = %mapping.tabs.processes,
        "Config OK"
    );
    Ok(())
}

fn build_store(config: &Config, dry_run: bool) -> Result<Arc<dyn TabularStore>, CliError> {
    if dry_run {
        tracing::warn!("Dry run: rows are kept in memory and lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let credentials = config
        .sheets
        .credentials
        .as_ref()
        .ok_or(ConfigError::MissingCredentials)?;
    let tokens = token_provider(&credentials.into())?;
    let sheets = SheetsConfig {
        spreadsheet_id: config.sheets.spreadsheet_id.clone(),
        base_url: config.sheets.base_url()?,
    };
    Ok(Arc::new(SheetsStore::new(sheets, tokens)))
}

#[tokio::main]
async fn serve(config: Config, dry_run: bool) -> Result<(), CliError> {
    if let Some(metrics) = &config.metrics {
        init_metrics(metrics)?;
    }
    let store = build_store(&config, dry_run)?;
    publisher::run(config.publisher, store).await?;
    Ok(())
}
