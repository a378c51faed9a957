use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pullsync::adapters::{Script, SimulatedDestination, SimulatedObjectStore};
use pullsync::config::AppConfig;
use pullsync::context::AppContext;
use pullsync::core::{Runner, transferable_keys};
use pullsync::destination::{DestinationService, DropboxClient};
use pullsync::logging::{self, LogConfig};
use pullsync::report;
use pullsync::signal;
use pullsync::source::{ObjectStore, S3ObjectStore, SourceLister};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Objects generated under the prefix in simulation mode.
const SIMULATED_OBJECTS: usize = 25;

/// Exit status when the run finished but not every item succeeded.
const EXIT_INCOMPLETE: u8 = 2;

#[derive(Parser)]
#[command(name = "pullsync")]
#[command(about = "Copy an object store folder into Dropbox by URL import", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file (defaults to ./pullsync.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Transfer every object under the prefix into a new Dropbox folder
    Run(RunArgs),
    /// List the source keys a run would transfer
    List(ConfigArgs),
    /// Print the effective configuration, even if it would not validate
    Config(ConfigArgs),
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    overrides: ConfigArgs,

    /// Also write the run report as JSON to this path
    #[arg(long)]
    report_json: Option<PathBuf>,
}

#[derive(Args, Serialize)]
struct ConfigArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    region: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    bucket: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    prefix: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    url_expiry_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    destination_root: Option<String>,

    #[serde(rename = "concurrency_limit", skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    concurrency: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    max_polls: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    request_timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    simulation: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    log_json: Option<bool>,
}

impl Commands {
    fn overrides(&self) -> &ConfigArgs {
        match self {
            Commands::Run(args) => &args.overrides,
            Commands::List(args) | Commands::Config(args) => args,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let overrides = Some(cli.command.overrides());
    // `config` shows whatever was loaded, even when it would not validate.
    let config = match &cli.command {
        Commands::Config(_) => AppConfig::load(cli.config.as_deref(), overrides),
        _ => AppConfig::new(cli.config.as_deref(), overrides),
    }
    .context("Failed to load configuration")?;

    logging::init(LogConfig {
        json: config.log_json,
        verbose: config.verbose,
    });

    match &cli.command {
        Commands::Run(args) => {
            run_transfer(AppContext::new(config), args.report_json.as_deref())
                .await
                .context("Run failed")
        }
        Commands::List(_) => list_keys(&config).await.context("Listing failed"),
        Commands::Config(_) => {
            print!("{}", config.to_redacted_toml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_transfer(ctx: AppContext, report_json: Option<&Path>) -> Result<ExitCode> {
    let (store, destination) = build_services(&ctx.config).await?;

    let cancel = ctx.cancel.clone();
    let progress = ctx.progress.clone();
    tokio::spawn(async move {
        if signal::watch_interrupts(tokio::signal::ctrl_c, cancel, progress).await {
            std::process::exit(i32::from(signal::EXIT_INTERRUPTED));
        }
    });

    let runner = Runner::from_context(&ctx, store, destination);
    let summary = runner.run(&source_prefix(&ctx.config)).await?;

    print!("{}", report::render_text(&summary));

    if let Some(path) = report_json {
        let json = report::render_json(&summary).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    if summary.report.all_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_INCOMPLETE))
    }
}

async fn list_keys(config: &AppConfig) -> Result<ExitCode> {
    let (store, _) = build_services(config).await?;
    let listed = SourceLister::new(store).list(&source_prefix(config)).await?;
    let keys = transferable_keys(listed);

    for key in &keys {
        println!("{}", key);
    }
    Ok(ExitCode::SUCCESS)
}

async fn build_services(
    config: &AppConfig,
) -> Result<(Arc<dyn ObjectStore>, Arc<dyn DestinationService>)> {
    if config.simulation {
        let store = SimulatedObjectStore::demo(&source_prefix(config), SIMULATED_OBJECTS);
        let destination = SimulatedDestination::new()
            .with_default(Script::CompleteAfter(2))
            .with_latency(Duration::from_millis(50));
        return Ok((Arc::new(store), Arc::new(destination)));
    }

    let store = S3ObjectStore::from_env(&config.region, config.bucket.clone()).await;
    let destination = DropboxClient::new(config.dropbox_token.clone(), config.request_timeout())
        .context("Failed to create Dropbox client")?;
    Ok((Arc::new(store), Arc::new(destination)))
}

fn source_prefix(config: &AppConfig) -> String {
    if config.prefix.is_empty() {
        "simulated".to_string()
    } else {
        config.prefix.clone()
    }
}
