// # mailgun-provider
//
// This binary is a THIN integration layer only:
// - Reads configuration from flags and environment variables
// - Builds one Mailgun HTTP client per region
// - Opens the state file
// - Runs a single reconciler pass and reports the outcome
//
// All reconciliation logic lives in mailgun-core.
//
// ## Configuration
//
// - `MAILGUN_API_KEY`: Private API key (required)
// - `MAILGUN_STATE_PATH`: State file (default `mailgun-state.json`)
// - `MAILGUN_MANIFEST`: Manifest file (required by plan and apply)
// - `MAILGUN_LOG_LEVEL`: trace, debug, info, warn or error (default info)
// - `MAILGUN_API_BASE_URL`: Serve every region from this URL instead
// - `MAILGUN_OPERATION_TIMEOUT_SECS`: Deadline for one operation on one entity
//
// ## Example
//
// ```bash
// export MAILGUN_API_KEY=key-...
// mailgun-provider --manifest mailgun.json plan
// mailgun-provider --manifest mailgun.json apply
// mailgun-provider import mailgun_domain.main eu:example.com
// ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mailgun_core::engine::{PlannedAction, PlannedChange};
use mailgun_core::{
    ClientSet, FileStateStore, Manifest, ProviderConfig, ReconcileEvent, ReconcileReport,
    Reconciler,
};
use mailgun_http::HttpClientFactory;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes
///
/// - 0: Pass completed without failures
/// - 1: Configuration or startup error
/// - 2: Runtime failure (a failed address, an API error, interruption)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProviderExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<ProviderExitCode> for ExitCode {
    fn from(code: ProviderExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Debug, Parser)]
#[command(name = "mailgun-provider")]
#[command(about = "Declaratively manage Mailgun domains, routes, credentials and webhooks")]
#[command(version)]
struct Cli {
    /// Mailgun private API key
    #[arg(long, env = "MAILGUN_API_KEY", hide_env_values = true)]
    api_key: String,

    /// JSON state file
    #[arg(long, env = "MAILGUN_STATE_PATH", default_value = "mailgun-state.json")]
    state: PathBuf,

    /// JSON manifest of desired resources
    #[arg(long, env = "MAILGUN_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "MAILGUN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Serve every region from this base URL
    #[arg(long, env = "MAILGUN_API_BASE_URL")]
    api_base_url: Option<String>,

    /// Deadline for one operation on one entity (in seconds)
    #[arg(long, env = "MAILGUN_OPERATION_TIMEOUT_SECS")]
    operation_timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
enum Command {
    /// Show what apply would change
    Plan,
    /// Make Mailgun match the manifest
    Apply,
    /// Re-read everything in state and drop what no longer exists
    Refresh,
    /// Delete everything in state
    Destroy,
    /// Adopt an existing entity
    Import {
        /// Address to store it under, e.g. mailgun_domain.main
        address: String,
        /// Import identifier, e.g. eu:example.com
        id: String,
    },
}

impl Command {
    fn needs_manifest(&self) -> bool {
        matches!(self, Command::Plan | Command::Apply)
    }
}

impl Cli {
    fn provider_config(&self) -> Result<ProviderConfig> {
        let mut config = ProviderConfig::new(self.api_key.clone());
        if let Some(url) = &self.api_base_url {
            config = config.with_api_base_url(url.clone());
        }
        if let Some(secs) = self.operation_timeout_secs {
            config = config.with_operation_timeout(secs);
        }
        config.validate()?;
        Ok(config)
    }

    fn manifest_path(&self) -> Result<Option<&PathBuf>> {
        match (&self.manifest, self.command.needs_manifest()) {
            (None, true) => anyhow::bail!(
                "--manifest is required for this command. \
                Set it via: --manifest mailgun.json or MAILGUN_MANIFEST"
            ),
            (manifest, _) => Ok(manifest.as_ref()),
        }
    }
}

fn parse_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => anyhow::bail!(
            "Log level '{}' is not supported. Use trace, debug, info, warn or error",
            other
        ),
    }
}

/// Everything checked before touching the network
struct Prepared {
    config: ProviderConfig,
    manifest: Option<Manifest>,
}

async fn prepare(cli: &Cli) -> Result<Prepared> {
    let config = cli.provider_config()?;
    let manifest = match cli.manifest_path()? {
        Some(path) => Some(
            Manifest::load(path)
                .await
                .with_context(|| format!("loading manifest {}", path.display()))?,
        ),
        None => None,
    };
    Ok(Prepared { config, manifest })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match parse_level(&cli.log_level) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ProviderExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ProviderExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ProviderExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        let prepared = match prepare(&cli).await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("Configuration error: {:#}", e);
                return ProviderExitCode::ConfigError;
            }
        };

        tokio::select! {
            result = run(&cli.command, &cli.state, prepared) => match result {
                Ok(code) => code,
                Err(e) => {
                    error!("{:#}", e);
                    ProviderExitCode::RuntimeError
                }
            },
            _ = tokio::signal::ctrl_c() => {
                // Dropping the pass cancels any in-flight confirmation poll
                warn!("Interrupted, state may be missing the last operation");
                ProviderExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Run one pass of `command`
async fn run(
    command: &Command,
    state_path: &Path,
    prepared: Prepared,
) -> Result<ProviderExitCode> {
    let Prepared { config, manifest } = prepared;

    let clients = ClientSet::from_factory(&HttpClientFactory, &config)
        .context("creating Mailgun clients")?;
    let store = FileStateStore::new(state_path)
        .await
        .with_context(|| format!("opening state file {}", state_path.display()))?;
    info!("Using state file {}", store.path().display());

    let (reconciler, rx) = Reconciler::new(clients, Box::new(store), &config)?;
    let events = tokio::spawn(log_events(rx));

    let code = match (command, manifest) {
        (Command::Plan, Some(manifest)) => {
            let changes = reconciler.plan(&manifest).await?;
            print_plan(&changes);
            ProviderExitCode::Success
        }
        (Command::Apply, Some(manifest)) => summarize("apply", &reconciler.apply(&manifest).await?),
        (Command::Refresh, _) => summarize("refresh", &reconciler.refresh().await?),
        (Command::Destroy, _) => summarize("destroy", &reconciler.destroy().await?),
        (Command::Import { address, id }, _) => {
            let record = reconciler.import(address, id).await?;
            println!("Imported {} as {}", record.id, address);
            ProviderExitCode::Success
        }
        (command, None) => anyhow::bail!("{:?} requires a manifest", command),
    };

    // Closing the channel ends the event task
    drop(reconciler);
    if let Err(e) = events.await {
        debug!("Event task ended abnormally: {}", e);
    }

    Ok(code)
}

async fn log_events(mut rx: mpsc::Receiver<ReconcileEvent>) {
    while let Some(event) = rx.recv().await {
        match &event {
            ReconcileEvent::DriftDetected { address, id } => {
                warn!("Drift: {} ({}) was deleted outside of this tool", address, id)
            }
            ReconcileEvent::Failed { address, error } => warn!("{} failed: {}", address, error),
            other => debug!("Event: {:?}", other),
        }
    }
}

fn print_plan(changes: &[PlannedChange]) {
    let mut pending = 0;
    for change in changes {
        let line = match &change.action {
            PlannedAction::NoOp => continue,
            PlannedAction::Create => format!("  + {}", change.address),
            PlannedAction::Update(fields) => {
                format!("  ~ {} ({})", change.address, fields.join(", "))
            }
            PlannedAction::Replace(fields) => {
                format!("-/+ {} (forces replacement: {})", change.address, fields.join(", "))
            }
            PlannedAction::Delete => format!("  - {}", change.address),
        };
        pending += 1;
        println!("{}", line);

        if let Some(records) = &change.records {
            println!("      sending records: {}", records.sending.join(", "));
            println!("      receiving records: {}", records.receiving.join(", "));
        }
    }

    if pending == 0 {
        println!("No changes. Mailgun matches the manifest.");
    } else {
        println!("{} change(s) pending.", pending);
    }
}

fn summarize(operation: &str, report: &ReconcileReport) -> ProviderExitCode {
    println!(
        "{}: {} created, {} updated, {} replaced, {} deleted, {} unchanged, {} vanished, {} failed",
        operation,
        report.created.len(),
        report.updated.len(),
        report.replaced.len(),
        report.deleted.len(),
        report.unchanged.len(),
        report.vanished.len(),
        report.failed.len()
    );
    for (address, message) in &report.failed {
        eprintln!("  {}: {}", address, message);
    }

    if report.is_success() {
        ProviderExitCode::Success
    } else {
        ProviderExitCode::RuntimeError
    }
}
