// crates/faas-cli/src/main.rs
// ============================================================================
// Module: FaaS CLI Entry Point
// Description: Command dispatcher for the FaaS engine and cleanup scheduler.
// Purpose: Wire configuration, adapters, and the engine into runnable services.
// Dependencies: clap, faas-config, faas-core, faas-providers, faas-server, tokio.
// ============================================================================

//! ## Overview
//! The `faas` binary hosts the HTTP engine (`serve`), runs the idle-container
//! reclaimer on its own (`cleanup`), validates configuration, and exposes the
//! UID derivation rules for debugging. Logs go to stderr; command output goes
//! to stdout.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub(crate) mod logging;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use faas_config::FaasConfig;
use faas_core::CleanupReport;
use faas_core::CleanupScheduler;
use faas_core::Clock;
use faas_core::ContainerRuntime;
use faas_core::Engine;
use faas_core::FunctionId;
use faas_core::FunctionStore;
use faas_core::FunctionUid;
use faas_core::SystemClock;
use faas_providers::DockerRuntime;
use faas_providers::HttpSidecarClient;
use faas_server::FaasServer;
use faas_store_sqlite::SqliteFunctionStore;
use serde::Serialize;
use thiserror::Error;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing::warn;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "faas", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP engine (and the in-process cleanup scheduler when enabled).
    Serve(ServeCommand),
    /// Run the idle-container cleanup scheduler on its own.
    Cleanup(CleanupCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Function UID utilities.
    Uid {
        /// Selected UID subcommand.
        #[command(subcommand)]
        command: UidCommand,
    },
}

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to faas.toml or `FAAS_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for the `cleanup` command.
#[derive(Args, Debug)]
struct CleanupCommand {
    /// Optional config file path (defaults to faas.toml or `FAAS_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Run a single reclamation pass, print its report, and exit.
    #[arg(long, action = ArgAction::SetTrue)]
    once: bool,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate a config file, including environment overrides.
    Validate(ConfigValidateCommand),
}

/// Arguments for config validation.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Optional config file path (defaults to faas.toml or `FAAS_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// UID subcommands.
#[derive(Subcommand, Debug)]
enum UidCommand {
    /// Derive the UID for a function name and id.
    Generate(UidGenerateCommand),
    /// Parse a UID and print the function id it resolves to.
    Resolve(UidResolveCommand),
}

/// Arguments for UID generation.
#[derive(Args, Debug)]
struct UidGenerateCommand {
    /// Human-readable function name.
    #[arg(long, value_name = "NAME")]
    name: String,
    /// Function id assigned by the store.
    #[arg(long, value_name = "ID")]
    id: u64,
}

/// Arguments for UID resolution.
#[derive(Args, Debug)]
struct UidResolveCommand {
    /// Function UID, e.g. `hello-world-1`.
    #[arg(value_name = "UID")]
    uid: String,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a user-facing message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&format!("faas {version}"))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::Serve(command) => {
            logging::init_tracing();
            command_serve(command).await
        }
        Commands::Cleanup(command) => {
            logging::init_tracing();
            command_cleanup(command).await
        }
        Commands::Config {
            command,
        } => command_config(command),
        Commands::Uid {
            command,
        } => command_uid(command),
    }
}

/// Emits the top-level help message for the CLI.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(())
}

// ============================================================================
// SECTION: Service Wiring
// ============================================================================

/// Adapters shared by the engine and the cleanup scheduler.
struct Services {
    /// Function store.
    store: Arc<dyn FunctionStore>,
    /// Container runtime.
    runtime: Arc<dyn ContainerRuntime>,
    /// Wall clock.
    clock: Arc<dyn Clock>,
}

impl Services {
    /// Opens the store (with startup retry) and connects to Docker.
    async fn open(config: &FaasConfig) -> CliResult<Self> {
        let store_config = config.store_config();
        let retry = config.connect_retry();
        let store = tokio::task::spawn_blocking(move || {
            SqliteFunctionStore::open_with_retry(&store_config, retry)
        })
        .await
        .map_err(|err| CliError::new(format!("store open join failed: {err}")))?
        .map_err(|err| CliError::new(format!("function store unavailable: {err}")))?;
        let runtime = DockerRuntime::connect(&config.runtime)
            .map_err(|err| CliError::new(err.to_string()))?;
        Ok(Self {
            store: Arc::new(store),
            runtime: Arc::new(runtime),
            clock: Arc::new(SystemClock),
        })
    }

    /// Builds a cleanup scheduler over these adapters.
    fn scheduler(&self, config: &FaasConfig) -> CliResult<CleanupScheduler> {
        CleanupScheduler::new(
            config.cleanup_config(),
            Arc::clone(&self.store),
            Arc::clone(&self.runtime),
            Arc::clone(&self.clock),
        )
        .map_err(|err| CliError::new(err.to_string()))
    }
}

/// Loads and validates configuration.
fn load_config(path: Option<&Path>) -> CliResult<FaasConfig> {
    FaasConfig::load(path).map_err(|err| CliError::new(format!("config load failed: {err}")))
}

/// Resolves when the process receives Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let bind = config.server.bind_addr().map_err(|err| CliError::new(err.to_string()))?;
    let services = Services::open(&config).await?;
    let sidecar = HttpSidecarClient::new(config.sidecar_config())
        .map_err(|err| CliError::new(err.to_string()))?;

    let engine = Engine::new(
        config.engine_config(),
        Arc::clone(&services.store),
        Arc::clone(&services.runtime),
        Arc::new(sidecar),
        Arc::clone(&services.clock),
    );
    info!(engine_id = engine.engine_id(), "engine id");
    engine.prepare().await.map_err(|err| CliError::new(format!("engine init failed: {err}")))?;

    let server = FaasServer::from_config(&config.server, engine.clone())
        .map_err(|err| CliError::new(err.to_string()))?;
    let listener = FaasServer::bind(bind).await.map_err(|err| CliError::new(err.to_string()))?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let scheduler_task = if config.cleanup.enabled {
        let scheduler = services.scheduler(&config)?.with_coordination(engine.coordination());
        let mut stop = stop_rx;
        Some(tokio::spawn(async move {
            scheduler
                .run(async move {
                    let _ = stop.wait_for(|stopped| *stopped).await;
                })
                .await;
        }))
    } else {
        info!("in-process cleanup disabled");
        None
    };

    let served = server.serve(listener, shutdown_signal()).await;
    let _ = stop_tx.send(true);
    if let Some(task) = scheduler_task
        && let Err(err) = task.await
    {
        warn!(error = %err, "cleanup scheduler task ended abnormally");
    }
    served.map_err(|err| CliError::new(err.to_string()))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Cleanup Command
// ============================================================================

/// Cleanup report printed by `cleanup --once`.
#[derive(Debug, Serialize)]
struct CleanupOutput {
    /// Idle records returned by the store.
    candidates: usize,
    /// Containers stopped and cleared.
    stopped: usize,
    /// Records skipped because they were used after the query.
    skipped: usize,
    /// Whether the batch was aborted.
    aborted: bool,
}

impl From<CleanupReport> for CleanupOutput {
    fn from(report: CleanupReport) -> Self {
        Self {
            candidates: report.candidates,
            stopped: report.stopped,
            skipped: report.skipped,
            aborted: report.aborted,
        }
    }
}

/// Executes the `cleanup` command.
async fn command_cleanup(command: CleanupCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let services = Services::open(&config).await?;
    let scheduler = services.scheduler(&config)?;

    if command.once {
        let report = scheduler.tick().await.map_err(|err| CliError::new(err.to_string()))?;
        let aborted = report.aborted;
        write_json(&CleanupOutput::from(report))?;
        return Ok(if aborted { ExitCode::FAILURE } else { ExitCode::SUCCESS });
    }

    scheduler.run(shutdown_signal()).await;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(command) => command_config_validate(&command),
    }
}

/// Executes the config validation command.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    let _config = load_config(command.config.as_deref())?;
    write_stdout_line("config ok").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: UID Commands
// ============================================================================

/// Result of resolving a UID.
#[derive(Debug, Serialize, PartialEq, Eq)]
struct UidResolution {
    /// The validated UID.
    uid: String,
    /// Function id encoded in the suffix.
    function_id: u64,
}

/// Dispatches UID subcommands.
fn command_uid(command: UidCommand) -> CliResult<ExitCode> {
    match command {
        UidCommand::Generate(command) => {
            let uid = generate_uid(&command.name, command.id)?;
            write_stdout_line(uid.as_str())
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
        UidCommand::Resolve(command) => write_json(&resolve_uid_arg(&command.uid)?)?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Derives the UID for a name and raw id.
fn generate_uid(name: &str, id: u64) -> CliResult<FunctionUid> {
    let id = FunctionId::from_raw(id)
        .ok_or_else(|| CliError::new("function id must be greater than zero".to_string()))?;
    Ok(FunctionUid::generate(name, id))
}

/// Parses a UID argument.
fn resolve_uid_arg(raw: &str) -> CliResult<UidResolution> {
    let invalid = || CliError::new(format!("invalid function uid: {raw:?}"));
    let uid = FunctionUid::parse(raw).ok_or_else(invalid)?;
    let function_id = uid.function_id().ok_or_else(invalid)?;
    Ok(UidResolution {
        uid: uid.as_str().to_string(),
        function_id: function_id.get(),
    })
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a value to stdout as a JSON line.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let rendered = serde_json::to_string(value)
        .map_err(|err| CliError::new(format!("output serialization failed: {err}")))?;
    write_stdout_line(&rendered).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
