//! qosmgr - per-game network QoS (DSCP) policy manager
//!
//! Main entry point for the command-line application.
//!
//! # Overview
//!
//! This binary wires the library together for a single command:
//! - Configuration loading ([`ConfigManager`], `qosmgr.yaml` + `QOSMGR_*` env)
//! - Logging infrastructure (daily rotated file, console with `--debug`)
//! - Tokio runtime for PowerShell subprocesses
//! - [`ReconciliationEngine`] behind a [`Dispatcher`] for mutating commands
//!
//! # Execution Flow
//!
//! 1. Parse arguments and load settings from the config directory
//! 2. Initialize logging → `<config dir>/logs/qosmgr.<date>`
//! 3. Open the DSCP registry (`dscp_settings.txt`) and the error log (`Errors.txt`)
//! 4. Run the command, printing progress for `auto-add`
//! 5. Log the metrics summary and shut the runtime down
//!
//! # Platform
//!
//! QoS policies exist only on Windows. Elsewhere `scan` still works; store
//! commands fail and are reported in the error log.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use qosmgr::engine::{Action, ActionOutcome, Dispatcher, DispatcherHandle};
use qosmgr::logging::{ErrorLog, setup_logging_with_console};
use qosmgr::metrics::Metrics;
use qosmgr::models::ValidationError;
use qosmgr::services::{
    EpicLibrary, GameLibrary, PolicyStoreAdapter, PowerShellRunner, ScanContext, SteamLibrary,
};
use qosmgr::{
    APP_NAME, ConfigManager, DscpRegistry, DscpValue, ReconciliationEngine, StateChange,
    StateManager, VERSION,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Queue depth between the command and the dispatcher
const ACTION_QUEUE_CAPACITY: usize = 32;

#[derive(Parser, Debug)]
#[command(name = "qosmgr")]
#[command(about = "Manage per-game Windows QoS (DSCP) policies", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding qosmgr.yaml, dscp_settings.txt and Errors.txt
    #[arg(long, global = true, default_value = ".")]
    config_dir: String,

    /// Debug-level logging, mirrored to the console
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List Steam and Epic Games executables without touching any policy
    Scan,

    /// Create a policy with the default DSCP value for every discovered game
    AutoAdd,

    /// Show every policy with its recorded DSCP value
    List,

    /// Create a policy for one executable
    Add {
        name: String,
        path: String,

        /// DSCP value (0-63); the default when omitted
        #[arg(long, value_parser = parse_dscp)]
        dscp: Option<i64>,
    },

    /// Change the DSCP value of an existing policy
    Edit {
        name: String,
        #[arg(value_parser = parse_dscp)]
        dscp: i64,
    },

    /// Delete one policy
    Remove { name: String },

    /// Delete every policy and forget all recorded values
    RemoveAll,

    /// Set the DSCP value used for newly discovered games
    SetDefault {
        #[arg(value_parser = parse_dscp)]
        dscp: i64,
    },

    /// Show the error log
    Errors {
        /// Empty the error log instead of printing it
        #[arg(long)]
        clear: bool,
    },
}

fn parse_dscp(value: &str) -> Result<i64, ValidationError> {
    value.parse::<DscpValue>().map(|dscp| i64::from(dscp.get()))
}

type Engine = ReconciliationEngine<PowerShellRunner>;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let settings = config_manager.load_settings()?;
    let debug = cli.debug || settings.debug_mode;

    // Held for the whole run; dropping it stops the file writer
    let _log_guard = setup_logging_with_console(
        config_manager.log_dir(&settings).as_str(),
        APP_NAME,
        debug,
        debug,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("qosmgr-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let error_log = Arc::new(ErrorLog::new(config_manager.error_log_path(&settings)));
    let metrics = Arc::new(Metrics::new());

    let registry = DscpRegistry::open(config_manager.registry_path(&settings))?;
    tracing::info!(
        "Loaded {} DSCP entries (default {}) from {}",
        registry.len(),
        registry.default_value(),
        registry.path()
    );

    let context = ScanContext::from_settings(&settings.scan);
    let libraries: Vec<Box<dyn GameLibrary>> = vec![
        Box::new(EpicLibrary::new(Arc::clone(&context))),
        Box::new(SteamLibrary::new(context)),
    ];

    let store = PolicyStoreAdapter::new(
        PowerShellRunner::new(&settings.store),
        Arc::clone(&error_log),
        Arc::clone(&metrics),
    );

    let engine = Arc::new(ReconciliationEngine::new(
        store,
        registry,
        libraries,
        StateManager::new(),
        Arc::clone(&error_log),
        Arc::clone(&metrics),
    ));

    let result = runtime.block_on(run_command(cli.command, engine, &error_log));

    metrics.log_summary();
    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result
}

async fn run_command(command: Commands, engine: Arc<Engine>, error_log: &ErrorLog) -> Result<()> {
    match command {
        Commands::Scan => {
            for (launcher, games) in engine.scan() {
                println!("{} ({} executables)", launcher, games.len());
                for game in games {
                    println!("  {:<40} {}", game.name, game.path);
                }
            }
            Ok(())
        }
        Commands::List => {
            let games = engine.games().await;
            if games.is_empty() {
                println!("No QoS policies found");
            }
            for game in games {
                println!("{:<40} {:>4}  {}", game.name, game.marking, game.app_path);
            }
            Ok(())
        }
        Commands::Errors { clear } => {
            if clear {
                error_log.clear()?;
                println!("Cleared {}", error_log.path());
            } else {
                print!("{}", error_log.read_all()?);
            }
            Ok(())
        }
        command => dispatch(command, engine).await,
    }
}

/// Run a mutating command through the dispatcher.
async fn dispatch(command: Commands, engine: Arc<Engine>) -> Result<()> {
    let action = match command {
        Commands::AutoAdd => Action::AutoDiscover,
        Commands::Add { name, path, dscp } => Action::AddGame {
            name,
            app_path: path,
            marking: dscp.unwrap_or_else(|| i64::from(engine.default_marking().get())),
        },
        Commands::Edit { name, dscp } => Action::Edit { name, marking: dscp },
        Commands::Remove { name } => Action::Remove { name },
        Commands::RemoveAll => Action::RemoveAll,
        Commands::SetDefault { dscp } => Action::SetDefault { value: dscp },
        Commands::Scan | Commands::List | Commands::Errors { .. } => {
            bail!("Command does not go through the dispatcher")
        }
    };

    let progress = tokio::spawn(print_progress(engine.state().clone()));

    let (dispatcher, handle) = Dispatcher::new(engine, ACTION_QUEUE_CAPACITY);
    let dispatcher_task = tokio::spawn(dispatcher.run());

    let outcome = submit(&handle, action).await;

    handle.shutdown();
    if let Err(e) = dispatcher_task.await {
        tracing::error!("Dispatcher task failed: {}", e);
    }
    progress.abort();

    report(outcome?)
}

async fn submit(handle: &DispatcherHandle, action: Action) -> Result<ActionOutcome> {
    tracing::info!("Submitting {:?}", action);
    handle.run(action).await
}

async fn print_progress(state: StateManager) {
    let mut changes = state.subscribe();
    loop {
        let change = match changes.recv().await {
            Ok(change) => change,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::debug!("Progress printer skipped {} events", missed);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match change {
            StateChange::ProgressUpdated { progress } => {
                let operation = state.read(|s| s.current_operation.clone());
                eprintln!("[{:>3}%] {}", progress, operation);
            }
            StateChange::PolicyApplied {
                name,
                marking,
                success: false,
            } => eprintln!("  failed to apply DSCP {} to {}", marking, name),
            _ => {}
        }
    }
}

fn report(outcome: ActionOutcome) -> Result<()> {
    match outcome {
        ActionOutcome::Discovered(report) => {
            println!(
                "Auto-detection complete. Added {} of {} games.",
                report.added.len(),
                report.found
            );
            if !report.failed.is_empty() {
                bail!(
                    "{} policies could not be created: {}",
                    report.failed.len(),
                    report.failed.join(", ")
                );
            }
            Ok(())
        }
        ActionOutcome::Applied(true) => {
            println!("Policy applied");
            Ok(())
        }
        ActionOutcome::Applied(false) => bail!("Policy could not be applied; see the error log"),
        ActionOutcome::Removed(true) => {
            println!("Policy removed");
            Ok(())
        }
        ActionOutcome::Removed(false) => bail!("Policy could not be removed; see the error log"),
        ActionOutcome::RemovedAll(count) => {
            println!("Removed {} policies", count);
            Ok(())
        }
        ActionOutcome::DefaultSet => {
            println!("Default DSCP value updated");
            Ok(())
        }
        ActionOutcome::Rejected(e) => Err(e.into()),
    }
}
