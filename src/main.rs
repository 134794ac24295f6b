use clap::error::ErrorKind;
use clap::Parser;
use dialoguer::Confirm;
use doorsync::core::config::Config;
use doorsync::core::error::{exit_code, InputError, SyncError};
use doorsync::core::orchestrator::Orchestrator;
use doorsync::core::tracing_init::init_tracing;
use doorsync::reconcile::diff::validate_unique_keys;
use doorsync::source::roster::load_roster;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

/// Update the door controllers listed in the config with the people in a roster CSV
#[derive(Parser, Debug)]
#[command(name = "doorsync", version)]
struct Cli {
    /// Roster CSV, header: CID, name, key serial, PIN
    roster: PathBuf,

    /// Configuration file
    #[arg(short, long, env = "DOORSYNC_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Show what would change without touching the controllers
    #[arg(long)]
    dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_code::SUCCESS,
                _ => exit_code::USAGE,
            };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            // Printed directly: tracing may not be initialized yet
            eprintln!("doorsync: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<u8, SyncError> {
    if !cli.roster.is_file() {
        return Err(InputError::MissingFile(cli.roster).into());
    }

    let config = Config::from_file(&cli.config).map_err(|e| {
        SyncError::Config(e.context(format!(
            "Failed to load configuration from '{}'. Copy config.example.toml to config.toml and adjust the values.",
            cli.config.display()
        )))
    })?;

    init_tracing(&config.logging);

    // The roster is fully validated before any controller is contacted
    let desired = load_roster(&cli.roster, &config.roster)?;
    validate_unique_keys(&desired)?;

    info!(
        roster = %cli.roster.display(),
        users = desired.len(),
        controllers = config.controllers.len(),
        dry_run = cli.dry_run,
        "Roster loaded"
    );

    if !cli.yes && !cli.dry_run {
        confirm(config.controllers.len())?;
    }

    // One logical thread of control; controllers are handled one after another
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| SyncError::Internal(format!("Failed to build Tokio runtime: {}", e)))?;

    let summary = runtime.block_on(async {
        let orchestrator = Orchestrator::new(&config, cli.dry_run)?;
        orchestrator.run(&desired).await
    })?;

    for report in &summary.reports {
        info!(
            controller = %report.controller,
            removed = report.removed,
            added = report.added,
            nothing_to_do = report.nothing_to_do(),
            "Controller finished"
        );
    }

    Ok(summary.exit_code())
}

fn confirm(controllers: usize) -> Result<(), SyncError> {
    let confirmed = Confirm::new()
        .with_prompt(format!(
            "Make sure nobody is logged into the web UI of the doors. Update {} controller(s) now?",
            controllers
        ))
        .default(false)
        .interact()
        .map_err(|e| {
            SyncError::Usage(format!(
                "cannot ask for confirmation ({}); pass --yes to skip the prompt",
                e
            ))
        })?;

    if confirmed {
        Ok(())
    } else {
        Err(SyncError::Declined)
    }
}
