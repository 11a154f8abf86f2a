//! miniarch - Main entry point

use std::path::Path;

use anyhow::Context;
use tracing::{debug, info, warn};

use miniarch::cli::{Cli, Commands, InstallArgs};
use miniarch::command::SystemExecutor;
use miniarch::disks::DiskInspector;
use miniarch::error::InstallError;
use miniarch::installer::Installer;
use miniarch::partition::PartitionPlan;
use miniarch::process_guard::{self, InterruptFlag};
use miniarch::ui::TerminalPrompter;
use miniarch::{logging, sanity};

fn main() {
    let cli = Cli::parse_args();
    let code = match run(cli) {
        Ok(()) => 0,
        Err(err) => report(&err),
    };
    std::process::exit(code);
}

/// Print `err` and pick the exit status.
fn report(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<InstallError>() {
        Some(InstallError::Cancelled) => {
            eprintln!("Installation cancelled.");
            InstallError::Cancelled.exit_code()
        }
        Some(install_err) => {
            eprintln!("Error: {:#}", err);
            install_err.exit_code()
        }
        None => {
            eprintln!("Error: {:#}", err);
            1
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let dry_run = cli.dry_run;
    match cli.command() {
        Commands::Install(args) => run_installer(&args, dry_run),
        Commands::ListDisks => {
            init_logging(&logging::default_log_path())?;
            let mut exec = SystemExecutor::new(dry_run);
            for disk in DiskInspector::new().list_disks(&mut exec)? {
                println!("{}", disk);
            }
            Ok(())
        }
        Commands::Plan {
            disk,
            mount_root,
            json,
        } => {
            let plan = PartitionPlan::new(disk);
            if json {
                let commands: Vec<String> =
                    plan.commands(&mount_root).iter().map(|c| c.display()).collect();
                let doc = serde_json::json!({ "plan": plan, "commands": commands });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                println!("{}", plan.summary(&mount_root));
            }
            Ok(())
        }
    }
}

fn init_logging(path: &Path) -> anyhow::Result<()> {
    logging::init(path).with_context(|| format!("Cannot open log file {}", path.display()))
}

fn run_installer(args: &InstallArgs, dry_run: bool) -> anyhow::Result<()> {
    let log_path = args.log_file.clone().unwrap_or_else(logging::default_log_path);
    init_logging(&log_path)?;
    info!("miniarch {} starting (dry run: {})", env!("CARGO_PKG_VERSION"), dry_run);

    let interrupt = InterruptFlag::new();
    if let Err(e) = process_guard::init_signal_handlers(&interrupt) {
        // Interrupts then end the process instead of stopping between stages
        warn!("Failed to initialize signal handlers: {}", e);
    }
    debug!("Signal handlers initialized");

    sanity::run_preflight_checks(!dry_run);

    let prompter = TerminalPrompter::new(interrupt.clone())?;
    let mut installer = Installer::new(
        SystemExecutor::new(dry_run),
        prompter,
        args.to_options(log_path.clone()),
        interrupt,
    );
    let result = installer.run();
    let failed_at = installer.progress().failed_at();
    let device = installer.device().map(str::to_string);
    // Restores the terminal before anything is printed
    drop(installer);

    match result {
        Ok(completion) => {
            println!("Installation complete. Log: {}", log_path.display());
            if !completion.reboot {
                println!("Reboot to start the new system.");
            }
            Ok(())
        }
        Err(err) => match (failed_at, device) {
            (Some(stage), Some(device)) if stage.touches_disk() && !err.is_cancelled() => {
                Err(anyhow::Error::new(err).context(format!(
                    "Installation failed during '{}' on {}; the disk was modified and needs manual attention. See {}",
                    stage,
                    device,
                    log_path.display()
                )))
            }
            _ => Err(err.into()),
        },
    }
}
