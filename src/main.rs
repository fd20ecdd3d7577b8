//! hotspot-sync daemon
//!
//! Usage:
//!   hotspot-sync                        # run forever with the default settings file
//!   hotspot-sync --config sites.toml    # explicit settings file
//!   hotspot-sync --once --dry-run       # plan a single cycle and exit

use anyhow::{bail, Context, Result};
use clap::Parser;
use hotspot_sync::config::{default_config_path, FileConfigSource, SyncConfig};
use hotspot_sync::sync::{CycleReport, TargetOutcome};
use hotspot_sync::{HttpRosterFetcher, RouterOsConnector, SyncLoop};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long an in-flight cycle may keep running after a shutdown request.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "hotspot-sync", version, about)]
struct Args {
    /// Settings file (TOML, or JSON when the name ends in .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Log planned changes without applying them
    #[arg(long)]
    dry_run: bool,

    /// Validate the settings file and exit
    #[arg(long)]
    check_config: bool,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Debug logging for this crate
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(args: &Args) -> Result<()> {
    let default_directive = if args.verbose {
        "hotspot_sync=debug,info"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn print_cycle(report: &CycleReport) {
    for target in &report.targets {
        match &target.outcome {
            TargetOutcome::Skipped { stage, error } => {
                println!("{}: skipped at {}: {}", target.target, stage, error);
            }
            TargetOutcome::Completed(applied) => {
                let verb = if applied.dry_run { "would remove" } else { "removed" };
                println!(
                    "{}: {} roster, {} accounts, {} matched, {} {}/{}, created {}/{}",
                    target.target,
                    applied.roster_count,
                    applied.account_count,
                    applied.matched,
                    verb,
                    applied.removed,
                    applied.planned_removals.len(),
                    applied.created,
                    applied.planned_creations.len(),
                );
                if let Some(failure) = &applied.failure {
                    println!(
                        "  stopped during {} of {}: {}",
                        failure.phase, failure.account, failure.error
                    );
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let path = match args.config.clone().or_else(default_config_path) {
        Some(path) => path,
        None => bail!("no settings file given and no default location is available"),
    };

    if args.check_config {
        let config = SyncConfig::load(&path)?;
        println!(
            "{}: ok, {} target(s), every {} minute(s)",
            path.display(),
            config.targets.len(),
            config.interval_minutes
        );
        for target in &config.targets {
            println!("  {}", target.display_name());
        }
        return Ok(());
    }

    // Later edits to the timeout still apply through the per-call bound
    let request_timeout = match SyncConfig::load(&path) {
        Ok(config) => config.request_timeout(),
        Err(e) => {
            warn!(error = %e, "Settings not readable at startup, using default timeout");
            SyncConfig::default().request_timeout()
        }
    };

    let sync = SyncLoop::new(
        Arc::new(FileConfigSource::new(&path)),
        Arc::new(HttpRosterFetcher::new(request_timeout)),
        Arc::new(RouterOsConnector),
    )
    .with_dry_run(args.dry_run);

    if args.once {
        let (_, report) = sync.run_once().await?;
        print_cycle(&report);
        if report.failed() > 0 {
            bail!("{} of {} target(s) failed", report.failed(), report.targets.len());
        }
        return Ok(());
    }

    let (tx, rx) = watch::channel(false);
    let mut handle = tokio::spawn(async move { sync.run(rx).await });

    tokio::select! {
        joined = &mut handle => {
            joined.context("sync loop task failed")?;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    info!(
        grace_secs = SHUTDOWN_GRACE.as_secs(),
        "Shutdown requested, letting the current cycle finish"
    );
    let _ = tx.send(true);

    tokio::select! {
        joined = &mut handle => {
            joined.context("sync loop task failed")?;
        }
        _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
            warn!("Current cycle did not finish in time, aborting");
            handle.abort();
        }
        _ = shutdown_signal() => {
            warn!("Second shutdown signal, aborting");
            handle.abort();
        }
    }

    Ok(())
}
