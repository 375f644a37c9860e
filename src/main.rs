//! qsql - runs templated SQL query files in batch.

use std::path::Path;

use anyhow::{bail, Context};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use quicksql::batch::{self, BatchOptions, BatchReport, BatchRunner};
use quicksql::cli::Cli;
use quicksql::config::Config;
use quicksql::logging;
use quicksql::report;
use quicksql::watch::{WatchCycle, Watcher};

/// Every query succeeded or was disabled.
const EXIT_OK: i32 = 0;
/// Some file or query failed.
const EXIT_FAILURES: i32 = 1;
/// Bad arguments or configuration.
const EXIT_USAGE: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    match (&cli.log_file, &cli.watch) {
        (Some(path), _) => logging::init_file_logging(path, cli.verbose),
        (None, Some(_)) => logging::init_file_logging(&logging::default_log_path(), cli.verbose),
        (None, None) => logging::init_stderr_logging(cli.verbose),
    }

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            EXIT_USAGE
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    cli.apply_to(&mut config);
    config.validate()?;

    let options = BatchOptions::from_config(&config)?;
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    if let Some(path) = &cli.watch {
        watch(path, options, &config, &cli, cancel).await?;
        return Ok(EXIT_OK);
    }

    let paths = batch::discover(&cli.paths[..])?;
    if paths.is_empty() {
        bail!("no query files found in {}", cli.paths.join(", "));
    }

    let report = BatchRunner::new(options, cancel).run(paths).await;
    print_report(&report, &cli)?;

    Ok(if report.has_failures() {
        EXIT_FAILURES
    } else {
        EXIT_OK
    })
}

async fn watch(
    path: &Path,
    options: BatchOptions,
    config: &Config,
    cli: &Cli,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    if !path.is_file() {
        bail!("cannot watch {}: not a file", path.display());
    }
    eprintln!("Watching {} (Ctrl-C to stop)", path.display());

    let watcher = Watcher::new(path, options, config.watch.poll_interval(), cancel);
    watcher
        .run(|cycle| {
            if let Err(e) = print_cycle(cycle, cli) {
                warn!(error = %e, "could not render report");
            }
        })
        .await;
    Ok(())
}

fn print_cycle(cycle: WatchCycle, cli: &Cli) -> anyhow::Result<()> {
    for name in &cycle.removed {
        println!("removed: {name}");
    }
    if cycle.report.queries.is_empty() && cycle.report.error.is_none() {
        println!("{}: no changes", cycle.report.path.display());
        return Ok(());
    }
    let elapsed = cycle.report.elapsed;
    let report = BatchReport {
        files: vec![cycle.report],
        elapsed,
    };
    print_report(&report, cli)
}

fn print_report(report: &BatchReport, cli: &Cli) -> anyhow::Result<()> {
    let rendered =
        report::render(report, cli.report, cli.show_results()).context("rendering report")?;
    print!("{rendered}");
    if !rendered.ends_with('\n') {
        println!();
    }
    Ok(())
}

/// Cancels `token` on Ctrl-C. In-flight queries finish; the rest are skipped.
fn spawn_interrupt_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight queries");
            token.cancel();
        }
    });
}
