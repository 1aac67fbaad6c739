mod progress;
mod select;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use std::path::Path;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::bulk::{
    AbortCause, BulkEngine, BulkOperationResult, BulkOptions, InvalidTarget, Operation, RunReport,
    TaskStatus,
};
use crate::config::{BulkSettings, concurrency_slots, load_config};
use crate::git::Git2Backend;

pub use select::select;

/// Command-line overrides for a run. `None` falls back to `[bulk]` in the config.
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    pub repos: Vec<String>,
    pub max_concurrent: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub abort_on_error: bool,
}

/// Run `operation` over the configured repositories.
///
/// High-level flow:
/// 1. Load configuration and select targets (`--repo` globs).
/// 2. Register configured locks with the engine and start the run.
/// 3. Drive a progress bar from the engine's progress snapshots.
/// 4. Print one line per repository, the rejected targets, and a summary.
///
/// The first Ctrl-C stops dispatch and lets in-flight repositories finish so
/// the report is still printed; a second one exits immediately.
///
/// Failures in individual repositories are reported on their own line;
/// the command as a whole fails if any repository failed.
pub fn cmd_run(config_path: Option<&Path>, operation: Operation, settings: &RunSettings) -> Result<()> {
    let cfg = load_config(config_path)?;
    let targets = select(&cfg.targets()?, &settings.repos)?;
    if targets.is_empty() {
        eprintln!("no repositories configured");
        return Ok(());
    }
    let options = run_options(&cfg.bulk, settings);

    let engine = Arc::new(BulkEngine::new(Arc::new(Git2Backend::new())));
    for r in &cfg.repositories {
        if let Some(reason) = &r.locked {
            engine.lock(r.id(), reason.clone());
        }
    }
    watch_interrupts(Arc::clone(&engine));

    let pb = progress::new_bar(targets.len(), operation.name());
    let bar = pb.clone();
    engine.on_progress(move |s| progress::update_bar(&bar, s));

    let report = engine
        .start(&targets, operation, options)
        .context("failed to start bulk run")?
        .wait()?;

    let s = report.stats();
    progress::finish_bar(&pb, s.failed, summary_line(&report));
    print_report(&report);

    if s.failed > 0 {
        bail!("{} of {} repositories failed", s.failed, s.total);
    }
    Ok(())
}

/// `[bulk]` settings with command-line overrides applied.
fn run_options(bulk: &BulkSettings, settings: &RunSettings) -> BulkOptions {
    let mut options = bulk.options();
    if let Some(n) = settings.max_concurrent {
        options.max_concurrent = concurrency_slots(n);
    }
    if let Some(ms) = settings.timeout_ms {
        options.timeout = Duration::from_millis(ms);
    }
    options.abort_on_error |= settings.abort_on_error;
    options
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    Aborting,
    Exit,
}

/// React to one Ctrl-C: abort the active run, or ask to exit when there is
/// nothing left to abort.
fn on_interrupt(engine: &BulkEngine) -> Interrupt {
    match engine.abort() {
        Ok(()) => Interrupt::Aborting,
        Err(_) => Interrupt::Exit,
    }
}

fn watch_interrupts(engine: Arc<BulkEngine>) {
    let spawned = thread::Builder::new()
        .name("gitfleet-signal".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot install Ctrl-C handler");
                    return;
                }
            };
            loop {
                if let Err(e) = rt.block_on(tokio::signal::ctrl_c()) {
                    tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                    return;
                }
                match on_interrupt(&engine) {
                    Interrupt::Aborting => {
                        eprintln!("interrupted: waiting for running repositories (Ctrl-C again to quit)");
                    }
                    Interrupt::Exit => process::exit(130),
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "cannot spawn Ctrl-C watcher");
    }
}

fn summary_line(report: &RunReport) -> String {
    let s = report.stats();
    let mut line = format!(
        "{}: {} completed, {} failed, {} skipped, {} invalid in {:.1}s (avg {:.0} ms)",
        report.operation,
        s.completed,
        s.failed,
        s.skipped,
        report.invalid.len(),
        report.elapsed.as_secs_f64(),
        s.avg_duration_ms
    );
    match &report.abort {
        Some(AbortCause::TaskFailed { repository_id }) => {
            line.push_str(&format!(", stopped after {} failed", repository_id));
        }
        Some(AbortCause::Requested) => line.push_str(", aborted"),
        None => {}
    }
    line
}

fn print_report(report: &RunReport) {
    for r in report.ordered() {
        println!("{}", result_line(r));
    }
    for i in &report.invalid {
        println!("{}", invalid_line(i));
    }
}

fn result_line(r: &BulkOperationResult) -> String {
    let took = r
        .duration_ms
        .map(|ms| format!(" ({} ms)", ms))
        .unwrap_or_default();
    match r.status {
        TaskStatus::Completed => format!(
            "{} {} {}{}",
            "✔".green(),
            r.repository_name.bold(),
            r.output.as_deref().unwrap_or(""),
            took.dimmed()
        ),
        TaskStatus::Failed => format!(
            "{} {} {}{}",
            "✘".red(),
            r.repository_name.bold(),
            r.error.as_deref().unwrap_or("failed").red(),
            took.dimmed()
        ),
        TaskStatus::Skipped => format!(
            "{} {} {}",
            "-".yellow(),
            r.repository_name.bold(),
            r.error.as_deref().unwrap_or("skipped").yellow()
        ),
        TaskStatus::Pending | TaskStatus::Running => {
            format!("? {} {}", r.repository_name, r.status)
        }
    }
}

pub(crate) fn invalid_line(i: &InvalidTarget) -> String {
    format!(
        "{} {} {}",
        "!".magenta(),
        i.target.name.bold(),
        i.reason.magenta()
    )
}
