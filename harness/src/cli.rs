//! CLI command implementations.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::types::Outcome;
use crate::io::discover::discover_targets;
use crate::io::env::{RunConfig, resolve_from_process_env};
use crate::io::executor::{CommandExecutor, ProcessLauncher, SystemExecutor};
use crate::io::func::repository_uri;
use crate::io::prereq::PrereqRegistry;
use crate::io::results::{RecordInput, RunRecord, write_record};
use crate::io::scratch::{ScratchRoot, list_scratch_roots};
use crate::io::settings::{HarnessSettings, SETTINGS_FILE, load_settings};
use crate::lifecycle::LifecycleContext;
use crate::report::Reporter;
use crate::run::run_all;

/// What a finished harness run leaves behind.
#[derive(Debug)]
pub struct HarnessRun {
    pub reporter: Reporter,
    /// The run's scratch root (removed when every target passed).
    pub scratch_root: PathBuf,
    /// `results.json`, written only when something failed.
    pub results_path: Option<PathBuf>,
}

/// Run every target under `root` against the real `func` binary and print the
/// summary. Returns the process exit code.
pub fn run_harness(root: &Path) -> Result<i32> {
    let settings = load_settings(&root.join(SETTINGS_FILE))?;
    let run = resolve_from_process_env(&settings.builders.host_languages);
    debug!(?run, "run config resolved");
    let executor = SystemExecutor::new(settings.output_limit_bytes);

    let outcome = execute_run(root, &settings, &run, &executor, &executor)?;

    let mut stdout = std::io::stdout().lock();
    outcome.reporter.render(&mut stdout)?;
    if let Some(path) = &outcome.results_path {
        writeln!(stdout, "results: {}", path.display()).context("write summary")?;
    }
    Ok(outcome.reporter.exit_code())
}

/// Discover, run and record all targets. Only configuration problems are
/// returned as errors; target failures end up in the reporter.
pub fn execute_run<E: CommandExecutor, L: ProcessLauncher>(
    root: &Path,
    settings: &HarnessSettings,
    run: &RunConfig,
    executor: &E,
    launcher: &L,
) -> Result<HarnessRun> {
    let targets =
        discover_targets(root, &settings.discovery.exclude).context("discover targets")?;
    let root = root
        .canonicalize()
        .with_context(|| format!("resolve {}", root.display()))?;
    let scratch = ScratchRoot::create(&run.work_dir).context("create scratch root")?;
    let prereqs = PrereqRegistry::from_entries(&settings.prereqs);
    let repository = repository_uri(&root);

    let ctx = LifecycleContext {
        run,
        timings: &settings.timings,
        request_type: &settings.invoke.request_type,
        repository: &repository,
        scratch: &scratch,
        prereqs: &prereqs,
    };

    info!(
        root = %root.display(),
        scratch = %scratch.root.display(),
        binary = %run.binary_path.display(),
        registry = %run.registry,
        "harness run started"
    );
    let started_at = Utc::now();
    let mut reporter = Reporter::new();
    run_all(targets, &ctx, executor, launcher, |result| {
        let outcome = match result.outcome {
            Outcome::Passed => "passed",
            Outcome::Failed => "failed",
            Outcome::Pending => "pending",
        };
        println!(
            "target: name={} outcome={} attempts={} duration_secs={:.2}",
            result.name, outcome, result.invoke_attempts, result.duration_secs
        );
        reporter.record(result);
    });
    let finished_at = Utc::now();

    if reporter.results().is_empty() {
        warn!(root = %root.display(), "no targets discovered");
    }

    let scratch_root = scratch.root.clone();
    let mut results_path = None;
    if reporter.all_passed() {
        if let Err(err) = scratch.remove() {
            warn!(err = %format!("{err:#}"), "could not remove scratch root");
        }
    } else {
        let record = RunRecord::new(&RecordInput {
            started_at,
            finished_at,
            root: &root,
            binary: &run.binary_path,
            registry: &run.registry,
            results: reporter.results(),
        });
        match write_record(&scratch_root, &record) {
            Ok(path) => results_path = Some(path),
            Err(err) => warn!(err = %format!("{err:#}"), "could not write results"),
        }
    }

    Ok(HarnessRun {
        reporter,
        scratch_root,
        results_path,
    })
}

/// Print every discoverable target with the builder it would use.
pub fn list_targets(root: &Path) -> Result<()> {
    let settings = load_settings(&root.join(SETTINGS_FILE))?;
    let run = resolve_from_process_env(&settings.builders.host_languages);
    write_target_list(root, &settings, &run, &mut std::io::stdout().lock())
}

/// One `<name> <builder>` line per target, in discovery order.
pub fn write_target_list<W: Write>(
    root: &Path,
    settings: &HarnessSettings,
    run: &RunConfig,
    out: &mut W,
) -> Result<()> {
    for target in discover_targets(root, &settings.discovery.exclude)? {
        writeln!(out, "{} {}", target.name(), run.builder_for(&target))
            .context("write target list")?;
    }
    Ok(())
}

/// Remove scratch roots preserved by earlier runs.
pub fn clean_scratch() -> Result<()> {
    let run = resolve_from_process_env(&[]);
    clean_scratch_in(&run.work_dir, &mut std::io::stdout().lock()).map(|_| ())
}

/// Remove every scratch root under `work_dir` and report each one. Returns
/// the number removed; anything not named like a scratch root is left alone.
pub fn clean_scratch_in<W: Write>(work_dir: &Path, out: &mut W) -> Result<usize> {
    let roots = list_scratch_roots(work_dir)?;
    for root in &roots {
        std::fs::remove_dir_all(root).with_context(|| format!("remove {}", root.display()))?;
        writeln!(out, "clean: removed {}", root.display()).context("write clean report")?;
    }
    writeln!(
        out,
        "clean: base={} removed={}",
        work_dir.display(),
        roots.len()
    )
    .context("write clean report")?;
    Ok(roots.len())
}
