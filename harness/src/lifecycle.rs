//! Per-target lifecycle: create, prerequisites, build, start, warm-up, invoke,
//! teardown.
//!
//! Steps run strictly in order. The first failing step ends the sequence;
//! teardown runs either way, and only then is the target's result produced.
//! Nothing a target does can fail the surrounding run.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::retry::retry_fixed;
use crate::core::types::{Outcome, Stage, StepFailure, Target, TargetResult};
use crate::io::env::RunConfig;
use crate::io::executor::{CommandExecutor, ProcessLauncher};
use crate::io::func::FuncCli;
use crate::io::prereq::{PrereqContext, PrereqRegistry};
use crate::io::process::ProcessHandle;
use crate::io::scratch::ScratchRoot;
use crate::io::settings::Timings;

/// Everything a target's lifecycle reads; shared by all targets of a run.
#[derive(Clone, Copy)]
pub struct LifecycleContext<'a> {
    pub run: &'a RunConfig,
    pub timings: &'a Timings,
    /// Passed to `func invoke --request-type`.
    pub request_type: &'a str,
    /// Template repository URI passed to `func create`.
    pub repository: &'a str,
    pub scratch: &'a ScratchRoot,
    pub prereqs: &'a PrereqRegistry,
}

/// Mutable record for the one target currently executing.
pub struct ExecutionState {
    pub target_dir: PathBuf,
    pub process: Option<Box<dyn ProcessHandle>>,
    /// Invoke attempts performed so far.
    pub attempts: u32,
    pub outcome: Outcome,
}

impl ExecutionState {
    pub fn new(target_dir: PathBuf) -> Self {
        Self {
            target_dir,
            process: None,
            attempts: 0,
            outcome: Outcome::Pending,
        }
    }
}

/// Drive `target` through its lifecycle and return its result.
///
/// On pass the target directory and log are removed; on failure both are kept
/// and reported.
#[instrument(skip_all, fields(target = %target.name()))]
pub fn run_target<E: CommandExecutor, L: ProcessLauncher>(
    target: &Target,
    ctx: &LifecycleContext<'_>,
    executor: &E,
    launcher: &L,
) -> TargetResult {
    let started = Instant::now();
    info!("target started");

    let mut state = ExecutionState::new(ctx.scratch.target_dir(target));
    let log_path = ctx.scratch.log_path(target);

    let steps = drive(target, ctx, executor, launcher, &mut state, &log_path);
    teardown(&mut state);

    let duration_secs = started.elapsed().as_secs_f64();
    match steps {
        Ok(()) => {
            state.outcome = Outcome::Passed;
            if let Err(err) = ctx.scratch.discard_target(target) {
                warn!(err = %format!("{err:#}"), "could not remove passed target directory");
            }
            info!(attempts = state.attempts, duration_secs, "target passed");
            TargetResult::passed(target, state.attempts, duration_secs)
        }
        Err(failure) => {
            state.outcome = Outcome::Failed;
            warn!(
                stage = %failure.stage,
                error = %failure.message,
                preserved = %state.target_dir.display(),
                "target failed"
            );
            TargetResult::failed(
                target,
                &failure,
                state.target_dir.clone(),
                log_path,
                state.attempts,
                duration_secs,
            )
        }
    }
}

fn drive<E: CommandExecutor, L: ProcessLauncher>(
    target: &Target,
    ctx: &LifecycleContext<'_>,
    executor: &E,
    launcher: &L,
    state: &mut ExecutionState,
    log_path: &Path,
) -> Result<(), StepFailure> {
    let target_dir = state.target_dir.clone();
    let func = FuncCli::new(&ctx.run.binary_path, &target_dir, log_path);

    debug!(stage = %Stage::Create, "step");
    create(target, ctx, executor, &func).map_err(at(Stage::Create))?;

    debug!(stage = %Stage::Prereqs, "step");
    prereqs(target, ctx, executor, &func).map_err(at(Stage::Prereqs))?;

    debug!(stage = %Stage::Build, "step");
    build(target, ctx, executor, &func).map_err(at(Stage::Build))?;

    debug!(stage = %Stage::Start, "step");
    start(ctx, launcher, &func, state).map_err(at(Stage::Start))?;

    debug!(stage = %Stage::Ready, "step");
    ready(ctx, state).map_err(at(Stage::Ready))?;

    debug!(stage = %Stage::Invoke, "step");
    invoke(ctx, executor, &func, state).map_err(at(Stage::Invoke))?;

    Ok(())
}

fn at(stage: Stage) -> impl Fn(anyhow::Error) -> StepFailure {
    move |err| StepFailure::new(stage, &err)
}

fn create<E: CommandExecutor>(
    target: &Target,
    ctx: &LifecycleContext<'_>,
    executor: &E,
    func: &FuncCli<'_>,
) -> Result<()> {
    ctx.scratch.prepare_target_dir(target)?;
    let request = func.create(target, ctx.repository, ctx.timings.create_timeout());
    executor
        .execute(&request)
        .context("run func create")?
        .ensure_success("func create")?;

    // The exit code alone is not trusted.
    let manifest = func.manifest_path();
    if !manifest.exists() {
        bail!(
            "func create reported success but {} is missing",
            manifest.display()
        );
    }
    Ok(())
}

fn prereqs<E: CommandExecutor>(
    target: &Target,
    ctx: &LifecycleContext<'_>,
    executor: &E,
    func: &FuncCli<'_>,
) -> Result<()> {
    let step = ctx.prereqs.resolve(target);
    debug!(prereq = %step.describe(), "running prerequisite");
    step.run(
        executor,
        &PrereqContext {
            workdir: func.target_dir,
            log_path: func.log_path,
            timeout: ctx.timings.prereq_timeout(),
        },
    )
}

fn build<E: CommandExecutor>(
    target: &Target,
    ctx: &LifecycleContext<'_>,
    executor: &E,
    func: &FuncCli<'_>,
) -> Result<()> {
    let builder = ctx.run.builder_for(target);
    debug!(builder = %builder, registry = %ctx.run.registry, "building");
    let request = func.build(builder, &ctx.run.registry, ctx.timings.build_timeout());
    executor
        .execute(&request)
        .context("run func build")?
        .ensure_success("func build")
}

fn start<L: ProcessLauncher>(
    ctx: &LifecycleContext<'_>,
    launcher: &L,
    func: &FuncCli<'_>,
    state: &mut ExecutionState,
) -> Result<()> {
    let handle = launcher.launch(&func.run()).context("launch func run")?;
    debug!(pid = ?handle.id(), "func run launched");
    let process = state.process.insert(handle);

    thread::sleep(ctx.timings.settle_delay());
    if !process.is_alive() {
        bail!(
            "func run exited within {}ms of starting",
            ctx.timings.settle_delay_ms
        );
    }
    Ok(())
}

/// Fixed warm-up, then make sure the server is still there to be invoked.
fn ready(ctx: &LifecycleContext<'_>, state: &mut ExecutionState) -> Result<()> {
    thread::sleep(ctx.timings.warmup_delay());
    if let Some(process) = state.process.as_mut()
        && !process.is_alive()
    {
        bail!(
            "func run exited during the {}ms warm-up",
            ctx.timings.warmup_delay_ms
        );
    }
    Ok(())
}

fn invoke<E: CommandExecutor>(
    ctx: &LifecycleContext<'_>,
    executor: &E,
    func: &FuncCli<'_>,
    state: &mut ExecutionState,
) -> Result<()> {
    let request = func.invoke(ctx.request_type, ctx.timings.invoke_timeout());
    let outcome = retry_fixed(ctx.timings.invoke_retry(), thread::sleep, |attempt| {
        let result = executor
            .execute(&request)
            .and_then(|report| report.ensure_success("func invoke"));
        if let Err(err) = &result {
            debug!(attempt, err = %format!("{err:#}"), "invoke attempt failed");
        }
        result
    });
    state.attempts = outcome.attempts;

    match outcome.result {
        Ok(()) => {
            debug!(attempts = outcome.attempts, "invoke succeeded");
            Ok(())
        }
        Err(Some(err)) => Err(err.context(format!(
            "func invoke failed after {} attempts",
            outcome.attempts
        ))),
        Err(None) => Err(anyhow!("func invoke was never attempted")),
    }
}

/// Stop the background process if one was launched. Errors are dropped: a
/// process that already exited cannot be signalled.
fn teardown(state: &mut ExecutionState) {
    let Some(mut process) = state.process.take() else {
        return;
    };
    let pid = process.id();
    match process.terminate() {
        Ok(()) => debug!(pid = ?pid, "background process terminated"),
        Err(err) => debug!(pid = ?pid, err = %format!("{err:#}"), "ignoring terminate error"),
    }
}
