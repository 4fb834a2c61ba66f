//! Sequential driver across all discovered targets.

use tracing::{debug, info};

use crate::core::types::{Target, TargetResult};
use crate::io::executor::{CommandExecutor, ProcessLauncher};
use crate::lifecycle::{LifecycleContext, run_target};

/// Run every target in order, one at a time, handing each result to
/// `on_result` after that target's teardown.
///
/// A failing target never stops the loop. Returns the number of targets run.
pub fn run_all<I, E, L, F>(
    targets: I,
    ctx: &LifecycleContext<'_>,
    executor: &E,
    launcher: &L,
    mut on_result: F,
) -> usize
where
    I: IntoIterator<Item = Target>,
    E: CommandExecutor,
    L: ProcessLauncher,
    F: FnMut(TargetResult),
{
    let mut count = 0usize;
    for target in targets {
        count += 1;
        debug!(index = count, target = %target.name(), "next target");
        let result = run_target(&target, ctx, executor, launcher);
        on_result(result);
    }
    info!(targets = count, "all targets finished");
    count
}
