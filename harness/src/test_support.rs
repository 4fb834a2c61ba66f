//! Test-only fakes for the `func` CLI and a template-tree fixture.
//!
//! The scripted executor and launcher identify the target from the request's
//! working directory (always the target directory) and append every call to a
//! shared [`Journal`], so tests can assert on exact step order.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::types::Target;
use crate::io::discover::{Discovery, discover_targets};
use crate::io::env::{DEFAULT_REGISTRY, RunConfig};
use crate::io::executor::{
    CommandExecutor, CommandReport, CommandRequest, LaunchRequest, ProcessLauncher,
};
use crate::io::func::{MANIFEST_FILE, repository_uri};
use crate::io::prereq::PrereqRegistry;
use crate::io::process::ProcessHandle;
use crate::io::scratch::ScratchRoot;
use crate::io::settings::Timings;
use crate::lifecycle::LifecycleContext;

/// Ordered record of `(target, action)` pairs shared by the fakes.
#[derive(Debug, Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<(String, String)>>>);

impl Journal {
    pub fn record(&self, target: &str, action: &str) {
        self.0
            .borrow_mut()
            .push((target.to_string(), action.to_string()));
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        self.0.borrow().clone()
    }

    pub fn actions_for(&self, target: &str) -> Vec<String> {
        self.0
            .borrow()
            .iter()
            .filter(|(name, _)| name == target)
            .map(|(_, action)| action.clone())
            .collect()
    }

    pub fn count(&self, target: &str, action: &str) -> usize {
        self.0
            .borrow()
            .iter()
            .filter(|(name, act)| name == target && act == action)
            .count()
    }

    /// Index of the first `(target, action)` entry.
    pub fn position(&self, target: &str, action: &str) -> Option<usize> {
        self.0
            .borrow()
            .iter()
            .position(|(name, act)| name == target && act == action)
    }
}

/// `<language>-<template>` from a `.../<language>/<template>` target directory.
fn target_of(workdir: &Path) -> String {
    let component = |path: Option<&Path>| {
        path.and_then(Path::file_name)
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    };
    format!(
        "{}-{}",
        component(workdir.parent()),
        component(Some(workdir))
    )
}

/// Scripted [`CommandExecutor`]: every command succeeds unless told otherwise.
///
/// `func` subcommands are journaled by name (`create`, `build`, `invoke`);
/// anything else is journaled as `prereq:<program>`. A successful `create`
/// writes the manifest into the target directory.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    journal: Journal,
    failures: BTreeSet<(String, String)>,
    skip_manifest: BTreeSet<String>,
    invoke_ready_on: BTreeMap<String, u32>,
    invoke_counts: RefCell<BTreeMap<String, u32>>,
    requests: RefCell<Vec<CommandRequest>>,
}

impl ScriptedExecutor {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    /// Make `action` fail for `target`.
    pub fn fail(mut self, target: &str, action: &str) -> Self {
        self.failures
            .insert((target.to_string(), action.to_string()));
        self
    }

    /// Report success from `create` without writing the manifest.
    pub fn skip_manifest(mut self, target: &str) -> Self {
        self.skip_manifest.insert(target.to_string());
        self
    }

    /// Fail every invoke before attempt `attempt` (1-based) for `target`.
    pub fn invoke_ready_on(mut self, target: &str, attempt: u32) -> Self {
        self.invoke_ready_on.insert(target.to_string(), attempt);
        self
    }

    pub fn requests(&self) -> Vec<CommandRequest> {
        self.requests.borrow().clone()
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute(&self, request: &CommandRequest) -> Result<CommandReport> {
        let target = target_of(&request.workdir);
        let program = request
            .program
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let action = if program == "func" {
            request.args.first().cloned().unwrap_or_default()
        } else {
            format!("prereq:{program}")
        };
        self.journal.record(&target, &action);
        self.requests.borrow_mut().push(request.clone());

        if self.failures.contains(&(target.clone(), action.clone())) {
            return Ok(CommandReport::failed(1, format!("scripted {action} failure")));
        }

        match action.as_str() {
            "create" if !self.skip_manifest.contains(&target) => {
                let manifest = request.workdir.join(MANIFEST_FILE);
                fs::write(&manifest, format!("name: {target}\n"))
                    .with_context(|| format!("write {}", manifest.display()))?;
            }
            "invoke" => {
                let mut counts = self.invoke_counts.borrow_mut();
                let attempt = counts.entry(target.clone()).or_insert(0);
                *attempt += 1;
                let ready_on = self.invoke_ready_on.get(&target).copied().unwrap_or(1);
                if *attempt < ready_on {
                    return Ok(CommandReport::failed(1, "connection refused"));
                }
            }
            _ => {}
        }
        Ok(CommandReport::ok())
    }
}

/// Scripted [`ProcessLauncher`] handing out [`ScriptedProcess`] handles.
#[derive(Debug, Default)]
pub struct ScriptedLauncher {
    journal: Journal,
    /// Liveness probes each target's process survives before it dies.
    lifetimes: BTreeMap<String, u32>,
    launch_failures: BTreeSet<String>,
}

impl ScriptedLauncher {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    /// The process for `target` is already dead by the settle probe.
    pub fn exits_immediately(mut self, target: &str) -> Self {
        self.lifetimes.insert(target.to_string(), 0);
        self
    }

    /// The process for `target` passes the settle probe, then dies.
    pub fn exits_during_warmup(mut self, target: &str) -> Self {
        self.lifetimes.insert(target.to_string(), 1);
        self
    }

    /// `launch` itself errors for `target`.
    pub fn fail_launch(mut self, target: &str) -> Self {
        self.launch_failures.insert(target.to_string());
        self
    }
}

impl ProcessLauncher for ScriptedLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<Box<dyn ProcessHandle>> {
        let target = target_of(&request.workdir);
        self.journal.record(&target, "launch");
        if self.launch_failures.contains(&target) {
            return Err(anyhow!("scripted launch failure"));
        }
        Ok(Box::new(ScriptedProcess {
            alive: true,
            probes_left: self.lifetimes.get(&target).copied(),
            target,
            journal: self.journal.clone(),
        }))
    }
}

#[derive(Debug)]
pub struct ScriptedProcess {
    target: String,
    alive: bool,
    probes_left: Option<u32>,
    journal: Journal,
}

impl ProcessHandle for ScriptedProcess {
    fn id(&self) -> Option<u32> {
        None
    }

    fn is_alive(&mut self) -> bool {
        match &mut self.probes_left {
            Some(0) => self.alive = false,
            Some(left) => *left -= 1,
            None => {}
        }
        self.alive
    }

    fn terminate(&mut self) -> Result<()> {
        self.journal.record(&self.target, "terminate");
        if !self.is_alive() {
            return Err(anyhow!("process for {} already exited", self.target));
        }
        self.alive = false;
        Ok(())
    }
}

/// Timings with no delays and a small invoke budget.
pub fn fast_timings() -> Timings {
    Timings {
        settle_delay_ms: 0,
        warmup_delay_ms: 0,
        invoke_retry_delay_ms: 0,
        max_invoke_attempts: 3,
        create_timeout_secs: 5,
        prereq_timeout_secs: 5,
        build_timeout_secs: 5,
        invoke_timeout_secs: 5,
    }
}

/// A template tree plus scratch root and everything a lifecycle needs.
pub struct TemplateTree {
    pub templates: TempDir,
    pub work: TempDir,
    pub scratch: ScratchRoot,
    pub run: RunConfig,
    pub timings: Timings,
    pub prereqs: PrereqRegistry,
    pub repository: String,
    journal: Journal,
}

impl TemplateTree {
    /// Create `<templates>/<language>/<template>` for each pair.
    pub fn new(pairs: &[(&str, &str)]) -> Result<Self> {
        let templates = tempfile::tempdir().context("templates tempdir")?;
        for (language, template) in pairs {
            let dir = templates.path().join(language).join(template);
            fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        }
        let work = tempfile::tempdir().context("work tempdir")?;
        let scratch = ScratchRoot::create(work.path())?;
        let run = RunConfig {
            binary_path: PathBuf::from("func"),
            registry: DEFAULT_REGISTRY.to_string(),
            work_dir: work.path().to_path_buf(),
            host_languages: ["go".to_string(), "python".to_string()].into(),
        };
        let repository = repository_uri(templates.path());
        Ok(Self {
            templates,
            work,
            scratch,
            run,
            timings: fast_timings(),
            prereqs: PrereqRegistry::with_builtins(),
            repository,
            journal: Journal::default(),
        })
    }

    pub fn root(&self) -> &Path {
        self.templates.path()
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    pub fn context(&self) -> LifecycleContext<'_> {
        LifecycleContext {
            run: &self.run,
            timings: &self.timings,
            request_type: "GET",
            repository: &self.repository,
            scratch: &self.scratch,
            prereqs: &self.prereqs,
        }
    }

    pub fn target(&self, language: &str, template: &str) -> Target {
        Target::new(
            language,
            template,
            self.root().join(language).join(template),
        )
    }

    pub fn discover(&self) -> Result<Discovery> {
        discover_targets(self.root(), &[])
    }
}
