//! Per-target preparation steps run between `func create` and `func build`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::debug;

use crate::core::types::Target;
use crate::io::executor::{CommandExecutor, CommandRequest, render_command};
use crate::io::settings::PrereqEntry;

/// Where and how long a prerequisite may run.
#[derive(Debug, Clone, Copy)]
pub struct PrereqContext<'a> {
    /// The created function directory.
    pub workdir: &'a Path,
    pub log_path: &'a Path,
    pub timeout: Duration,
}

/// A preparation step for a target.
pub trait PrereqStep {
    fn describe(&self) -> String;
    fn run(&self, executor: &dyn CommandExecutor, ctx: &PrereqContext<'_>) -> Result<()>;
}

/// Step for targets that need no preparation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPrereq;

impl PrereqStep for NoopPrereq {
    fn describe(&self) -> String {
        "none".to_string()
    }

    fn run(&self, _executor: &dyn CommandExecutor, _ctx: &PrereqContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Runs one command inside the target directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPrereq {
    pub command: Vec<String>,
}

impl CommandPrereq {
    pub fn new<S: Into<String>>(command: impl IntoIterator<Item = S>) -> Self {
        Self {
            command: command.into_iter().map(Into::into).collect(),
        }
    }
}

impl PrereqStep for CommandPrereq {
    fn describe(&self) -> String {
        self.command.join(" ")
    }

    fn run(&self, executor: &dyn CommandExecutor, ctx: &PrereqContext<'_>) -> Result<()> {
        let Some((program, args)) = self.command.split_first() else {
            bail!("prerequisite command is empty");
        };
        let request = CommandRequest {
            program: PathBuf::from(program),
            args: args.to_vec(),
            workdir: ctx.workdir.to_path_buf(),
            timeout: ctx.timeout,
            log_path: ctx.log_path.to_path_buf(),
        };
        let label = render_command(&request.program, &request.args);
        executor.execute(&request)?.ensure_success(&label)
    }
}

static NOOP: NoopPrereq = NoopPrereq;

/// Maps (language, template) to its preparation step. Unmapped targets get
/// [`NoopPrereq`].
#[derive(Default)]
pub struct PrereqRegistry {
    steps: BTreeMap<(String, String), Box<dyn PrereqStep>>,
}

impl PrereqRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in steps: static-site generation for `go/blog`
    /// and a dependency fetch for `typescript/http`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.insert(
            "go",
            "blog",
            CommandPrereq::new(["go", "generate", "./..."]),
        );
        registry.insert("typescript", "http", CommandPrereq::new(["npm", "install"]));
        registry
    }

    /// Built-ins overlaid with the entries from `harness.toml`.
    pub fn from_entries(entries: &[PrereqEntry]) -> Self {
        let mut registry = Self::with_builtins();
        for entry in entries {
            registry.insert(
                entry.language.clone(),
                entry.template.clone(),
                CommandPrereq::new(entry.command.clone()),
            );
        }
        registry
    }

    /// Register (or replace) the step for a pair.
    pub fn insert(
        &mut self,
        language: impl Into<String>,
        template: impl Into<String>,
        step: impl PrereqStep + 'static,
    ) {
        self.steps
            .insert((language.into(), template.into()), Box::new(step));
    }

    pub fn resolve(&self, target: &Target) -> &dyn PrereqStep {
        let key = (target.language.clone(), target.template.clone());
        match self.steps.get(&key) {
            Some(step) => step.as_ref(),
            None => {
                debug!(target = %target.name(), "no prerequisite registered");
                &NOOP
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::executor::CommandReport;
    use std::cell::RefCell;

    struct RecordingExecutor {
        report: CommandReport,
        calls: RefCell<Vec<CommandRequest>>,
    }

    impl CommandExecutor for RecordingExecutor {
        fn execute(&self, request: &CommandRequest) -> Result<CommandReport> {
            self.calls.borrow_mut().push(request.clone());
            Ok(self.report.clone())
        }
    }

    fn ctx(dir: &Path) -> PrereqContext<'_> {
        PrereqContext {
            workdir: dir,
            log_path: Path::new("/scratch/t.log"),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn unmapped_target_resolves_to_noop() {
        let registry = PrereqRegistry::with_builtins();
        let target = Target::new("rust", "http", "/t/rust/http");
        let executor = RecordingExecutor {
            report: CommandReport::failed(1, "should not run"),
            calls: RefCell::new(Vec::new()),
        };
        let step = registry.resolve(&target);
        assert_eq!(step.describe(), "none");
        step.run(&executor, &ctx(Path::new("/scratch/rust-http")))
            .expect("noop");
        assert!(executor.calls.borrow().is_empty());
    }

    #[test]
    fn mapped_target_runs_command_in_target_dir() {
        let registry = PrereqRegistry::with_builtins();
        let target = Target::new("go", "blog", "/t/go/blog");
        let executor = RecordingExecutor {
            report: CommandReport::ok(),
            calls: RefCell::new(Vec::new()),
        };
        registry
            .resolve(&target)
            .run(&executor, &ctx(Path::new("/scratch/go-blog")))
            .expect("prereq");

        let calls = executor.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, PathBuf::from("go"));
        assert_eq!(calls[0].args, vec!["generate", "./..."]);
        assert_eq!(calls[0].workdir, PathBuf::from("/scratch/go-blog"));
    }

    #[test]
    fn failing_command_is_an_error() {
        let mut registry = PrereqRegistry::new();
        registry.insert("node", "blog", CommandPrereq::new(["npm", "ci"]));
        let target = Target::new("node", "blog", "/t/node/blog");
        let executor = RecordingExecutor {
            report: CommandReport::failed(1, "npm ERR! missing lockfile"),
            calls: RefCell::new(Vec::new()),
        };
        let err = registry
            .resolve(&target)
            .run(&executor, &ctx(Path::new("/scratch/node-blog")))
            .expect_err("prereq fails");
        assert!(err.to_string().contains("npm ci"));
    }

    #[test]
    fn settings_entries_override_builtins() {
        let registry = PrereqRegistry::from_entries(&[PrereqEntry {
            language: "go".to_string(),
            template: "blog".to_string(),
            command: vec!["hugo".to_string(), "--minify".to_string()],
        }]);
        let target = Target::new("go", "blog", "/t/go/blog");
        assert_eq!(registry.resolve(&target).describe(), "hugo --minify");
        let untouched = Target::new("typescript", "http", "/t/typescript/http");
        assert_eq!(registry.resolve(&untouched).describe(), "npm install");
    }
}
