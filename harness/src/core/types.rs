use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One (language, template) pair discovered under the templates root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub language: String,
    pub template: String,
    /// `<root>/<language>/<template>`.
    pub source_dir: PathBuf,
}

impl Target {
    pub fn new(
        language: impl Into<String>,
        template: impl Into<String>,
        source_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            language: language.into(),
            template: template.into(),
            source_dir: source_dir.into(),
        }
    }

    /// Stable identifier used for scratch directories and reporting.
    pub fn name(&self) -> String {
        format!("{}-{}", self.language, self.template)
    }
}

/// Backend used by `func build` to produce a runnable image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuilderKind {
    Host,
    Pack,
}

impl BuilderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BuilderKind::Host => "host",
            BuilderKind::Pack => "pack",
        }
    }
}

impl fmt::Display for BuilderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pending,
    Passed,
    Failed,
}

/// Lifecycle steps in execution order. Teardown is not a stage: it always runs
/// and never changes the outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Create,
    Prereqs,
    Build,
    Start,
    Ready,
    Invoke,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Create => "create",
            Stage::Prereqs => "prereqs",
            Stage::Build => "build",
            Stage::Start => "start",
            Stage::Ready => "ready",
            Stage::Invoke => "invoke",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable per-target summary handed to the reporter.
///
/// `preserved_path`, `log_path`, `failed_stage` and `error` are present iff
/// `outcome` is [`Outcome::Failed`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetResult {
    pub name: String,
    pub language: String,
    pub template: String,
    pub outcome: Outcome,
    pub preserved_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub failed_stage: Option<Stage>,
    pub error: Option<String>,
    /// Number of `func invoke` attempts performed (0 if never reached).
    pub invoke_attempts: u32,
    pub duration_secs: f64,
}

impl TargetResult {
    pub fn passed(target: &Target, invoke_attempts: u32, duration_secs: f64) -> Self {
        Self {
            name: target.name(),
            language: target.language.clone(),
            template: target.template.clone(),
            outcome: Outcome::Passed,
            preserved_path: None,
            log_path: None,
            failed_stage: None,
            error: None,
            invoke_attempts,
            duration_secs,
        }
    }

    pub fn failed(
        target: &Target,
        failure: &StepFailure,
        preserved_path: PathBuf,
        log_path: PathBuf,
        invoke_attempts: u32,
        duration_secs: f64,
    ) -> Self {
        Self {
            name: target.name(),
            language: target.language.clone(),
            template: target.template.clone(),
            outcome: Outcome::Failed,
            preserved_path: Some(preserved_path),
            log_path: Some(log_path),
            failed_stage: Some(failure.stage),
            error: Some(failure.message.clone()),
            invoke_attempts,
            duration_secs,
        }
    }

    pub fn is_passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }
}

/// The first step error of a target, tagged with the stage it happened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub stage: Stage,
    pub message: String,
}

impl StepFailure {
    pub fn new(stage: Stage, err: &anyhow::Error) -> Self {
        Self {
            stage,
            message: format!("{err:#}"),
        }
    }
}
