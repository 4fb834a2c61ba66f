//! Harness settings stored in `harness.toml` at the templates root.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::retry::RetryPolicy;

pub const SETTINGS_FILE: &str = "harness.toml";

/// Harness settings (TOML).
///
/// Every field is optional in the file; missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HarnessSettings {
    /// Truncate captured stdout/stderr beyond this many bytes per stream.
    pub output_limit_bytes: usize,
    pub timings: Timings,
    pub invoke: InvokeSettings,
    pub builders: BuilderSettings,
    pub discovery: DiscoverySettings,
    pub prereqs: Vec<PrereqEntry>,
}

/// Fixed delays, attempt budget and per-step timeouts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Timings {
    /// Wait after launching `func run` before the liveness probe.
    pub settle_delay_ms: u64,
    /// Wait after the liveness probe before the first invoke.
    pub warmup_delay_ms: u64,
    pub invoke_retry_delay_ms: u64,
    pub max_invoke_attempts: u32,
    pub create_timeout_secs: u64,
    pub prereq_timeout_secs: u64,
    pub build_timeout_secs: u64,
    pub invoke_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InvokeSettings {
    /// Value passed to `func invoke --request-type`.
    pub request_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuilderSettings {
    /// Languages built with the `host` builder.
    pub host_languages: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Extra language-level directory names to skip.
    pub exclude: Vec<String>,
}

/// A prerequisite command for one (language, template) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrereqEntry {
    pub language: String,
    pub template: String,
    /// Command run inside the target directory (e.g. `["npm", "install"]`).
    pub command: Vec<String>,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            settle_delay_ms: 2_000,
            warmup_delay_ms: 5_000,
            invoke_retry_delay_ms: 2_000,
            max_invoke_attempts: 10,
            create_timeout_secs: 120,
            prereq_timeout_secs: 15 * 60,
            build_timeout_secs: 15 * 60,
            invoke_timeout_secs: 30,
        }
    }
}

impl Timings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn warmup_delay(&self) -> Duration {
        Duration::from_millis(self.warmup_delay_ms)
    }

    pub fn invoke_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_invoke_attempts,
            delay: Duration::from_millis(self.invoke_retry_delay_ms),
        }
    }

    pub fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.create_timeout_secs)
    }

    pub fn prereq_timeout(&self) -> Duration {
        Duration::from_secs(self.prereq_timeout_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke_timeout_secs)
    }
}

impl Default for InvokeSettings {
    fn default() -> Self {
        Self {
            request_type: "GET".to_string(),
        }
    }
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            host_languages: vec!["go".to_string(), "python".to_string()],
        }
    }
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            output_limit_bytes: 100_000,
            timings: Timings::default(),
            invoke: InvokeSettings::default(),
            builders: BuilderSettings::default(),
            discovery: DiscoverySettings::default(),
            prereqs: Vec::new(),
        }
    }
}

impl HarnessSettings {
    pub fn validate(&self) -> Result<()> {
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        let timings = &self.timings;
        if timings.max_invoke_attempts == 0 {
            return Err(anyhow!("timings.max_invoke_attempts must be > 0"));
        }
        for (label, value) in [
            ("create_timeout_secs", timings.create_timeout_secs),
            ("prereq_timeout_secs", timings.prereq_timeout_secs),
            ("build_timeout_secs", timings.build_timeout_secs),
            ("invoke_timeout_secs", timings.invoke_timeout_secs),
        ] {
            if value == 0 {
                return Err(anyhow!("timings.{label} must be > 0"));
            }
        }
        if self.invoke.request_type.trim().is_empty() {
            return Err(anyhow!("invoke.request_type must be non-empty"));
        }
        for (index, entry) in self.prereqs.iter().enumerate() {
            if entry.language.trim().is_empty() || entry.template.trim().is_empty() {
                return Err(anyhow!(
                    "prereqs[{index}] language and template must be non-empty"
                ));
            }
            if entry.command.is_empty() || entry.command[0].trim().is_empty() {
                return Err(anyhow!("prereqs[{index}].command must be a non-empty array"));
            }
        }
        Ok(())
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `HarnessSettings::default()`.
pub fn load_settings(path: &Path) -> Result<HarnessSettings> {
    if !path.exists() {
        let settings = HarnessSettings::default();
        settings.validate()?;
        return Ok(settings);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: HarnessSettings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings
        .validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(settings)
}
