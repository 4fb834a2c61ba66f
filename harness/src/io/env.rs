//! Run configuration resolved from defaults and environment overrides.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::core::types::{BuilderKind, Target};

/// Override for the `func` executable.
pub const FUNC_BIN_ENV: &str = "FUNC_BIN";
/// Override for the image registry passed to `func build`.
pub const FUNC_REGISTRY_ENV: &str = "FUNC_REGISTRY";
/// Override for the base directory that holds scratch roots.
pub const WORK_DIR_ENV: &str = "HARNESS_WORK_DIR";

pub const DEFAULT_BINARY: &str = "func";
pub const DEFAULT_REGISTRY: &str = "localhost:5000/func-harness";

/// Resolved execution parameters, read-only for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub binary_path: PathBuf,
    pub registry: String,
    /// Base directory under which this run's scratch root is created.
    pub work_dir: PathBuf,
    /// Languages that build with the host builder; everything else uses pack.
    pub host_languages: BTreeSet<String>,
}

impl RunConfig {
    pub fn builder_for(&self, target: &Target) -> BuilderKind {
        if self.host_languages.contains(&target.language) {
            BuilderKind::Host
        } else {
            BuilderKind::Pack
        }
    }
}

/// Resolve a [`RunConfig`] from `lookup` (usually the process environment).
///
/// Never fails: absent or empty overrides fall back to defaults.
pub fn resolve_run_config<F>(lookup: F, host_languages: &[String]) -> RunConfig
where
    F: Fn(&str) -> Option<String>,
{
    let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    RunConfig {
        binary_path: value(FUNC_BIN_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BINARY)),
        registry: value(FUNC_REGISTRY_ENV).unwrap_or_else(|| DEFAULT_REGISTRY.to_string()),
        work_dir: value(WORK_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir),
        host_languages: host_languages.iter().cloned().collect(),
    }
}

/// Resolve from the real process environment.
pub fn resolve_from_process_env(host_languages: &[String]) -> RunConfig {
    resolve_run_config(|key| std::env::var(key).ok(), host_languages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn host() -> Vec<String> {
        vec!["go".to_string(), "python".to_string()]
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let cfg = resolve_run_config(lookup(&[]), &host());
        assert_eq!(cfg.binary_path, PathBuf::from("func"));
        assert_eq!(cfg.registry, DEFAULT_REGISTRY);
        assert_eq!(cfg.work_dir, std::env::temp_dir());
    }

    #[test]
    fn overrides_apply() {
        let cfg = resolve_run_config(
            lookup(&[
                ("FUNC_BIN", "/opt/func/bin/func"),
                ("FUNC_REGISTRY", "quay.io/me"),
                ("HARNESS_WORK_DIR", "/var/tmp/harness"),
            ]),
            &host(),
        );
        assert_eq!(cfg.binary_path, PathBuf::from("/opt/func/bin/func"));
        assert_eq!(cfg.registry, "quay.io/me");
        assert_eq!(cfg.work_dir, PathBuf::from("/var/tmp/harness"));
    }

    #[test]
    fn blank_override_falls_back_to_default() {
        let cfg = resolve_run_config(lookup(&[("FUNC_REGISTRY", "  ")]), &host());
        assert_eq!(cfg.registry, DEFAULT_REGISTRY);
    }

    #[test]
    fn builder_follows_allow_list() {
        let cfg = resolve_run_config(lookup(&[]), &host());
        let go = Target::new("go", "hello", "/t/go/hello");
        let rust = Target::new("rust", "http", "/t/rust/http");
        assert_eq!(cfg.builder_for(&go), BuilderKind::Host);
        assert_eq!(cfg.builder_for(&rust), BuilderKind::Pack);
    }

    #[test]
    fn allow_list_extends_by_adding_a_language() {
        let mut languages = host();
        languages.push("rust".to_string());
        let cfg = resolve_run_config(lookup(&[]), &languages);
        let rust = Target::new("rust", "http", "/t/rust/http");
        assert_eq!(cfg.builder_for(&rust), BuilderKind::Host);
    }
}
