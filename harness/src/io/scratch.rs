//! Scratch directories owned by a single harness run.
//!
//! Layout under `<base>/func-harness_<timestamp>_<id>/`:
//! `targets/<language>/<template>` for each function directory and
//! `logs/<language>/<template>.log` for its step log. Language and template
//! are single path components, so two targets never share a directory even
//! when their joined names collide (`go-x/y` and `go/x-y`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};
use tracing::{debug, warn};

use crate::core::types::Target;

pub const SCRATCH_PREFIX: &str = "func-harness_";
const TARGETS_DIR: &str = "targets";
const LOGS_DIR: &str = "logs";

/// The run's exclusively-owned scratch root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchRoot {
    pub root: PathBuf,
}

impl ScratchRoot {
    /// Create a fresh scratch root under `base`.
    pub fn create(base: &Path) -> Result<Self> {
        fs::create_dir_all(base)
            .with_context(|| format!("create scratch base {}", base.display()))?;
        let name = build_scratch_name(&generate_timestamp(), &generate_short_id());
        let root = base.join(name);
        if root.exists() {
            bail!("scratch root {} already exists", root.display());
        }
        fs::create_dir_all(&root)
            .with_context(|| format!("create scratch root {}", root.display()))?;
        debug!(root = %root.display(), "scratch root created");
        Ok(Self { root })
    }

    pub fn target_dir(&self, target: &Target) -> PathBuf {
        self.root
            .join(TARGETS_DIR)
            .join(&target.language)
            .join(&target.template)
    }

    pub fn log_path(&self, target: &Target) -> PathBuf {
        self.root
            .join(LOGS_DIR)
            .join(&target.language)
            .join(format!("{}.log", target.template))
    }

    /// Create an empty directory for `target`; an existing one is an error.
    pub fn prepare_target_dir(&self, target: &Target) -> Result<PathBuf> {
        let dir = self.target_dir(target);
        if dir.exists() {
            bail!("target directory {} already exists", dir.display());
        }
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        Ok(dir)
    }

    /// Remove a passed target's directory and log.
    pub fn discard_target(&self, target: &Target) -> Result<()> {
        let dir = self.target_dir(target);
        if dir.exists() {
            fs::remove_dir_all(&dir).with_context(|| format!("remove {}", dir.display()))?;
        }
        let log = self.log_path(target);
        if log.exists() {
            fs::remove_file(&log).with_context(|| format!("remove {}", log.display()))?;
        }
        Ok(())
    }

    /// Remove the whole scratch root.
    pub fn remove(self) -> Result<()> {
        fs::remove_dir_all(&self.root)
            .with_context(|| format!("remove {}", self.root.display()))
    }
}

pub fn build_scratch_name(timestamp: &str, short_id: &str) -> String {
    format!("{SCRATCH_PREFIX}{timestamp}_{short_id}")
}

/// Scratch roots left under `base` by earlier runs, sorted.
pub fn list_scratch_roots(base: &Path) -> Result<Vec<PathBuf>> {
    if !base.exists() {
        return Ok(Vec::new());
    }
    let mut roots = Vec::new();
    for entry in fs::read_dir(base).with_context(|| format!("read {}", base.display()))? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(err = %err, "skip unreadable entry");
                continue;
            }
        };
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(SCRATCH_PREFIX) && entry.path().is_dir() {
            roots.push(entry.path());
        }
    }
    roots.sort();
    Ok(roots)
}

fn generate_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

fn generate_short_id() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase()
}
