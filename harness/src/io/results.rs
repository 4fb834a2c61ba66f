//! Persisted run record (`results.json`) for runs that left failures behind.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::TargetResult;

pub const RESULTS_FILE: &str = "results.json";

/// Metadata for a harness run plus every target result in discovery order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub start_time: String,
    pub end_time: String,
    pub duration_secs: f64,
    pub root: String,
    pub binary: String,
    pub registry: String,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<TargetResult>,
}

/// Input for building a [`RunRecord`].
#[derive(Debug)]
pub struct RecordInput<'a> {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub root: &'a Path,
    pub binary: &'a Path,
    pub registry: &'a str,
    pub results: &'a [TargetResult],
}

impl RunRecord {
    pub fn new(input: &RecordInput<'_>) -> Self {
        let duration = input.finished_at - input.started_at;
        let passed = input.results.iter().filter(|r| r.is_passed()).count();
        Self {
            start_time: input.started_at.to_rfc3339(),
            end_time: input.finished_at.to_rfc3339(),
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            root: input.root.display().to_string(),
            binary: input.binary.display().to_string(),
            registry: input.registry.to_string(),
            passed,
            failed: input.results.len() - passed,
            results: input.results.to_vec(),
        }
    }
}

/// Write `results.json` into `dir`, returning its path.
pub fn write_record(dir: &Path, record: &RunRecord) -> Result<PathBuf> {
    let path = dir.join(RESULTS_FILE);
    let contents = serde_json::to_string_pretty(record).context("serialize results")?;
    fs::write(&path, format!("{contents}\n"))
        .with_context(|| format!("write results {}", path.display()))?;
    Ok(path)
}

pub fn read_record(path: &Path) -> Result<RunRecord> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}
