//! Result accumulation and the end-of-run summary.

use std::io::Write;

use anyhow::{Context, Result};

use crate::core::types::TargetResult;
use crate::exit_codes;

/// Pass/fail counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

/// Append-only, ordered list of target results.
#[derive(Debug, Default)]
pub struct Reporter {
    results: Vec<TargetResult>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one result. Results are kept in the order recorded; nothing is
    /// reordered or deduplicated.
    pub fn record(&mut self, result: TargetResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[TargetResult] {
        &self.results
    }

    pub fn passed(&self) -> impl Iterator<Item = &TargetResult> {
        self.results.iter().filter(|result| result.is_passed())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TargetResult> {
        self.results.iter().filter(|result| !result.is_passed())
    }

    pub fn summary(&self) -> Summary {
        let passed = self.passed().count();
        Summary {
            passed,
            failed: self.results.len() - passed,
            total: self.results.len(),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.summary().failed == 0
    }

    /// [`exit_codes::OK`] iff no target failed.
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            exit_codes::OK
        } else {
            exit_codes::FAILED
        }
    }

    /// Print passed names, failed names with preserved paths, then totals.
    pub fn render<W: Write>(&self, out: &mut W) -> Result<()> {
        let summary = self.summary();

        writeln!(out, "Passed targets:").context("write summary")?;
        if summary.passed == 0 {
            writeln!(out, "  (none)").context("write summary")?;
        }
        for result in self.passed() {
            writeln!(out, "  {}", result.name).context("write summary")?;
        }

        writeln!(out, "Failed targets:").context("write summary")?;
        if summary.failed == 0 {
            writeln!(out, "  (none)").context("write summary")?;
        }
        for result in self.failed() {
            let stage = result
                .failed_stage
                .map(|stage| stage.as_str())
                .unwrap_or("unknown");
            let preserved = result
                .preserved_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_default();
            writeln!(out, "  {} [{stage}] preserved: {preserved}", result.name)
                .context("write summary")?;
            if let Some(log) = &result.log_path {
                writeln!(out, "    log: {}", log.display()).context("write summary")?;
            }
            if let Some(error) = &result.error {
                writeln!(out, "    error: {error}").context("write summary")?;
            }
        }

        writeln!(
            out,
            "Passed: {}, Failed: {}, Total: {}",
            summary.passed, summary.failed, summary.total
        )
        .context("write summary")?;
        Ok(())
    }
}
