//! Build/run/invoke harness for `func` templates.
//!
//! Discovers `<language>/<template>` directories under a templates root and
//! drives each one, strictly one at a time, through `func create`, an optional
//! prerequisite, `func build`, `func run` and `func invoke`, then reports which
//! targets passed. Failed targets keep their scratch directory for inspection.
//!
//! - **[`core`]**: pure logic (data model, retry loop, exclusion rules).
//! - **[`io`]**: filesystem, environment, settings and process adapters. The
//!   `func` CLI is reached only through the [`io::executor`] traits, so tests
//!   substitute scripted fakes.
//!
//! [`lifecycle`] runs one target, [`run`] runs them all, [`report`] summarizes.

pub mod cli;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod lifecycle;
pub mod logging;
pub mod report;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
