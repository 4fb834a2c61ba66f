//! Stable exit codes for the harness CLI.

/// Every discovered target passed (or there was nothing to run).
pub const OK: i32 = 0;
/// One or more targets failed.
pub const FAILED: i32 = 1;
/// Configuration error before any target ran (bad root, bad `harness.toml`).
pub const INVALID: i32 = 2;
