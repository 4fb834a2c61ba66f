//! Pure, deterministic harness logic. No I/O.

pub mod exclusions;
pub mod retry;
pub mod types;
