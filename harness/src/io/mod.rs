//! I/O adapters for harness commands.

pub mod discover;
pub mod env;
pub mod executor;
pub mod func;
pub mod prereq;
pub mod process;
pub mod results;
pub mod scratch;
pub mod settings;
