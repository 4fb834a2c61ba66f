//! Diagnostic tracing for the harness.
//!
//! - **Tracing (this module)**: step-level diagnostics via `RUST_LOG`, output to stderr.
//! - **Step logs (`io/executor`)**: per-target `func` output under the scratch root,
//!   always written, unaffected by `RUST_LOG`.
//! - **Summary (`report`)**: stdout, the harness' product output.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=func_harness=debug func-harness
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
