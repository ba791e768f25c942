//! Diagnostic tracing for the driver.
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG`, written to stderr.
//! - **Run logs (`io/run_log`)**: per-item `meta.json`/`tools.log` and the
//!   batch `summary.json` under `.driver/runs/`. Always written, unaffected by
//!   `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn` if unset. Output: stderr, compact.
///
/// ```bash
/// RUST_LOG=driver=info driver items.txt out
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
