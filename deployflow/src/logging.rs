//! Diagnostic tracing for deployflow.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG` or `--verbose`,
//!   written to stderr.
//! - **Progress output**: what the user reads (oracle summaries, executed
//!   commands, final instructions) is printed to stdout by the
//!   orchestration modules and is unaffected by log levels.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn`, or `deployflow=debug` when
/// `verbose` is set.
///
/// # Example
/// ```bash
/// RUST_LOG=deployflow=trace deployflow deploy "Deploy flask app on AWS" -r .
/// ```
pub fn init(verbose: bool) {
    let fallback = if verbose { "deployflow=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
