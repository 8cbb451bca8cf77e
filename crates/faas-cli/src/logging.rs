// crates/faas-cli/src/logging.rs
// ============================================================================
// Module: CLI Logging
// Description: tracing subscriber installation for the faas binary.
// Purpose: Route structured logs to stderr with RUST_LOG filtering.
// Dependencies: tracing-subscriber
// ============================================================================

//! ## Overview
//! Logs go to stderr so stdout stays reserved for command output. `RUST_LOG`
//! takes precedence over the built-in default filter.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub(crate) const DEFAULT_LOG_FILTER: &str = "info";

/// Builds the log filter from `RUST_LOG`, falling back to `default`.
pub(crate) fn log_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Installs the global subscriber.
///
/// A subscriber installed earlier in the process is left in place.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(log_filter(DEFAULT_LOG_FILTER))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
