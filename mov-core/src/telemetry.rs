//! Structured logging initialization.
//!
//! Every MOV decision — accepted or rejected — emits exactly one
//! structured `tracing` entry correlated to the triggering payload, so
//! operators and tests can confirm the cause of any rejection. This
//! module wires the global subscriber; the call sites use the `tracing`
//! macros directly.

use crate::{
    config::TelemetryConfig,
    error::{Error, Result},
};
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// The filter directive comes from the configuration but can be
/// overridden by `RUST_LOG`. Calling this twice is an error; tests that
/// need a subscriber should use their own scoped one.
///
/// # Errors
/// Returns a configuration error if the filter directive is invalid or a
/// global subscriber is already installed.
pub fn init(config: &TelemetryConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|err| {
            Error::configuration(format!("invalid log filter '{}': {err}", config.log_level))
        })?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|err| Error::configuration(format!("cannot install subscriber: {err}")))
}
