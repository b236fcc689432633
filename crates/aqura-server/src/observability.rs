//! Process-wide tracing setup.
//!
//! The filter sits behind a reload layer so the level from the loaded
//! configuration can replace the bootstrap `info` level once config is read.
//! `RUST_LOG`, when set and valid, wins over both.

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

const BOOTSTRAP_LEVEL: &str = "info";

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER_HANDLE: OnceLock<FilterHandle> = OnceLock::new();

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing() {
    if FILTER_HANDLE.get().is_some() {
        return;
    }
    let filter = rust_log_filter().unwrap_or_else(|| EnvFilter::new(BOOTSTRAP_LEVEL));
    let (filter_layer, handle) = reload::Layer::new(filter);

    // Another subscriber may already be installed (tests, embedding); keep it.
    if tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok()
    {
        let _ = FILTER_HANDLE.set(handle);
    }
}

/// Switch to the configured `logging.level`.
///
/// Returns `false` when the level was not applied: `RUST_LOG` is in charge,
/// or [`init_tracing`] did not install the subscriber.
pub fn apply_logging_level(level: &str) -> bool {
    if rust_log_filter().is_some() {
        tracing::debug!(configured = level, "RUST_LOG is set, ignoring logging.level");
        return false;
    }
    let Some(handle) = FILTER_HANDLE.get() else {
        return false;
    };
    match handle.reload(EnvFilter::new(level)) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, level, "failed to apply logging level");
            false
        }
    }
}

fn rust_log_filter() -> Option<EnvFilter> {
    std::env::var_os("RUST_LOG")?;
    EnvFilter::try_from_default_env().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent_and_level_reloads() {
        init_tracing();
        let installed = FILTER_HANDLE.get().is_some();
        init_tracing();
        assert_eq!(FILTER_HANDLE.get().is_some(), installed);

        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(apply_logging_level("debug"), installed);
            assert_eq!(apply_logging_level("warn"), installed);
        } else {
            assert!(!apply_logging_level("debug"));
        }
    }
}
