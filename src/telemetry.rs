//! Logging bootstrap for binaries and tests embedding the mapper.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the host. These helpers cover the common case.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{MapperError, Result};

/// Installs a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call repeatedly; only the first call has an effect, and an
/// already installed global subscriber is left in place.
pub fn init_tracing() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = fmt().with_env_filter(filter).with_target(true).try_init();
    });
}

/// Installs a subscriber with an explicit filter directive such as
/// `gremlin_mapper=debug`.
pub fn init_tracing_with(directive: &str) -> Result<()> {
    let filter = EnvFilter::try_new(directive)
        .map_err(|e| MapperError::ConfigurationError(format!("invalid log filter: {e}")))?;
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|_| MapperError::ConfigurationError("logging already initialized".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_tracing();
        init_tracing();
        tracing::debug!("telemetry.test");
    }

    #[test]
    fn bad_directive_is_a_configuration_error() {
        let err = init_tracing_with("gremlin_mapper=[").unwrap_err();
        assert_eq!(err.code(), "ConfigurationError");
    }
}
