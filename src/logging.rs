//! Tracing subscriber setup for binaries and demos embedding labmesh.
//!
//! The library itself only emits `tracing` events; nothing is printed until the
//! host installs a subscriber, either its own or the one from [`init`].

use crate::config::LogFormat;
use crate::{Error, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global subscriber.
///
/// `RUST_LOG` takes precedence over `filter` when set.
///
/// # Errors
///
/// [`Error::Validation`] for an unparsable filter or if a global subscriber is
/// already installed.
pub fn init(filter: &str, format: LogFormat) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::try_new(filter)
            .map_err(|e| Error::Validation(format!("invalid log filter {filter:?}: {e}")))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Plain => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init(),
    };
    installed.map_err(|e| Error::Validation(format!("tracing subscriber already set: {e}")))
}
