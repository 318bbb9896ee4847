//! Tracing setup for host applications.
//!
//! The library itself only emits `tracing` events. Binaries embedding it
//! call [`setup_tracing`] once at startup to print them.

use tracing::Level;
use tracing_subscriber::EnvFilter;

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;

/// Error returned when a global subscriber is already installed.
pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Default level: INFO, or DEBUG when `verbose`.
#[must_use]
pub const fn default_level(verbose: bool) -> Level {
    if verbose { Level::DEBUG } else { Level::INFO }
}

/// Builds the filter used by [`setup_tracing`].
///
/// `RUST_LOG` overrides the default level when set.
#[must_use]
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level(verbose).into())
        .from_env_lossy()
}

/// Installs a formatting subscriber as the global default.
///
/// # Errors
///
/// Returns an error if a global subscriber was already installed.
pub fn setup_tracing(verbose: bool) -> Result<(), InitError> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_target(false)
        .try_init()
}
