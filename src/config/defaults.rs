//! Default values for configuration options.
//!
//! Centralized constants to avoid magic numbers scattered across the codebase.

use std::time::Duration;

use crate::invoker::Timeouts;

/// Default total request timeout in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 10;

/// Default connect timeout in seconds.
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default transport timeouts.
#[must_use]
pub const fn timeouts() -> Timeouts {
    Timeouts {
        connect: Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS),
        total: Duration::from_secs(HTTP_TIMEOUT_SECS),
    }
}
