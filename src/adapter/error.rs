//! Error types for adapter operations.

use thiserror::Error;

use crate::invoker::InvokeError;

/// Error type for adapter operations.
///
/// Lenient entry points ([`Adapter::send`]) only ever return
/// [`AdapterError::Precondition`]; strict ones ([`Adapter::validate`] and the
/// backend-specific extras) surface every variant.
///
/// [`Adapter::send`]: super::Adapter::send
/// [`Adapter::validate`]: super::Adapter::validate
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The event or caller is missing something the backend requires.
    ///
    /// Raised before any network call. Never worth retrying.
    #[error("{adapter}: {reason}")]
    Precondition {
        /// Name of the adapter that rejected the call.
        adapter: &'static str,
        /// What is missing.
        reason: String,
    },

    /// The adapter cannot perform the requested operation.
    #[error("{adapter} does not support {operation}")]
    Unsupported {
        /// Name of the adapter.
        adapter: &'static str,
        /// The operation that was requested.
        operation: &'static str,
    },

    /// The event reached the backend but acceptance could not be confirmed.
    ///
    /// Backends are eventually consistent, so this is not proof the event
    /// was lost.
    #[error("{adapter}: event not confirmed: {reason}")]
    Unconfirmed {
        /// Name of the adapter.
        adapter: &'static str,
        /// Why confirmation failed.
        reason: String,
    },

    /// The underlying HTTP call failed.
    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

impl AdapterError {
    /// Creates a [`AdapterError::Precondition`].
    pub fn precondition(adapter: &'static str, reason: impl Into<String>) -> Self {
        Self::Precondition {
            adapter,
            reason: reason.into(),
        }
    }

    /// Creates a [`AdapterError::Unconfirmed`].
    pub fn unconfirmed(adapter: &'static str, reason: impl Into<String>) -> Self {
        Self::Unconfirmed {
            adapter,
            reason: reason.into(),
        }
    }

    /// Returns the HTTP status behind this error, or `-1` when there is none.
    #[must_use]
    pub fn status(&self) -> i32 {
        match self {
            Self::Invoke(e) => e.status(),
            _ => InvokeError::NO_STATUS,
        }
    }
}
