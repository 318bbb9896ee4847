//! Backend adapters.
//!
//! This module provides:
//! - The [`Adapter`] contract every backend implements
//! - Per-adapter state ([`AdapterState`]) and errors ([`AdapterError`])
//! - Bounded confirmation polling ([`Confirmation`])
//! - One submodule per backend
//!
//! # Error policy
//!
//! `send` is lenient: once the event has passed its precondition checks,
//! transport and HTTP failures are logged and reported as `Ok(false)` so one
//! failing backend cannot break a multi-backend loop. `validate` and the
//! backend-specific extras are strict and propagate every error.

mod active_campaign;
mod clickhouse;
mod error;
mod google_analytics;
mod hubspot;
mod mixpanel;
mod orbit;
mod plausible;
mod reodev;

#[cfg(test)]
mod active_campaign_tests;
#[cfg(test)]
mod mixpanel_tests;
#[cfg(test)]
mod plausible_tests;

use std::future::Future;
use std::time::Duration;

use crate::event::{Event, EventField};
use crate::invoker::InvokeError;
use crate::time::Sleeper;

pub use active_campaign::{ActiveCampaign, ActiveCampaignConfig};
pub use clickhouse::{ClickHouse, ClickHouseConfig, Identifier, InvalidIdentifier};
pub use error::AdapterError;
pub use google_analytics::{GoogleAnalytics, GoogleAnalyticsConfig};
pub use hubspot::{HubSpot, HubSpotConfig};
pub use mixpanel::{Mixpanel, MixpanelConfig};
pub use orbit::{Orbit, OrbitConfig};
pub use plausible::{Plausible, PlausibleConfig};
pub use reodev::{ReoDev, ReoDevConfig};

/// Mutable per-instance state shared by every adapter.
///
/// Adapters start enabled with no client IP or user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterState {
    enabled: bool,
    client_ip: Option<String>,
    user_agent: Option<String>,
}

impl Default for AdapterState {
    fn default() -> Self {
        Self {
            enabled: true,
            client_ip: None,
            user_agent: None,
        }
    }
}

impl AdapterState {
    /// Creates an enabled state with the given forwarding values.
    ///
    /// Empty strings are treated as unset.
    #[must_use]
    pub fn with_forwarding(client_ip: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            enabled: true,
            client_ip: client_ip.filter(|s| !s.is_empty()),
            user_agent: user_agent.filter(|s| !s.is_empty()),
        }
    }

    /// Returns true while the adapter is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the client IP to forward, if set.
    #[must_use]
    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }

    /// Returns the user agent to forward, if set.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub(crate) const fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn set_client_ip(&mut self, ip: &str) {
        self.client_ip = Some(ip.to_string()).filter(|s| !s.is_empty());
    }

    pub(crate) fn set_user_agent(&mut self, user_agent: &str) {
        self.user_agent = Some(user_agent.to_string()).filter(|s| !s.is_empty());
    }
}

/// The contract every analytics backend implements.
///
/// A disabled adapter answers `send` and `validate` with `Ok(false)` and
/// performs no network call.
///
/// # Example
///
/// ```no_run
/// use analytics_dispatch::adapter::{Adapter, Plausible, PlausibleConfig};
/// use analytics_dispatch::event::Event;
/// use analytics_dispatch::invoker::ReqwestClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let plausible = Plausible::new(
///     ReqwestClient::new(),
///     PlausibleConfig::new("example.com", "api-key"),
/// );
/// let event = Event::new("pageview", "https://example.com/docs").with_name("pageview");
/// let accepted = plausible.send(&event).await?;
/// # Ok(())
/// # }
/// ```
pub trait Adapter: Send + Sync {
    /// Stable backend identifier, used for logging.
    fn name(&self) -> &'static str;

    /// Returns the shared state.
    fn state(&self) -> &AdapterState;

    /// Returns the shared state mutably.
    fn state_mut(&mut self) -> &mut AdapterState;

    /// Enables the adapter.
    fn enable(&mut self) {
        self.state_mut().set_enabled(true);
    }

    /// Disables the adapter. Later calls short-circuit without I/O.
    fn disable(&mut self) {
        self.state_mut().set_enabled(false);
    }

    /// Returns true while the adapter is enabled.
    fn is_enabled(&self) -> bool {
        self.state().is_enabled()
    }

    /// Sets the client IP forwarded with each event.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Unsupported`] unless the backend can forward it.
    fn set_client_ip(&mut self, ip: &str) -> Result<(), AdapterError> {
        let _ = ip;
        Err(AdapterError::Unsupported {
            adapter: self.name(),
            operation: "set_client_ip",
        })
    }

    /// Sets the user agent forwarded with each event.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Unsupported`] unless the backend can forward it.
    fn set_user_agent(&mut self, user_agent: &str) -> Result<(), AdapterError> {
        let _ = user_agent;
        Err(AdapterError::Unsupported {
            adapter: self.name(),
            operation: "set_user_agent",
        })
    }

    /// Sends an event and reports whether the backend accepted it.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Precondition`] when the event lacks a field the
    /// backend requires. Network and HTTP failures are logged and reported
    /// as `Ok(false)`.
    fn send(&self, event: &Event) -> impl Future<Output = Result<bool, AdapterError>> + Send;

    /// Sends an event and confirms the backend accepted it.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Precondition`] for structurally invalid
    /// events, [`AdapterError::Invoke`] for any failed call and
    /// [`AdapterError::Unconfirmed`] when acceptance cannot be confirmed.
    fn validate(&self, event: &Event) -> impl Future<Output = Result<bool, AdapterError>> + Send;
}

/// Bounded polling used to confirm eventually consistent writes.
///
/// # Defaults
///
/// - `attempts`: 3
/// - `delay`: 2 seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    /// Maximum number of checks, at least 1.
    pub attempts: u32,
    /// Pause between two checks.
    pub delay: Duration,
}

impl Confirmation {
    /// Default number of checks.
    pub const DEFAULT_ATTEMPTS: u32 = 3;

    /// Default pause between checks (2 seconds).
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

    /// Creates a policy with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attempts: Self::DEFAULT_ATTEMPTS,
            delay: Self::DEFAULT_DELAY,
        }
    }

    /// Sets the number of checks. Zero is raised to one.
    #[must_use]
    pub const fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = if attempts == 0 { 1 } else { attempts };
        self
    }

    /// Sets the pause between checks.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Runs `check` until it reports `true` or the attempts run out.
    ///
    /// Sleeps `delay` between checks, never after the last one. Errors from
    /// `check` end the polling immediately.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `check`.
    pub async fn poll<S, F, Fut, E>(&self, sleeper: &S, mut check: F) -> Result<bool, E>
    where
        S: Sleeper,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<bool, E>> + Send,
    {
        let attempts = self.attempts.max(1);
        for attempt in 1..=attempts {
            if check().await? {
                return Ok(true);
            }
            if attempt < attempts {
                sleeper.sleep(self.delay).await;
            }
        }
        Ok(false)
    }
}

impl Default for Confirmation {
    fn default() -> Self {
        Self::new()
    }
}

/// A CRM contact, as accepted by the contact operations of
/// [`HubSpot`] and [`ActiveCampaign`].
///
/// Empty fields are left out of requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contact {
    /// Primary key on both CRMs.
    pub email: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Phone number.
    pub phone: String,
}

impl Contact {
    /// Creates a contact with only an email.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }

    /// Sets the given and family names.
    #[must_use]
    pub fn with_name(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self
    }

    /// Sets the phone number.
    #[must_use]
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = phone.into();
        self
    }
}

/// Builds a JSON object from `(key, value)` pairs, skipping empty values.
pub(crate) fn non_empty_object<'a>(
    pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> serde_json::Map<String, serde_json::Value> {
    pairs
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.to_string(), serde_json::Value::from(value)))
        .collect()
}

/// Fails with [`AdapterError::Precondition`] unless every field is set.
pub(crate) fn require_fields(
    adapter: &'static str,
    event: &Event,
    fields: &[EventField],
) -> Result<(), AdapterError> {
    event
        .require(fields)
        .map_err(|field| AdapterError::precondition(adapter, format!("event {field} is required")))
}

/// Returns a required string prop or fails with [`AdapterError::Precondition`].
pub(crate) fn require_prop<'a>(
    adapter: &'static str,
    event: &'a Event,
    key: &str,
) -> Result<&'a str, AdapterError> {
    event
        .prop_str(key)
        .ok_or_else(|| AdapterError::precondition(adapter, format!("event prop '{key}' is required")))
}

/// Turns a failed call into `Ok(false)`, logging it.
pub(crate) fn lenient(adapter: &'static str, result: Result<bool, InvokeError>) -> Result<bool, AdapterError> {
    match result {
        Ok(accepted) => Ok(accepted),
        Err(e) => {
            tracing::warn!(
                adapter,
                status = e.status(),
                "Failed to send event: {e}"
            );
            Ok(false)
        }
    }
}

/// Builds a `Bearer` authorization header value, marked sensitive.
pub(crate) fn bearer(token: &str) -> Result<http::HeaderValue, InvokeError> {
    secret_header(&format!("Bearer {token}"))
}

/// Builds a header value carrying a credential, marked sensitive.
pub(crate) fn secret_header(value: &str) -> Result<http::HeaderValue, InvokeError> {
    let mut value = header_value(value)?;
    value.set_sensitive(true);
    Ok(value)
}

/// Builds a header value, rejecting bytes HTTP does not allow.
pub(crate) fn header_value(value: &str) -> Result<http::HeaderValue, InvokeError> {
    http::HeaderValue::from_str(value)
        .map_err(|e| InvokeError::Encode(format!("invalid header value: {e}")))
}

/// Reads a CRM ID, which arrives as a string or a number depending on the
/// endpoint.
pub(crate) fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Headers announcing a JSON body.
pub(crate) fn json_headers() -> http::HeaderMap {
    let mut headers = http::HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    headers
}
