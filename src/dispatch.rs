//! Fan-out of one event to every configured backend.
//!
//! [`Backend`] closes the set of adapters into one type so a
//! [`Dispatcher`] can hold them in a single `Vec`.

use tracing::{info, warn};

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;

use crate::adapter::{
    ActiveCampaign, Adapter, AdapterError, AdapterState, ClickHouse, GoogleAnalytics, HubSpot,
    Mixpanel, Orbit, Plausible, ReoDev,
};
use crate::config::{Section, ValidatedConfig};
use crate::event::Event;
use crate::invoker::HttpClient;

/// One configured adapter.
#[derive(Debug)]
pub enum Backend<H> {
    /// Google Analytics
    GoogleAnalytics(GoogleAnalytics<H>),
    /// Plausible
    Plausible(Plausible<H>),
    /// Mixpanel
    Mixpanel(Mixpanel<H>),
    /// HubSpot
    HubSpot(HubSpot<H>),
    /// ActiveCampaign
    ActiveCampaign(ActiveCampaign<H>),
    /// Orbit
    Orbit(Orbit<H>),
    /// Reo.Dev
    ReoDev(ReoDev<H>),
    /// ClickHouse
    ClickHouse(ClickHouse<H>),
}

macro_rules! delegate {
    ($backend:expr, $adapter:ident => $call:expr) => {
        match $backend {
            Backend::GoogleAnalytics($adapter) => $call,
            Backend::Plausible($adapter) => $call,
            Backend::Mixpanel($adapter) => $call,
            Backend::HubSpot($adapter) => $call,
            Backend::ActiveCampaign($adapter) => $call,
            Backend::Orbit($adapter) => $call,
            Backend::ReoDev($adapter) => $call,
            Backend::ClickHouse($adapter) => $call,
        }
    };
}

macro_rules! backend_from {
    ($($variant:ident),+ $(,)?) => {
        $(
            impl<H> From<$variant<H>> for Backend<H> {
                fn from(adapter: $variant<H>) -> Self {
                    Self::$variant(adapter)
                }
            }
        )+
    };
}

backend_from!(
    GoogleAnalytics,
    Plausible,
    Mixpanel,
    HubSpot,
    ActiveCampaign,
    Orbit,
    ReoDev,
    ClickHouse,
);

impl<H: HttpClient> Adapter for Backend<H> {
    fn name(&self) -> &'static str {
        delegate!(self, a => a.name())
    }

    fn state(&self) -> &AdapterState {
        delegate!(self, a => a.state())
    }

    fn state_mut(&mut self) -> &mut AdapterState {
        delegate!(self, a => a.state_mut())
    }

    fn set_client_ip(&mut self, ip: &str) -> Result<(), AdapterError> {
        delegate!(self, a => a.set_client_ip(ip))
    }

    fn set_user_agent(&mut self, user_agent: &str) -> Result<(), AdapterError> {
        delegate!(self, a => a.set_user_agent(user_agent))
    }

    async fn send(&self, event: &Event) -> Result<bool, AdapterError> {
        delegate!(self, a => a.send(event).await)
    }

    async fn validate(&self, event: &Event) -> Result<bool, AdapterError> {
        delegate!(self, a => a.validate(event).await)
    }
}

/// Result of sending one event to every backend.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// One entry per backend, in dispatch order.
    pub outcomes: Vec<(&'static str, Result<bool, AdapterError>)>,
}

impl DispatchReport {
    /// Number of backends that accepted the event.
    #[must_use]
    pub fn accepted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, result)| matches!(result, Ok(true)))
            .count()
    }

    /// Returns true when every backend accepted the event.
    #[must_use]
    pub fn all_accepted(&self) -> bool {
        self.accepted() == self.outcomes.len()
    }

    /// Backends that returned an error.
    pub fn failures(&self) -> impl Iterator<Item = (&'static str, &AdapterError)> {
        self.outcomes
            .iter()
            .filter_map(|(name, result)| result.as_ref().err().map(|e| (*name, e)))
    }

    /// Outcome for the backend called `name`.
    #[must_use]
    pub fn outcome(&self, name: &str) -> Option<&Result<bool, AdapterError>> {
        self.outcomes
            .iter()
            .find(|(backend, _)| *backend == name)
            .map(|(_, result)| result)
    }
}

/// Sends events to a list of backends, one after the other.
///
/// A failing backend never stops the loop; its error is recorded in the
/// [`DispatchReport`].
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
///
/// use analytics_dispatch::config::ValidatedConfig;
/// use analytics_dispatch::dispatch::Dispatcher;
/// use analytics_dispatch::event::Event;
/// use analytics_dispatch::invoker::ReqwestClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ValidatedConfig::load(Path::new("analytics.toml"))?;
/// let client = ReqwestClient::with_timeouts(config.timeouts)?;
/// let dispatcher = Dispatcher::from_config(&config, client)?;
///
/// let event = Event::new("pageview", "https://example.com/docs").with_name("pageview");
/// let report = dispatcher.dispatch(&event).await;
/// println!("{} backends accepted the event", report.accepted());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Dispatcher<H> {
    backends: Vec<Backend<H>>,
}

impl<H> Default for Dispatcher<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Dispatcher<H> {
    /// Creates a dispatcher with no backends.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    /// Adds a backend.
    #[must_use]
    pub fn with_backend(mut self, backend: impl Into<Backend<H>>) -> Self {
        self.push(backend);
        self
    }

    /// Adds a backend.
    pub fn push(&mut self, backend: impl Into<Backend<H>>) {
        self.backends.push(backend.into());
    }

    /// The configured backends, in dispatch order.
    #[must_use]
    pub fn backends(&self) -> &[Backend<H>] {
        &self.backends
    }

    /// Number of configured backends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Returns true when no backend is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl<H: HttpClient> Dispatcher<H> {
    /// Builds one backend per configured section, sharing `client`.
    ///
    /// Sections with `enabled = false` yield disabled backends.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if a credential cannot be used as an
    /// HTTP header value.
    pub fn from_config(config: &ValidatedConfig, client: H) -> Result<Self, AdapterError>
    where
        H: Clone,
    {
        let mut dispatcher = Self::new();

        if let Some(section) = &config.google_analytics {
            let adapter = GoogleAnalytics::new(client.clone(), section.settings.clone());
            dispatcher.push_section(adapter, section);
        }
        if let Some(section) = &config.plausible {
            let adapter = Plausible::new(client.clone(), section.settings.clone())
                .with_confirmation(config.confirmation);
            dispatcher.push_section(adapter, section);
        }
        if let Some(section) = &config.mixpanel {
            let adapter = Mixpanel::new(client.clone(), section.settings.clone());
            dispatcher.push_section(adapter, section);
        }
        if let Some(section) = &config.hubspot {
            let adapter = HubSpot::new(client.clone(), section.settings.clone())?;
            dispatcher.push_section(adapter, section);
        }
        if let Some(section) = &config.active_campaign {
            let adapter = ActiveCampaign::new(client.clone(), section.settings.clone())?;
            dispatcher.push_section(adapter, section);
        }
        if let Some(section) = &config.orbit {
            let adapter = Orbit::new(client.clone(), section.settings.clone())?;
            dispatcher.push_section(adapter, section);
        }
        if let Some(section) = &config.reodev {
            let adapter = ReoDev::new(client.clone(), section.settings.clone())?;
            dispatcher.push_section(adapter, section);
        }
        if let Some(section) = &config.clickhouse {
            let adapter = ClickHouse::new(client, section.settings.clone())
                .with_confirmation(config.confirmation);
            dispatcher.push_section(adapter, section);
        }

        info!(backends = dispatcher.len(), "Dispatcher configured");
        Ok(dispatcher)
    }

    fn push_section<T>(&mut self, adapter: impl Into<Backend<H>>, section: &Section<T>) {
        let mut backend = adapter.into();
        if !section.enabled {
            backend.disable();
        }
        self.backends.push(backend);
    }

    /// Returns the backend called `name`, e.g. to disable it.
    pub fn backend_mut(&mut self, name: &str) -> Option<&mut Backend<H>> {
        self.backends.iter_mut().find(|b| b.name() == name)
    }

    /// Sends `event` to every backend in order.
    pub async fn dispatch(&self, event: &Event) -> DispatchReport {
        let mut report = DispatchReport {
            outcomes: Vec::with_capacity(self.backends.len()),
        };

        for backend in &self.backends {
            let result = backend.send(event).await;
            if let Err(e) = &result {
                warn!(backend = backend.name(), "Event not sent: {e}");
            }
            report.outcomes.push((backend.name(), result));
        }

        info!(
            event = event.kind(),
            accepted = report.accepted(),
            total = report.outcomes.len(),
            "Event dispatched"
        );
        report
    }

    /// Sends `event` to every backend and confirms each acceptance.
    pub async fn validate(&self, event: &Event) -> DispatchReport {
        let mut report = DispatchReport {
            outcomes: Vec::with_capacity(self.backends.len()),
        };

        for backend in &self.backends {
            let result = backend.validate(event).await;
            if let Err(e) = &result {
                warn!(backend = backend.name(), "Event not confirmed: {e}");
            }
            report.outcomes.push((backend.name(), result));
        }

        info!(
            event = event.kind(),
            confirmed = report.accepted(),
            total = report.outcomes.len(),
            "Event validated"
        );
        report
    }
}
