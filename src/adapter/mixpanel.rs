//! Mixpanel ingestion API.

use http::header::{ACCEPT, HeaderValue};
use http::Method;
use serde_json::{Map, Value, json};

use super::{Adapter, AdapterError, AdapterState, json_headers, lenient, require_fields};
use crate::event::{Event, EventField, Props};
use crate::invoker::{HttpClient, HttpInvoker, InvokeError, Response, ResponseBody};
use crate::time::{Clock, SystemClock};

const NAME: &str = "Mixpanel";

/// Settings for [`Mixpanel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixpanelConfig {
    /// Project token.
    pub token: String,
    /// API base.
    pub endpoint: String,
}

impl MixpanelConfig {
    /// Default API base.
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.mixpanel.com";

    /// Creates a config for the default endpoint.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Overrides the endpoint (e.g. the EU residency host).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Tracks events and maintains user profiles in Mixpanel.
///
/// Every event needs a `distinct_id` prop. Mixpanel answers `1` for an
/// accepted batch and `0` otherwise.
#[derive(Debug)]
pub struct Mixpanel<H, C = SystemClock> {
    invoker: HttpInvoker<H>,
    clock: C,
    token: String,
    state: AdapterState,
}

impl<H> Mixpanel<H, SystemClock> {
    /// Creates the adapter.
    #[must_use]
    pub fn new(client: H, config: MixpanelConfig) -> Self {
        let mut headers = json_headers();
        headers.insert(ACCEPT, HeaderValue::from_static("text/plain"));

        Self {
            invoker: HttpInvoker::new(client, config.endpoint).with_headers(headers),
            clock: SystemClock,
            token: config.token,
            state: AdapterState::default(),
        }
    }
}

impl<H, C: Clock> Mixpanel<H, C> {
    /// Adapter name.
    pub const NAME: &'static str = NAME;

    /// Sets the clock used to timestamp events without a `time` prop.
    #[must_use]
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Mixpanel<H, C2> {
        Mixpanel {
            invoker: self.invoker,
            clock,
            token: self.token,
            state: self.state,
        }
    }

    /// Derives the `/track` batch for `event`.
    ///
    /// `token`, `time` and `distinct_id` come first; the remaining props
    /// follow without overriding them. The event name falls back to the type.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Precondition`] without a `distinct_id` prop.
    pub fn track_payload(&self, event: &Event) -> Result<Value, AdapterError> {
        let distinct_id = distinct_id(event)?;

        let mut properties = Map::new();
        properties.insert("token".into(), self.token.clone().into());
        properties.insert(
            "time".into(),
            event
                .prop("time")
                .cloned()
                .unwrap_or_else(|| self.clock.unix_seconds().into()),
        );
        properties.insert("distinct_id".into(), distinct_id.clone());
        for (key, value) in event.props() {
            properties
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        let name = if event.name().is_empty() {
            event.kind()
        } else {
            event.name()
        };

        Ok(json!([{
            "event": name,
            "properties": properties,
        }]))
    }
}

impl<H: HttpClient, C: Clock> Mixpanel<H, C> {
    /// Sets profile properties (`$set`) for `distinct_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the call fails.
    pub async fn set_profile(&self, distinct_id: &str, props: &Props) -> Result<bool, AdapterError> {
        let payload = json!([{
            "$token": self.token,
            "$distinct_id": distinct_id,
            "$set": props,
        }]);
        Ok(self.post("/engage#profile-set", &payload).await?)
    }

    /// Appends values to list properties (`$union`) for `distinct_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the call fails.
    pub async fn union_profile(&self, distinct_id: &str, props: &Props) -> Result<bool, AdapterError> {
        let payload = json!([{
            "$token": self.token,
            "$distinct_id": distinct_id,
            "$union": props,
        }]);
        Ok(self.post("/engage#profile-union", &payload).await?)
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<bool, InvokeError> {
        let response = self
            .invoker
            .call(Method::POST, path, &http::HeaderMap::new(), payload)
            .await?;
        Ok(accepted(&response))
    }
}

impl<H: HttpClient, C: Clock> Adapter for Mixpanel<H, C> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn state(&self) -> &AdapterState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AdapterState {
        &mut self.state
    }

    async fn send(&self, event: &Event) -> Result<bool, AdapterError> {
        if !self.is_enabled() {
            return Ok(false);
        }
        let payload = self.track_payload(event)?;

        lenient(Self::NAME, self.post("/track", &payload).await)
    }

    async fn validate(&self, event: &Event) -> Result<bool, AdapterError> {
        if !self.is_enabled() {
            return Ok(false);
        }
        require_fields(
            Self::NAME,
            event,
            &[EventField::Type, EventField::Url, EventField::Name],
        )?;
        let payload = self.track_payload(event)?;

        if self.post("/track", &payload).await? {
            Ok(true)
        } else {
            Err(AdapterError::unconfirmed(Self::NAME, "track endpoint did not accept the event"))
        }
    }
}

fn distinct_id(event: &Event) -> Result<&Value, AdapterError> {
    event
        .prop("distinct_id")
        .filter(|v| !v.is_null() && v.as_str() != Some(""))
        .ok_or_else(|| AdapterError::precondition(NAME, "event prop 'distinct_id' is required"))
}

fn accepted(response: &Response) -> bool {
    match &response.body {
        ResponseBody::Text(text) => text.trim() == "1",
        ResponseBody::Json(value) => value.as_i64() == Some(1),
    }
}
