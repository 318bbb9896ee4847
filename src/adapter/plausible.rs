//! Plausible Events API.

use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue, USER_AGENT};
use http::{HeaderMap, HeaderName, Method};
use serde_json::{Map, Value, json};

use super::{
    Adapter, AdapterError, AdapterState, Confirmation, bearer, header_value, json_headers, lenient,
    require_fields,
};
use crate::event::{Event, EventField};
use crate::invoker::{HttpClient, HttpInvoker, InvokeError};
use crate::time::{Sleeper, TokioSleeper};

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Settings for [`Plausible`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlausibleConfig {
    /// Site domain as registered in Plausible.
    pub domain: String,
    /// Stats/Sites API key, used for goals and confirmation.
    pub api_key: String,
    /// API base, e.g. `https://plausible.io/api`.
    pub endpoint: String,
    /// Client IP forwarded as `X-Forwarded-For`.
    pub client_ip: Option<String>,
    /// User agent forwarded as `User-Agent`.
    pub user_agent: Option<String>,
}

impl PlausibleConfig {
    /// Default API base.
    pub const DEFAULT_ENDPOINT: &'static str = "https://plausible.io/api";

    /// Creates a config for the hosted service.
    #[must_use]
    pub fn new(domain: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            api_key: api_key.into(),
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            client_ip: None,
            user_agent: None,
        }
    }

    /// Overrides the endpoint (self-hosted instances).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Records events through the Plausible Events API.
///
/// Plausible counts visitors by client IP and user agent, so both should be
/// set before sending. Goals are keyed by event type.
#[derive(Debug)]
pub struct Plausible<H, S = TokioSleeper> {
    invoker: HttpInvoker<H>,
    sleeper: S,
    domain: String,
    api_key: String,
    confirmation: Confirmation,
    state: AdapterState,
}

impl<H> Plausible<H, TokioSleeper> {
    /// Creates the adapter with the default confirmation policy.
    #[must_use]
    pub fn new(client: H, config: PlausibleConfig) -> Self {
        Self {
            invoker: HttpInvoker::new(client, config.endpoint),
            sleeper: TokioSleeper,
            domain: config.domain,
            api_key: config.api_key,
            confirmation: Confirmation::default(),
            state: AdapterState::with_forwarding(config.client_ip, config.user_agent),
        }
    }
}

impl<H, S> Plausible<H, S> {
    /// Adapter name.
    pub const NAME: &'static str = "Plausible";

    /// Sets the sleeper used between confirmation checks.
    #[must_use]
    pub fn with_sleeper<S2>(self, sleeper: S2) -> Plausible<H, S2> {
        Plausible {
            invoker: self.invoker,
            sleeper,
            domain: self.domain,
            api_key: self.api_key,
            confirmation: self.confirmation,
            state: self.state,
        }
    }

    /// Sets the confirmation policy used by `validate`.
    #[must_use]
    pub const fn with_confirmation(mut self, confirmation: Confirmation) -> Self {
        self.confirmation = confirmation;
        self
    }

    /// Derives the Events API body for `event`.
    #[must_use]
    pub fn event_params(&self, event: &Event) -> Value {
        let mut params = Map::new();
        params.insert("name".into(), event.kind().into());
        params.insert("url".into(), event.url().into());
        params.insert("domain".into(), self.domain.clone().into());
        params.insert("props".into(), Value::Object(event.props().clone()));
        if let Some(referrer) = event.prop("referrer") {
            params.insert("referrer".into(), referrer.clone());
        }
        if let Some(width) = event.prop("screenWidth") {
            params.insert("screen_width".into(), width.clone());
        }
        Value::Object(params)
    }

    fn event_headers(&self) -> Result<HeaderMap, InvokeError> {
        let mut headers = json_headers();
        if let Some(ip) = self.state.client_ip() {
            headers.insert(X_FORWARDED_FOR, header_value(ip)?);
        }
        if let Some(ua) = self.state.user_agent() {
            headers.insert(USER_AGENT, header_value(ua)?);
        }
        Ok(headers)
    }

    fn api_headers(&self, content_type: &'static str) -> Result<HeaderMap, InvokeError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(AUTHORIZATION, bearer(&self.api_key)?);
        Ok(headers)
    }
}

impl<H: HttpClient, S: Sleeper> Plausible<H, S> {
    /// Creates (or re-asserts) the custom-event goal `name` for the site.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the Sites API rejects the call.
    pub async fn provision_goal(&self, name: &str) -> Result<(), AdapterError> {
        let params = json!({
            "site_id": self.domain,
            "goal_type": "event",
            "event_name": name,
        });
        let headers = self.api_headers("application/x-www-form-urlencoded")?;

        self.invoker
            .call(Method::PUT, "/v1/sites/goals", &headers, &params)
            .await?;
        Ok(())
    }

    /// Returns the number of visitors recorded for goal `name`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the Stats API call fails and
    /// [`AdapterError::Unconfirmed`] if the response carries no count.
    pub async fn goal_visitors(&self, name: &str) -> Result<f64, AdapterError> {
        let params = json!({
            "site_id": self.domain,
            "filters": json!({"goal": name}).to_string(),
        });
        let headers = self.api_headers("application/json")?;

        let response = self
            .invoker
            .call_json(Method::GET, "/v1/stats/aggregate", &headers, &params)
            .await?;

        response
            .pointer("/results/visitors/value")
            .and_then(Value::as_f64)
            .ok_or_else(|| AdapterError::unconfirmed(Self::NAME, "aggregate response has no visitor count"))
    }

    async fn post_event(&self, event: &Event) -> Result<bool, InvokeError> {
        let headers = self.event_headers()?;
        self.invoker
            .call(Method::POST, "/event", &headers, &self.event_params(event))
            .await?;
        Ok(true)
    }
}

impl<H: HttpClient, S: Sleeper> Adapter for Plausible<H, S> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn state(&self) -> &AdapterState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AdapterState {
        &mut self.state
    }

    fn set_client_ip(&mut self, ip: &str) -> Result<(), AdapterError> {
        self.state.set_client_ip(ip);
        Ok(())
    }

    fn set_user_agent(&mut self, user_agent: &str) -> Result<(), AdapterError> {
        self.state.set_user_agent(user_agent);
        Ok(())
    }

    async fn send(&self, event: &Event) -> Result<bool, AdapterError> {
        if !self.is_enabled() {
            return Ok(false);
        }
        require_fields(Self::NAME, event, &[EventField::Type, EventField::Url])?;

        lenient(Self::NAME, self.post_event(event).await)
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

        let goal = event.kind();
        self.provision_goal(goal).await?;
        self.post_event(event).await?;

        let confirmed = self
            .confirmation
            .poll(&self.sleeper, || async move {
                Ok::<_, AdapterError>(self.goal_visitors(goal).await? > 0.0)
            })
            .await?;

        if confirmed {
            Ok(true)
        } else {
            Err(AdapterError::unconfirmed(
                Self::NAME,
                format!("no visitors recorded for goal '{goal}'"),
            ))
        }
    }
}
