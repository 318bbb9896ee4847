//! Google Analytics (Universal Analytics Measurement Protocol).

use http::header::{CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, Method};
use serde_json::{Map, Value};

use super::{Adapter, AdapterError, AdapterState, lenient, require_fields};
use crate::event::{Event, EventField};
use crate::invoker::{HttpClient, HttpInvoker, InvokeError};

/// Settings for [`GoogleAnalytics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleAnalyticsConfig {
    /// Property tracking ID (`tid`), e.g. `UA-XXXX-Y`.
    pub tracking_id: String,
    /// Anonymous client ID (`cid`).
    pub client_id: String,
    /// Base endpoint; hits go to `{endpoint}/collect`.
    pub endpoint: String,
    /// Client IP override (`uip`).
    pub client_ip: Option<String>,
    /// User agent override (`ua`).
    pub user_agent: Option<String>,
}

impl GoogleAnalyticsConfig {
    /// Default Measurement Protocol endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://www.google-analytics.com";

    /// Creates a config for the default endpoint.
    #[must_use]
    pub fn new(tracking_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            tracking_id: tracking_id.into(),
            client_id: client_id.into(),
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            client_ip: None,
            user_agent: None,
        }
    }

    /// Overrides the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Sends pageviews and events as Measurement Protocol hits.
///
/// `pageview` events become pageview hits; every other type becomes an
/// event hit whose action defaults to the event type.
#[derive(Debug)]
pub struct GoogleAnalytics<H> {
    invoker: HttpInvoker<H>,
    tracking_id: String,
    client_id: String,
    state: AdapterState,
}

impl<H> GoogleAnalytics<H> {
    /// Adapter name.
    pub const NAME: &'static str = "GoogleAnalytics";

    /// Creates the adapter.
    #[must_use]
    pub fn new(client: H, config: GoogleAnalyticsConfig) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        Self {
            invoker: HttpInvoker::new(client, config.endpoint).with_headers(headers),
            tracking_id: config.tracking_id,
            client_id: config.client_id,
            state: AdapterState::with_forwarding(config.client_ip, config.user_agent),
        }
    }

    /// Derives the hit parameters for `event`. Empty fields are dropped.
    #[must_use]
    pub fn hit_params(&self, event: &Event) -> Value {
        let mut hit = Map::new();
        hit.insert("v".into(), Value::from(1));
        hit.insert("tid".into(), self.tracking_id.clone().into());
        hit.insert("cid".into(), self.client_id.clone().into());

        if event.kind() == "pageview" {
            hit.insert("t".into(), "pageview".into());
            hit.insert("dl".into(), event.url().into());
            if let Ok(url) = url::Url::parse(event.url()) {
                if let Some(host) = url.host_str() {
                    hit.insert("dh".into(), host.into());
                }
                let path = url
                    .query()
                    .map_or_else(|| url.path().to_string(), |q| format!("{}?{q}", url.path()));
                hit.insert("dp".into(), path.into());
            }
            let title = event.prop_str("documentTitle").unwrap_or(event.name());
            hit.insert("dt".into(), title.into());
        } else {
            hit.insert("t".into(), "event".into());
            hit.insert(
                "ec".into(),
                event.prop_str("category").unwrap_or(event.kind()).into(),
            );
            hit.insert(
                "ea".into(),
                event.prop_str("action").unwrap_or(event.kind()).into(),
            );
            hit.insert("el".into(), event.name().into());
            if let Some(value) = event.value() {
                hit.insert("ev".into(), value.into());
            }
            hit.insert("dl".into(), event.url().into());
        }

        if let Some(ip) = self.state.client_ip() {
            hit.insert("uip".into(), ip.into());
        }
        if let Some(ua) = self.state.user_agent() {
            hit.insert("ua".into(), ua.into());
        }

        hit.retain(|_, v| v.as_str().is_none_or(|s| !s.is_empty()));
        Value::Object(hit)
    }
}

impl<H: HttpClient> GoogleAnalytics<H> {
    async fn post_hit(&self, path: &str, hit: &Value) -> Result<crate::invoker::Response, InvokeError> {
        self.invoker
            .call(Method::POST, path, &HeaderMap::new(), hit)
            .await
    }
}

impl<H: HttpClient> Adapter for GoogleAnalytics<H> {
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

        let hit = self.hit_params(event);
        lenient(Self::NAME, self.post_hit("/collect", &hit).await.map(|_| true))
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

        let hit = self.hit_params(event);
        let response = self
            .invoker
            .call_json(Method::POST, "/debug/collect", &HeaderMap::new(), &hit)
            .await?;

        if response.pointer("/hitParsingResult/0/valid") == Some(&Value::Bool(true)) {
            return Ok(true);
        }

        let reason = response
            .pointer("/parserMessage/0/description")
            .and_then(Value::as_str)
            .unwrap_or("hit was not marked valid");
        Err(AdapterError::unconfirmed(Self::NAME, reason))
    }
}
