//! Reo.Dev developer lists.

use http::{HeaderMap, HeaderName, Method};
use serde_json::{Map, Value, json};

use super::{
    Adapter, AdapterError, AdapterState, header_value, json_headers, lenient, require_prop,
    secret_header,
};
use crate::event::Event;
use crate::invoker::{HttpClient, HttpInvoker, InvokeError};

const API_KEY: HeaderName = HeaderName::from_static("x-api-key");
const USER: HeaderName = HeaderName::from_static("user");

/// Props lifted into dedicated entity fields and left out of `data`.
const LIFTED_PROPS: [&str; 3] = ["email", "name", "account"];

/// Settings for [`ReoDev`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReoDevConfig {
    /// Email of the Reo.Dev account owner, sent as the `user` header.
    pub email: String,
    /// API key.
    pub api_key: String,
    /// Target list.
    pub list_id: String,
    /// API base.
    pub endpoint: String,
}

impl ReoDevConfig {
    /// Default ingestion endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://ingest.reo.dev/api";

    /// Creates a config for the default endpoint.
    #[must_use]
    pub fn new(
        email: impl Into<String>,
        api_key: impl Into<String>,
        list_id: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            api_key: api_key.into(),
            list_id: list_id.into(),
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Overrides the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Adds the developer identified by `email` to a product list.
///
/// Reo.Dev has no read-back API, so [`Adapter::validate`] is unsupported.
#[derive(Debug)]
pub struct ReoDev<H> {
    invoker: HttpInvoker<H>,
    list_path: String,
    state: AdapterState,
}

impl<H> ReoDev<H> {
    /// Adapter name.
    pub const NAME: &'static str = "ReoDev";

    /// Creates the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the API key or account email is
    /// not a valid header value.
    pub fn new(client: H, config: ReoDevConfig) -> Result<Self, AdapterError> {
        let mut headers = json_headers();
        headers.insert(API_KEY, secret_header(&config.api_key)?);
        headers.insert(USER, header_value(&config.email)?);

        Ok(Self {
            invoker: HttpInvoker::new(client, config.endpoint).with_headers(headers),
            list_path: format!("/product/list/{}", config.list_id),
            state: AdapterState::default(),
        })
    }

    /// Derives the list entity body for `event`.
    ///
    /// Props other than `email`, `name` and `account` travel as a JSON
    /// string in `companyData.data`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Precondition`] without an `email` prop.
    pub fn entity_params(&self, event: &Event) -> Result<Value, AdapterError> {
        let email = require_prop(Self::NAME, event, "email")?;

        let data: Map<String, Value> = event
            .props()
            .iter()
            .filter(|(key, _)| !LIFTED_PROPS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let prop = |key: &str| event.prop(key).cloned().unwrap_or(Value::Null);

        Ok(json!({
            "type": "DEVELOPER",
            "entities": [{
                "primaryKey": email,
                "clientKey": "email",
                "fieldType": "String",
                "companyData": {
                    "name": prop("name"),
                    "action": event.kind(),
                    "label": event.name(),
                    "url": event.url(),
                    "account": prop("account"),
                    "data": Value::Object(data).to_string(),
                },
            }],
        }))
    }
}

impl<H: HttpClient> ReoDev<H> {
    async fn put_entity(&self, params: &Value) -> Result<bool, InvokeError> {
        self.invoker
            .call(Method::PUT, &self.list_path, &HeaderMap::new(), params)
            .await?;
        Ok(true)
    }
}

impl<H: HttpClient> Adapter for ReoDev<H> {
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
        let params = self.entity_params(event)?;

        lenient(Self::NAME, self.put_entity(&params).await)
    }

    async fn validate(&self, _event: &Event) -> Result<bool, AdapterError> {
        if !self.is_enabled() {
            return Ok(false);
        }
        Err(AdapterError::Unsupported {
            adapter: Self::NAME,
            operation: "validate",
        })
    }
}
