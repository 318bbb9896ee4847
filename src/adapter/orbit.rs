//! Orbit community activities.

use http::header::AUTHORIZATION;
use http::{HeaderMap, Method};
use serde_json::{Value, json};

use super::{
    Adapter, AdapterError, AdapterState, bearer, json_headers, lenient, non_empty_object,
    require_fields, require_prop,
};
use crate::event::{Event, EventField};
use crate::invoker::{HttpClient, HttpInvoker, InvokeError};

/// Settings for [`Orbit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrbitConfig {
    /// Workspace slug.
    pub workspace_id: String,
    /// API token.
    pub api_key: String,
    /// Identity source recorded with every activity.
    pub data_origin: String,
    /// API base; activities go to `{endpoint}/{workspace_id}/activities`.
    pub endpoint: String,
}

impl OrbitConfig {
    /// Default API base.
    pub const DEFAULT_ENDPOINT: &'static str = "https://app.orbit.love/api/v1";

    /// Creates a config for the default endpoint.
    #[must_use]
    pub fn new(
        workspace_id: impl Into<String>,
        api_key: impl Into<String>,
        data_origin: impl Into<String>,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            api_key: api_key.into(),
            data_origin: data_origin.into(),
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

/// Records events as activities on the member identified by `email`.
#[derive(Debug)]
pub struct Orbit<H> {
    invoker: HttpInvoker<H>,
    activities_path: String,
    data_origin: String,
    state: AdapterState,
}

impl<H> Orbit<H> {
    /// Adapter name.
    pub const NAME: &'static str = "Orbit";

    /// Creates the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the API key is not a valid header
    /// value.
    pub fn new(client: H, config: OrbitConfig) -> Result<Self, AdapterError> {
        let mut headers = json_headers();
        headers.insert(AUTHORIZATION, bearer(&config.api_key)?);

        Ok(Self {
            invoker: HttpInvoker::new(client, config.endpoint).with_headers(headers),
            activities_path: format!("/{}/activities", config.workspace_id),
            data_origin: config.data_origin,
            state: AdapterState::default(),
        })
    }

    /// Derives the activity body for `event`. Empty fields are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Precondition`] without an `email` prop.
    pub fn activity_params(&self, event: &Event) -> Result<Value, AdapterError> {
        let email = require_prop(Self::NAME, event, "email")?;

        Ok(json!({
            "activity": non_empty_object([
                ("title", event.name()),
                ("activity_type_key", event.kind()),
            ]),
            "identity": non_empty_object([
                ("source", self.data_origin.as_str()),
                ("email", email),
                ("username", event.prop_str("username").unwrap_or_default()),
            ]),
        }))
    }
}

impl<H: HttpClient> Orbit<H> {
    async fn post_activity(&self, params: &Value) -> Result<bool, InvokeError> {
        self.invoker
            .call(Method::POST, &self.activities_path, &HeaderMap::new(), params)
            .await?;
        Ok(true)
    }
}

impl<H: HttpClient> Adapter for Orbit<H> {
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
        let params = self.activity_params(event)?;

        lenient(Self::NAME, self.post_activity(&params).await)
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
        let params = self.activity_params(event)?;

        Ok(self.post_activity(&params).await?)
    }
}
