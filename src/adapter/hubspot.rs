//! HubSpot CRM (v3 objects, v4 associations, custom behavioral events).

use http::header::AUTHORIZATION;
use http::{HeaderMap, Method};
use serde_json::{Map, Value, json};

use super::{
    Adapter, AdapterError, AdapterState, Contact, bearer, id_string, json_headers, lenient,
    non_empty_object, require_fields, require_prop,
};
use crate::event::{Event, EventField};
use crate::invoker::{HttpClient, HttpInvoker, InvokeError, Response};

/// Settings for [`HubSpot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubSpotConfig {
    /// Private app access token.
    pub token: String,
    /// API base.
    pub endpoint: String,
}

impl HubSpotConfig {
    /// Default API base.
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.hubapi.com";

    /// Creates a config for the default endpoint.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
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

/// Sends custom behavioral events and manages contacts and companies.
///
/// Events are attached to the contact identified by the `email` prop.
#[derive(Debug)]
pub struct HubSpot<H> {
    invoker: HttpInvoker<H>,
    state: AdapterState,
}

impl<H> HubSpot<H> {
    /// Adapter name.
    pub const NAME: &'static str = "HubSpot";

    /// Creates the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the token is not a valid header
    /// value.
    pub fn new(client: H, config: HubSpotConfig) -> Result<Self, AdapterError> {
        let mut headers = json_headers();
        headers.insert(AUTHORIZATION, bearer(&config.token)?);

        Ok(Self {
            invoker: HttpInvoker::new(client, config.endpoint).with_headers(headers),
            state: AdapterState::default(),
        })
    }

    /// Derives the `/events/v3/send` body for `event`.
    ///
    /// The event type is the HubSpot event name; all props but `email`
    /// become event properties.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Precondition`] without an `email` prop.
    pub fn event_params(&self, event: &Event) -> Result<Value, AdapterError> {
        let email = require_prop(Self::NAME, event, "email")?;

        let properties: Map<String, Value> = event
            .props()
            .iter()
            .filter(|(key, _)| *key != "email")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(json!({
            "eventName": event.kind(),
            "email": email,
            "properties": properties,
        }))
    }
}

impl<H: HttpClient> HubSpot<H> {
    async fn call(&self, method: Method, path: &str, params: &Value) -> Result<Response, InvokeError> {
        self.invoker
            .call(method, path, &HeaderMap::new(), params)
            .await
    }

    async fn search(&self, object: &str, property: &str, value: &str) -> Result<Option<String>, AdapterError> {
        let params = json!({
            "filterGroups": [{
                "filters": [{
                    "propertyName": property,
                    "operator": "EQ",
                    "value": value,
                }],
            }],
        });

        let response = self
            .call(Method::POST, &format!("/crm/v3/objects/{object}/search"), &params)
            .await?;

        let total = response.pointer("/total").and_then(Value::as_u64).unwrap_or(0);
        if total == 0 {
            return Ok(None);
        }
        Ok(response.pointer("/results/0/id").and_then(id_string))
    }

    /// Returns the ID of the contact with `email`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the search fails.
    pub async fn contact_exists(&self, email: &str) -> Result<Option<String>, AdapterError> {
        self.search("contacts", "email", email).await
    }

    /// Creates a contact and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if HubSpot rejects the contact.
    pub async fn create_contact(&self, contact: &Contact) -> Result<Option<String>, AdapterError> {
        let response = self
            .call(Method::POST, "/crm/v3/objects/contacts", &contact_properties(contact))
            .await?;
        Ok(response.pointer("/id").and_then(id_string))
    }

    /// Updates the contact `contact_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the update fails.
    pub async fn update_contact(&self, contact_id: &str, contact: &Contact) -> Result<(), AdapterError> {
        self.call(
            Method::PATCH,
            &format!("/crm/v3/objects/contacts/{contact_id}"),
            &contact_properties(contact),
        )
        .await?;
        Ok(())
    }

    /// Deletes the contact with `email`. Returns `false` if there was none.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the lookup or deletion fails.
    pub async fn delete_contact(&self, email: &str) -> Result<bool, AdapterError> {
        let Some(contact_id) = self.contact_exists(email).await? else {
            return Ok(false);
        };
        self.call(
            Method::DELETE,
            &format!("/crm/v3/objects/contacts/{contact_id}"),
            &Value::Null,
        )
        .await?;
        Ok(true)
    }

    /// Returns the ID of the company called `name`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the search fails.
    pub async fn account_exists(&self, name: &str) -> Result<Option<String>, AdapterError> {
        self.search("companies", "name", name).await
    }

    /// Creates a company and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if HubSpot rejects the company.
    pub async fn create_account(&self, name: &str, domain: &str) -> Result<Option<String>, AdapterError> {
        let response = self
            .call(Method::POST, "/crm/v3/objects/companies", &company_properties(name, domain))
            .await?;
        Ok(response.pointer("/id").and_then(id_string))
    }

    /// Updates the company `account_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the update fails.
    pub async fn update_account(&self, account_id: &str, name: &str, domain: &str) -> Result<(), AdapterError> {
        self.call(
            Method::PATCH,
            &format!("/crm/v3/objects/companies/{account_id}"),
            &company_properties(name, domain),
        )
        .await?;
        Ok(())
    }

    /// Deletes the company `account_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the deletion fails.
    pub async fn delete_account(&self, account_id: &str) -> Result<(), AdapterError> {
        self.call(
            Method::DELETE,
            &format!("/crm/v3/objects/companies/{account_id}"),
            &Value::Null,
        )
        .await?;
        Ok(())
    }

    /// Associates a contact with a company using the default association.
    ///
    /// Returns `false` when the association already existed.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if either call fails.
    pub async fn sync_association(&self, account_id: &str, contact_id: &str) -> Result<bool, AdapterError> {
        let existing = self
            .call(
                Method::GET,
                &format!("/crm/v4/objects/contact/{contact_id}/associations/company"),
                &Value::Null,
            )
            .await?;

        let already = existing
            .pointer("/results")
            .and_then(Value::as_array)
            .is_some_and(|results| {
                results.iter().any(|association| {
                    association.get("toObjectId").and_then(id_string).as_deref() == Some(account_id)
                })
            });
        if already {
            return Ok(false);
        }

        self.call(
            Method::PUT,
            &format!("/crm/v4/objects/contact/{contact_id}/associations/default/company/{account_id}"),
            &Value::Null,
        )
        .await?;
        Ok(true)
    }

    async fn post_event(&self, params: &Value) -> Result<bool, InvokeError> {
        self.call(Method::POST, "/events/v3/send", params).await?;
        Ok(true)
    }
}

impl<H: HttpClient> Adapter for HubSpot<H> {
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
        let params = self.event_params(event)?;

        lenient(Self::NAME, self.post_event(&params).await)
    }

    /// Confirms the event's contact exists, then sends strictly.
    async fn validate(&self, event: &Event) -> Result<bool, AdapterError> {
        if !self.is_enabled() {
            return Ok(false);
        }
        require_fields(
            Self::NAME,
            event,
            &[EventField::Type, EventField::Url, EventField::Name],
        )?;
        let params = self.event_params(event)?;
        let email = require_prop(Self::NAME, event, "email")?;

        if self.contact_exists(email).await?.is_none() {
            return Err(AdapterError::unconfirmed(
                Self::NAME,
                format!("no contact found for {email}"),
            ));
        }

        self.post_event(&params).await?;
        Ok(true)
    }
}

fn contact_properties(contact: &Contact) -> Value {
    json!({
        "properties": non_empty_object([
            ("email", contact.email.as_str()),
            ("firstname", contact.first_name.as_str()),
            ("lastname", contact.last_name.as_str()),
            ("phone", contact.phone.as_str()),
        ]),
    })
}

fn company_properties(name: &str, domain: &str) -> Value {
    json!({
        "properties": non_empty_object([("name", name), ("domain", domain)]),
    })
}
