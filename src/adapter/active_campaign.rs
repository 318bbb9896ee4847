//! ActiveCampaign (event tracking plus the v3 REST API).

use http::header::{CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, HeaderName, Method};
use serde_json::{Map, Value, json};

use super::{
    Adapter, AdapterError, AdapterState, Contact, id_string, json_headers, lenient,
    non_empty_object, require_fields, require_prop, secret_header,
};
use crate::event::{Event, EventField};
use crate::invoker::{HttpClient, HttpInvoker, InvokeError, Response};

const API_TOKEN: HeaderName = HeaderName::from_static("api-token");

/// Settings for [`ActiveCampaign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveCampaignConfig {
    /// Event tracking key.
    pub key: String,
    /// Account ID used by event tracking.
    pub actid: String,
    /// v3 API token.
    pub api_key: String,
    /// Account (organisation) name, the subdomain of the API host.
    pub account: String,
    /// Event tracking endpoint.
    pub tracking_endpoint: String,
    /// v3 API base.
    pub api_endpoint: String,
}

impl ActiveCampaignConfig {
    /// Default event tracking endpoint.
    pub const DEFAULT_TRACKING_ENDPOINT: &'static str = "https://trackcmp.net/event";

    /// Creates a config for the hosted service.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        actid: impl Into<String>,
        api_key: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        let account = account.into();
        Self {
            key: key.into(),
            actid: actid.into(),
            api_key: api_key.into(),
            api_endpoint: Self::default_api_endpoint(&account),
            account,
            tracking_endpoint: Self::DEFAULT_TRACKING_ENDPOINT.to_string(),
        }
    }

    /// The v3 API base for `account`.
    #[must_use]
    pub fn default_api_endpoint(account: &str) -> String {
        format!("https://{account}.api-us1.com/api/3")
    }

    /// Overrides both endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, tracking: impl Into<String>, api: impl Into<String>) -> Self {
        self.tracking_endpoint = tracking.into();
        self.api_endpoint = api.into();
        self
    }
}

/// Tracks events against existing ActiveCampaign contacts and manages
/// contacts, accounts, lists and tags.
///
/// ActiveCampaign only attaches events to contacts that already exist; it
/// never creates one from an event.
#[derive(Debug)]
pub struct ActiveCampaign<H> {
    invoker: HttpInvoker<H>,
    tracking_endpoint: String,
    key: String,
    actid: String,
    api_token: HeaderValue,
    state: AdapterState,
}

impl<H> ActiveCampaign<H> {
    /// Adapter name.
    pub const NAME: &'static str = "ActiveCampaign";

    /// Creates the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the API key is not a valid header
    /// value.
    pub fn new(client: H, config: ActiveCampaignConfig) -> Result<Self, AdapterError> {
        Ok(Self {
            invoker: HttpInvoker::new(client, config.api_endpoint),
            tracking_endpoint: config.tracking_endpoint,
            key: config.key,
            actid: config.actid,
            api_token: secret_header(&config.api_key)?,
            state: AdapterState::default(),
        })
    }

    /// Derives the tracking form for `event`. Empty fields are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Precondition`] without an `email` prop.
    pub fn tracking_params(&self, event: &Event) -> Result<Value, AdapterError> {
        let email = require_prop(Self::NAME, event, "email")?;
        let name = if event.name().is_empty() {
            event.kind()
        } else {
            event.name()
        };

        let eventdata = Value::Object(event.props().clone()).to_string();
        let visit = json!({"email": email}).to_string();

        Ok(Value::Object(non_empty_object([
            ("key", self.key.as_str()),
            ("event", name),
            ("actid", self.actid.as_str()),
            ("eventdata", eventdata.as_str()),
            ("visit", visit.as_str()),
        ])))
    }

    fn api_headers(&self, json_body: bool) -> HeaderMap {
        let mut headers = if json_body { json_headers() } else { HeaderMap::new() };
        headers.insert(API_TOKEN, self.api_token.clone());
        headers
    }
}

impl<H: HttpClient> ActiveCampaign<H> {
    async fn api(&self, method: Method, path: &str, params: &Value) -> Result<Response, InvokeError> {
        let json_body = !(method == Method::GET || params.is_null());
        self.invoker
            .call(method, path, &self.api_headers(json_body), params)
            .await
    }

    async fn find(&self, collection: &str, query: &Value) -> Result<Option<String>, AdapterError> {
        let response = self.api(Method::GET, &format!("/{collection}"), query).await?;

        let total = response
            .pointer("/meta/total")
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(0);
        if total == 0 {
            return Ok(None);
        }
        Ok(response
            .pointer(&format!("/{collection}/0/id"))
            .and_then(id_string))
    }

    /// Returns the ID of the contact with `email`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the lookup fails.
    pub async fn contact_exists(&self, email: &str) -> Result<Option<String>, AdapterError> {
        self.find("contacts", &json!({"email": email})).await
    }

    /// Creates a contact and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the contact is rejected.
    pub async fn create_contact(&self, contact: &Contact) -> Result<Option<String>, AdapterError> {
        let response = self
            .api(Method::POST, "/contacts", &contact_body(contact))
            .await?;
        Ok(response.pointer("/contact/id").and_then(id_string))
    }

    /// Updates the contact `contact_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the update fails.
    pub async fn update_contact(&self, contact_id: &str, contact: &Contact) -> Result<(), AdapterError> {
        self.api(
            Method::PUT,
            &format!("/contacts/{contact_id}"),
            &contact_body(contact),
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
        self.api(Method::DELETE, &format!("/contacts/{contact_id}"), &Value::Null)
            .await?;
        Ok(true)
    }

    /// Returns the ID of the account called `name`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the search fails.
    pub async fn account_exists(&self, name: &str) -> Result<Option<String>, AdapterError> {
        self.find("accounts", &json!({"search": name})).await
    }

    /// Creates an account and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the account is rejected.
    pub async fn create_account(&self, name: &str, url: &str) -> Result<Option<String>, AdapterError> {
        let body = json!({
            "account": non_empty_object([("name", name), ("accountUrl", url)]),
        });
        let response = self.api(Method::POST, "/accounts", &body).await?;
        Ok(response.pointer("/account/id").and_then(id_string))
    }

    /// Deletes the account `account_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the deletion fails.
    pub async fn delete_account(&self, account_id: &str) -> Result<(), AdapterError> {
        self.api(Method::DELETE, &format!("/accounts/{account_id}"), &Value::Null)
            .await?;
        Ok(())
    }

    /// Links a contact to an account, updating the job title when the link
    /// already exists. Returns `true` when a new link was created.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if any call fails.
    pub async fn sync_association(
        &self,
        account_id: &str,
        contact_id: &str,
        job_title: &str,
    ) -> Result<bool, AdapterError> {
        let existing = self
            .find(
                "accountContacts",
                &json!({"filters": {"account": account_id, "contact": contact_id}}),
            )
            .await?;

        match existing {
            Some(link_id) => {
                let body = json!({"accountContact": {"jobTitle": job_title}});
                self.api(Method::PUT, &format!("/accountContacts/{link_id}"), &body)
                    .await?;
                Ok(false)
            }
            None => {
                let body = json!({"accountContact": {
                    "contact": contact_id,
                    "account": account_id,
                    "jobTitle": job_title,
                }});
                self.api(Method::POST, "/accountContacts", &body).await?;
                Ok(true)
            }
        }
    }

    /// Subscribes a contact to a list.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the call fails.
    pub async fn add_to_list(&self, contact_id: &str, list_id: &str) -> Result<(), AdapterError> {
        let body = json!({"contactList": {"list": list_id, "contact": contact_id, "status": 1}});
        self.api(Method::POST, "/contactLists", &body).await?;
        Ok(())
    }

    /// Adds a tag to a contact.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the call fails.
    pub async fn add_tag(&self, contact_id: &str, tag_id: &str) -> Result<(), AdapterError> {
        let body = json!({"contactTag": {"contact": contact_id, "tag": tag_id}});
        self.api(Method::POST, "/contactTags", &body).await?;
        Ok(())
    }

    async fn track(&self, params: &Value) -> Result<bool, InvokeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        let response = self
            .invoker
            .call(Method::POST, &self.tracking_endpoint, &headers, params)
            .await?;

        // The tracker answers 200 with `success: 0` for unknown contacts.
        let rejected = response
            .pointer("/success")
            .is_some_and(|v| v.as_i64() == Some(0) || v == &Value::Bool(false));
        Ok(!rejected)
    }
}

impl<H: HttpClient> Adapter for ActiveCampaign<H> {
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
        let params = self.tracking_params(event)?;

        lenient(Self::NAME, self.track(&params).await)
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
        let params = self.tracking_params(event)?;
        let email = require_prop(Self::NAME, event, "email")?;

        if self.contact_exists(email).await?.is_none() {
            return Err(AdapterError::unconfirmed(
                Self::NAME,
                format!("no contact found for {email}"),
            ));
        }

        if self.track(&params).await? {
            Ok(true)
        } else {
            Err(AdapterError::unconfirmed(Self::NAME, "tracker did not accept the event"))
        }
    }
}

fn contact_body(contact: &Contact) -> Value {
    let fields: Map<String, Value> = non_empty_object([
        ("email", contact.email.as_str()),
        ("firstName", contact.first_name.as_str()),
        ("lastName", contact.last_name.as_str()),
        ("phone", contact.phone.as_str()),
    ]);
    json!({"contact": fields})
}
