//! ClickHouse over its HTTP interface.
//!
//! Events are inserted as `JSONEachRow` rows into a Plausible-style events
//! table. Well-known props (`referrer`, `browser`, `utm_*`, ...) map to
//! dedicated columns; every other prop lands in the parallel
//! `metaKey`/`metaValue` arrays. The table itself must already exist.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use http::Method;
use http::header::{CONTENT_TYPE, HeaderValue};
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use super::{Adapter, AdapterError, AdapterState, Confirmation, lenient, require_fields};
use crate::event::{Event, EventField};
use crate::invoker::encode::scalar_to_string;
use crate::invoker::{HttpClient, HttpInvoker, HttpRequest, InvokeError, Response, ResponseFormat};
use crate::time::{Clock, Sleeper, SystemClock, TokioSleeper};

static IDENTIFIER_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$"));

/// `(column, prop)` pairs for the dimensions read from props.
const PROP_COLUMNS: [(&str, &str); 17] = [
    ("referrer", "referrer"),
    ("referrerSource", "referrer_source"),
    ("countryCode", "country_code"),
    ("screenSize", "screen_size"),
    ("operatingSystem", "operating_system"),
    ("operatingSystemVersion", "operating_system_version"),
    ("browser", "browser"),
    ("browserVersion", "browser_version"),
    ("utmMedium", "utm_medium"),
    ("utmSource", "utm_source"),
    ("utmCampaign", "utm_campaign"),
    ("utmContent", "utm_content"),
    ("utmTerm", "utm_term"),
    ("revenueReportingAmount", "revenue_reporting_amount"),
    ("revenueReportingCurrency", "revenue_reporting_currency"),
    ("revenueSourceAmount", "revenue_source_amount"),
    ("revenueSourceCurrency", "revenue_source_currency"),
];

/// `Nullable(Decimal)` columns; every other dimension is a plain string.
const NULLABLE_COLUMNS: [&str; 2] = ["revenueReportingAmount", "revenueSourceAmount"];

const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A database or table name safe to interpolate into SQL.
///
/// ClickHouse identifiers are case-sensitive; only ASCII letters, digits and
/// underscores are accepted, and the first character may not be a digit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Validates `value` as an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIdentifier`] if `value` is empty or contains
    /// anything but `[A-Za-z0-9_]`, or starts with a digit.
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidIdentifier> {
        let value = value.into();
        let valid = (*IDENTIFIER_PATTERN)
            .as_ref()
            .is_ok_and(|pattern| pattern.is_match(&value));
        if valid {
            Ok(Self(value))
        } else {
            Err(InvalidIdentifier(value))
        }
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A rejected ClickHouse identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid ClickHouse identifier: '{0}'")]
pub struct InvalidIdentifier(pub String);

/// Settings for [`ClickHouse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickHouseConfig {
    /// HTTP interface, including scheme and port.
    pub endpoint: String,
    /// Target database.
    pub database: Identifier,
    /// Target table.
    pub table: Identifier,
    /// User name.
    pub username: String,
    /// Password; omitted from requests when empty.
    pub password: String,
    /// Client IP stored with each row.
    pub client_ip: Option<String>,
    /// User agent stored with each row.
    pub user_agent: Option<String>,
}

impl ClickHouseConfig {
    /// Default database.
    pub const DEFAULT_DATABASE: &'static str = "analytics";

    /// Default table.
    pub const DEFAULT_TABLE: &'static str = "events";

    /// Default user.
    pub const DEFAULT_USERNAME: &'static str = "default";

    /// Creates a config with the default database, table and user.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            database: Identifier(Self::DEFAULT_DATABASE.to_string()),
            table: Identifier(Self::DEFAULT_TABLE.to_string()),
            username: Self::DEFAULT_USERNAME.to_string(),
            password: String::new(),
            client_ip: None,
            user_agent: None,
        }
    }

    /// Sets the database.
    #[must_use]
    pub fn with_database(mut self, database: Identifier) -> Self {
        self.database = database;
        self
    }

    /// Sets the table.
    #[must_use]
    pub fn with_table(mut self, table: Identifier) -> Self {
        self.table = table;
        self
    }

    /// Sets the user name and password.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }
}

/// Stores events as rows in a ClickHouse table.
///
/// `validate` does not insert: it confirms a previously sent event is
/// queryable, polling under the [`Confirmation`] policy.
#[derive(Debug)]
pub struct ClickHouse<H, S = TokioSleeper, C = SystemClock> {
    invoker: HttpInvoker<H>,
    sleeper: S,
    clock: C,
    database: Identifier,
    table: Identifier,
    username: String,
    password: String,
    confirmation: Confirmation,
    state: AdapterState,
}

impl<H> ClickHouse<H> {
    /// Creates the adapter with the system clock and the default
    /// confirmation policy.
    #[must_use]
    pub fn new(client: H, config: ClickHouseConfig) -> Self {
        Self {
            invoker: HttpInvoker::new(client, config.endpoint),
            sleeper: TokioSleeper,
            clock: SystemClock,
            database: config.database,
            table: config.table,
            username: config.username,
            password: config.password,
            confirmation: Confirmation::default(),
            state: AdapterState::with_forwarding(config.client_ip, config.user_agent),
        }
    }
}

impl<H, S, C> ClickHouse<H, S, C> {
    /// Adapter name.
    pub const NAME: &'static str = "ClickHouse";

    /// Sets the sleeper used between confirmation checks.
    #[must_use]
    pub fn with_sleeper<S2>(self, sleeper: S2) -> ClickHouse<H, S2, C> {
        ClickHouse {
            invoker: self.invoker,
            sleeper,
            clock: self.clock,
            database: self.database,
            table: self.table,
            username: self.username,
            password: self.password,
            confirmation: self.confirmation,
            state: self.state,
        }
    }

    /// Sets the clock used for `createdAt`.
    #[must_use]
    pub fn with_clock<C2>(self, clock: C2) -> ClickHouse<H, S, C2> {
        ClickHouse {
            invoker: self.invoker,
            sleeper: self.sleeper,
            clock,
            database: self.database,
            table: self.table,
            username: self.username,
            password: self.password,
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

    fn insert_sql(&self) -> String {
        let columns = ["eventType", "eventName", "url", "hostName", "pathName"]
            .into_iter()
            .chain(PROP_COLUMNS.iter().map(|(column, _)| *column))
            .chain(["metaKey", "metaValue", "userAgent", "clientIp", "createdAt"])
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {}.{} ({columns}) FORMAT JSONEachRow",
            self.database, self.table
        )
    }

    fn count_sql(&self) -> String {
        format!(
            "SELECT count() AS cnt FROM {}.{} \
             WHERE eventType = {{eventType:String}} \
             AND eventName = {{eventName:String}} \
             AND url = {{url:String}} FORMAT JSON",
            self.database, self.table
        )
    }

    fn statement_url(&self, params: &[(&str, &str)]) -> Result<Url, InvokeError> {
        let mut url = self.invoker.resolve("/")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("database", self.database.as_str());
            query.append_pair("user", &self.username);
            for (key, value) in params {
                query.append_pair(&format!("param_{key}"), value);
            }
            if !self.password.is_empty() {
                query.append_pair("password", &self.password);
            }
        }
        Ok(url)
    }
}

impl<H, S, C: Clock> ClickHouse<H, S, C> {
    /// Derives the table row for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Precondition`] unless type, URL and name are
    /// all set.
    pub fn event_row(&self, event: &Event) -> Result<Map<String, Value>, AdapterError> {
        require_fields(
            Self::NAME,
            event,
            &[EventField::Type, EventField::Url, EventField::Name],
        )?;
        let (host_name, path_name) = split_url(event.url());

        let mut row = Map::new();
        row.insert("eventType".into(), event.kind().into());
        row.insert("eventName".into(), event.name().into());
        row.insert("url".into(), event.url().into());
        row.insert("hostName".into(), host_name.into());
        row.insert("pathName".into(), path_name.into());

        for (column, key) in PROP_COLUMNS {
            let nullable = NULLABLE_COLUMNS.contains(&column);
            let value = match event.prop(key) {
                Some(value) if nullable => value.clone(),
                Some(value) => stringify(value).into(),
                None if nullable => Value::Null,
                None => "".into(),
            };
            row.insert(column.into(), value);
        }

        let (keys, values): (Vec<Value>, Vec<Value>) = event
            .props()
            .iter()
            .filter(|(key, _)| !PROP_COLUMNS.iter().any(|(_, prop)| *prop == key.as_str()))
            .map(|(key, value)| (Value::from(key.as_str()), Value::from(stringify(value))))
            .unzip();
        row.insert("metaKey".into(), Value::Array(keys));
        row.insert("metaValue".into(), Value::Array(values));

        row.insert(
            "userAgent".into(),
            self.state.user_agent().unwrap_or_default().into(),
        );
        row.insert(
            "clientIp".into(),
            self.state.client_ip().unwrap_or_default().into(),
        );
        row.insert("createdAt".into(), self.created_at().into());

        Ok(row)
    }

    fn created_at(&self) -> String {
        chrono::DateTime::<chrono::Utc>::from(self.clock.now())
            .format(CREATED_AT_FORMAT)
            .to_string()
    }

    fn insert_body(&self, events: &[Event]) -> Result<String, AdapterError> {
        let mut body = self.insert_sql();
        for event in events {
            body.push('\n');
            body.push_str(&Value::Object(self.event_row(event)?).to_string());
        }
        Ok(body)
    }
}

impl<H: HttpClient, S, C> ClickHouse<H, S, C> {
    async fn statement(
        &self,
        sql: String,
        params: &[(&str, &str)],
        content_type: &'static str,
        format: ResponseFormat,
    ) -> Result<Response, InvokeError> {
        let request = HttpRequest::new(Method::POST, self.statement_url(params)?)
            .with_header(CONTENT_TYPE, HeaderValue::from_static(content_type))
            .with_body(sql.into_bytes());

        self.invoker.execute(request, format).await
    }

    /// Counts the rows matching the event's type, name and URL.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Invoke`] if the query fails or its response
    /// is not JSON.
    pub async fn count(&self, event: &Event) -> Result<u64, AdapterError> {
        let params = [
            ("eventType", event.kind()),
            ("eventName", event.name()),
            ("url", event.url()),
        ];
        let response = self
            .statement(self.count_sql(), &params, "text/plain", ResponseFormat::Json)
            .await?;

        // 64-bit counts are quoted by default.
        Ok(response
            .pointer("/data/0/cnt")
            .and_then(|cnt| cnt.as_u64().or_else(|| cnt.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(0))
    }
}

impl<H: HttpClient, S, C: Clock> ClickHouse<H, S, C> {
    /// Inserts several events with a single statement.
    ///
    /// Every event is checked before anything is sent; an empty batch sends
    /// nothing and reports `false`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Precondition`] if any event lacks its type,
    /// URL or name. Failed inserts are logged and reported as `Ok(false)`.
    pub async fn send_batch(&self, events: &[Event]) -> Result<bool, AdapterError> {
        if !self.state.is_enabled() || events.is_empty() {
            return Ok(false);
        }
        let body = self.insert_body(events)?;

        let inserted = self
            .statement(body, &[], "application/json", ResponseFormat::Auto)
            .await
            .map(|_| true);
        lenient(Self::NAME, inserted)
    }
}

impl<H: HttpClient, S: Sleeper, C: Clock> Adapter for ClickHouse<H, S, C> {
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
        self.send_batch(std::slice::from_ref(event)).await
    }

    async fn validate(&self, event: &Event) -> Result<bool, AdapterError> {
        if !self.state.is_enabled() {
            return Ok(false);
        }
        require_fields(
            Self::NAME,
            event,
            &[EventField::Type, EventField::Url, EventField::Name],
        )?;

        let found = self
            .confirmation
            .poll(&self.sleeper, || async move {
                Ok::<_, AdapterError>(self.count(event).await? > 0)
            })
            .await?;

        if found {
            Ok(true)
        } else {
            Err(AdapterError::unconfirmed(
                Self::NAME,
                format!("no rows found for event '{}'", event.kind()),
            ))
        }
    }
}

/// Splits a URL into host and path-with-query. Unparseable URLs yield an
/// empty host and `/`.
fn split_url(raw: &str) -> (String, String) {
    let Ok(url) = Url::parse(raw) else {
        return (String::new(), "/".to_string());
    };
    let host = url.host_str().unwrap_or_default().to_string();
    let path = url
        .query()
        .map_or_else(|| url.path().to_string(), |q| format!("{}?{q}", url.path()));
    (host, path)
}

/// Renders a prop for an `Array(String)` or `String` column. Nested values
/// become compact JSON.
fn stringify(value: &Value) -> String {
    scalar_to_string(value).unwrap_or_default()
}
