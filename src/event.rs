//! The backend-agnostic analytics event.
//!
//! An [`Event`] is built once per logical occurrence and handed to every
//! configured adapter. Adapters read whichever props their backend needs and
//! derive their own request parameters; they never mutate the event.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

/// Open bag of backend-specific fields, in insertion order.
pub type Props = Map<String, Value>;

/// A single analytics event.
///
/// # Example
///
/// ```
/// use analytics_dispatch::event::Event;
///
/// let event = Event::new("pageview", "https://example.com/docs")
///     .with_name("pageview")
///     .with_prop("email", "user@example.com");
///
/// assert_eq!(event.prop_str("email"), Some("user@example.com"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    kind: String,
    url: String,
    #[serde(default)]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(default)]
    props: Props,
}

/// The structural fields an adapter may require before sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventField {
    /// The event category (`type`).
    Type,
    /// The resource the event relates to.
    Url,
    /// The human label.
    Name,
}

impl fmt::Display for EventField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Type => "type",
            Self::Url => "url",
            Self::Name => "name",
        })
    }
}

impl Event {
    /// Creates an event with the two required fields set.
    #[must_use]
    pub fn new(kind: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the value.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Adds a single prop, replacing any previous value under `key`.
    #[must_use]
    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    /// Replaces all props.
    #[must_use]
    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    /// Returns the event category.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Sets the event category.
    pub fn set_kind(&mut self, kind: impl Into<String>) -> &mut Self {
        self.kind = kind.into();
        self
    }

    /// Returns the URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sets the URL.
    pub fn set_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.url = url.into();
        self
    }

    /// Returns the name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the name.
    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    /// Returns the value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Sets or clears the value.
    pub fn set_value(&mut self, value: Option<String>) -> &mut Self {
        self.value = value;
        self
    }

    /// Returns all props.
    #[must_use]
    pub const fn props(&self) -> &Props {
        &self.props
    }

    /// Replaces all props.
    pub fn set_props(&mut self, props: Props) -> &mut Self {
        self.props = props;
        self
    }

    /// Adds a prop, replacing any previous value under `key`.
    ///
    /// A replaced key keeps its original position.
    pub fn add_prop(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.props.insert(key.into(), value.into());
        self
    }

    /// Removes a prop. Removing a missing key is a no-op.
    ///
    /// The remaining props keep their relative order.
    pub fn remove_prop(&mut self, key: &str) -> &mut Self {
        self.props.shift_remove(key);
        self
    }

    /// Returns a prop by key.
    #[must_use]
    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    /// Returns a prop as a string slice.
    ///
    /// Only non-empty JSON strings qualify; numbers and other values are not
    /// coerced.
    #[must_use]
    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.prop(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Checks that every listed field is non-empty.
    ///
    /// # Errors
    ///
    /// Returns the first missing field in `fields` order.
    pub fn require(&self, fields: &[EventField]) -> Result<(), EventField> {
        fields
            .iter()
            .find(|field| self.field(**field).is_empty())
            .map_or(Ok(()), |field| Err(*field))
    }

    fn field(&self, field: EventField) -> &str {
        match field {
            EventField::Type => &self.kind,
            EventField::Url => &self.url,
            EventField::Name => &self.name,
        }
    }
}
