//! Request encoding and response normalization.
//!
//! Everything here is a pure function of its inputs so the encoding rules can
//! be tested without a transport.

use std::collections::BTreeMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use http::HeaderMap;
use http::header::CONTENT_TYPE;
use serde_json::{Map, Value};
use url::Url;
use url::form_urlencoded;

/// Body encoding selected from the effective `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// `application/json`: params are serialized as JSON.
    Json,
    /// `multipart/form-data`: params are flattened into one part per key.
    Multipart,
    /// Anything else: params are flattened and URL-form-encoded.
    Form,
}

impl Encoding {
    /// Picks the encoding for the `Content-Type` in `headers`.
    ///
    /// Comparison ignores case, surrounding whitespace and any `;` parameters.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let media = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type)
            .unwrap_or_default();

        match media.as_str() {
            "application/json" => Self::Json,
            "multipart/form-data" => Self::Multipart,
            _ => Self::Form,
        }
    }
}

/// Returns the bare media type of a `Content-Type` value, lower-cased.
///
/// `"Application/JSON; charset=utf-8"` becomes `"application/json"`.
#[must_use]
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Flattens nested mappings and arrays into bracket-notation keys.
///
/// `{"a": 1, "b": {"c": 2}}` becomes `{"a": 1, "b[c]": 2}`. Array elements are
/// keyed by index. When two paths expand to the same key the first one wins.
#[must_use]
pub fn flatten(params: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in params {
        flatten_value(key.clone(), value, &mut out);
    }
    out
}

fn flatten_value(path: String, value: &Value, out: &mut Map<String, Value>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_value(child_path(&path, key), child, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_value(child_path(&path, &index.to_string()), child, out);
            }
        }
        scalar => {
            out.entry(path).or_insert_with(|| scalar.clone());
        }
    }
}

fn child_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}[{key}]")
    }
}

/// Flattens `params` into string pairs ready for form or query encoding.
///
/// Null leaves are omitted and booleans render as `1`/`0`. Top-level scalars
/// yield no pairs; see [`raw_body`].
#[must_use]
pub fn form_pairs(params: &Value) -> Vec<(String, String)> {
    let flat = match params {
        Value::Object(map) => flatten(map),
        Value::Array(_) => {
            let mut out = Map::new();
            flatten_value(String::new(), params, &mut out);
            out
        }
        _ => return Vec::new(),
    };

    flat.into_iter()
        .filter_map(|(key, value)| scalar_to_string(&value).map(|v| (key, v)))
        .collect()
}

/// Returns the raw body for a top-level scalar in a non-JSON encoding.
#[must_use]
pub fn raw_body(params: &Value) -> Option<String> {
    match params {
        Value::Object(_) | Value::Array(_) => None,
        scalar => scalar_to_string(scalar),
    }
}

/// Renders a scalar the way form encoders do. `Null` has no rendering.
#[must_use]
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Returns true if `params` carries nothing to send.
#[must_use]
pub fn is_empty(params: &Value) -> bool {
    match params {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// URL-form-encodes `params` (`key=value&...`).
#[must_use]
pub fn encode_form(params: &Value) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(form_pairs(params))
        .finish()
}

/// Appends `params` to the query string of `url`.
///
/// Existing query pairs are kept, so the separator is `?` or `&` as needed.
pub fn append_query(url: &mut Url, params: &Value) {
    let pairs = form_pairs(params);
    if pairs.is_empty() {
        return;
    }
    url.query_pairs_mut().extend_pairs(pairs);
}

/// A `multipart/form-data` body and the boundary separating its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multipart {
    /// The boundary, to be announced in the `Content-Type` header.
    pub boundary: String,
    /// The encoded body.
    pub body: Vec<u8>,
}

impl Multipart {
    /// The `Content-Type` value announcing this body's boundary.
    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

/// Encodes `params` as `multipart/form-data`, one part per flattened key.
///
/// The boundary is derived from the content, so the same params always
/// produce the same bytes.
#[must_use]
pub fn encode_multipart(params: &Value) -> Multipart {
    let pairs = form_pairs(params);
    let boundary = boundary_for(&pairs);

    let mut body = String::new();
    for (name, value) in &pairs {
        body.push_str("--");
        body.push_str(&boundary);
        body.push_str("\r\nContent-Disposition: form-data; name=\"");
        body.push_str(&escape_part_name(name));
        body.push_str("\"\r\n\r\n");
        body.push_str(value);
        body.push_str("\r\n");
    }
    body.push_str("--");
    body.push_str(&boundary);
    body.push_str("--\r\n");

    Multipart {
        boundary,
        body: body.into_bytes(),
    }
}

fn boundary_for(pairs: &[(String, String)]) -> String {
    let mut salt = 0u64;
    loop {
        let mut hasher = DefaultHasher::new();
        pairs.hash(&mut hasher);
        salt.hash(&mut hasher);
        let boundary = format!("----analytics-dispatch-{:016x}", hasher.finish());

        if pairs
            .iter()
            .all(|(k, v)| !k.contains(&boundary) && !v.contains(&boundary))
        {
            return boundary;
        }
        salt += 1;
    }
}

fn escape_part_name(name: &str) -> String {
    name.replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Normalizes response headers into a lower-cased, trimmed map.
///
/// Values that are not valid visible ASCII are dropped. When a header
/// repeats, the last value wins.
#[must_use]
pub fn normalize_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

/// Extracts the message to report for an error response.
///
/// Uses the JSON `message` field when the body is a JSON object carrying a
/// string `message`, the raw body otherwise.
#[must_use]
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.to_string())
}
