//! The shared request-building, executing and response-normalizing core.

use std::collections::BTreeMap;

use http::header::{CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use serde_json::Value;
use url::Url;

use super::encode::{self, Encoding};
use super::{HttpClient, HttpRequest, InvokeError};

/// How the caller wants the response body interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// Decode JSON when the response declares `application/json`,
    /// keep the raw text otherwise.
    #[default]
    Auto,
    /// The body must be JSON whatever the declared content type.
    Json,
}

/// A response body after parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Decoded JSON.
    Json(Value),
    /// Raw text.
    Text(String),
}

impl ResponseBody {
    /// Returns the decoded JSON, if the body was JSON.
    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    /// Returns the raw text, if the body was not JSON.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }

    /// Returns true for an empty text body.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(text) if text.is_empty())
    }
}

/// A normalized response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// HTTP status, always below 400.
    pub status: StatusCode,
    /// Lower-cased header names mapped to trimmed values.
    pub headers: BTreeMap<String, String>,
    /// Parsed body.
    pub body: ResponseBody,
}

impl Response {
    /// Looks up a JSON value by pointer (`/results/0/id`) in a JSON body.
    #[must_use]
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.body.as_json().and_then(|v| v.pointer(pointer))
    }
}

/// Turns logical calls into HTTP round trips.
///
/// Holds the client, the base endpoint relative paths are resolved against,
/// and the default headers every call starts from. Nothing else is kept
/// between calls and no request is ever retried.
///
/// # Example
///
/// ```no_run
/// use analytics_dispatch::invoker::{HttpInvoker, ReqwestClient};
/// use http::{HeaderMap, Method};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let invoker = HttpInvoker::new(ReqwestClient::new(), "https://plausible.io/api");
/// let response = invoker
///     .call(Method::GET, "/health", &HeaderMap::new(), &json!({"verbose": true}))
///     .await?;
/// println!("{:?}", response.body);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpInvoker<H> {
    client: H,
    endpoint: String,
    headers: HeaderMap,
}

impl<H> HttpInvoker<H> {
    /// Creates an invoker with no default headers.
    ///
    /// The endpoint is only parsed when a call is resolved against it, so a
    /// malformed endpoint surfaces as [`InvokeError::Encode`] on first use.
    #[must_use]
    pub fn new(client: H, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Replaces the default headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets one default header.
    #[must_use]
    pub fn with_header(mut self, name: http::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns the base endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the default headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the underlying client.
    #[must_use]
    pub const fn client(&self) -> &H {
        &self.client
    }

    /// Resolves `path` against the endpoint.
    ///
    /// Absolute `http(s)://` URLs are used as given; anything else is
    /// appended to the endpoint with exactly one `/` in between.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Encode`] if the result is not a valid URL.
    pub fn resolve(&self, path: &str) -> Result<Url, InvokeError> {
        let joined = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.is_empty() {
            self.endpoint.clone()
        } else {
            format!(
                "{}/{}",
                self.endpoint.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        };

        Url::parse(&joined).map_err(|e| InvokeError::Encode(format!("invalid URL '{joined}': {e}")))
    }

    /// Builds the request for a call without sending it.
    ///
    /// `headers` are merged over the default headers, per-call values winning.
    /// GET params go to the query string and GET never carries a body. Other
    /// methods encode params as the body according to the effective
    /// `Content-Type` (see [`Encoding`]). `Null` params produce no body.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Encode`] if the URL is invalid, GET params are
    /// not a mapping, or JSON serialization fails.
    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        headers: &HeaderMap,
        params: &Value,
    ) -> Result<HttpRequest, InvokeError> {
        let mut url = self.resolve(path)?;
        let mut merged = self.merge_headers(headers);

        if method == Method::GET {
            if !encode::is_empty(params) {
                if !(params.is_object() || params.is_array()) {
                    return Err(InvokeError::Encode(
                        "GET params must be a mapping".to_string(),
                    ));
                }
                encode::append_query(&mut url, params);
            }
            let mut request = HttpRequest::new(method, url);
            request.headers = merged;
            return Ok(request);
        }

        let body = if params.is_null() {
            None
        } else {
            match Encoding::from_headers(&merged) {
                Encoding::Json => Some(
                    serde_json::to_vec(params)
                        .map_err(|e| InvokeError::Encode(format!("JSON encoding failed: {e}")))?,
                ),
                Encoding::Multipart => {
                    let multipart = encode::encode_multipart(params);
                    merged.insert(CONTENT_TYPE, header_value(&multipart.content_type())?);
                    Some(multipart.body)
                }
                Encoding::Form => {
                    let text = encode::raw_body(params).unwrap_or_else(|| encode::encode_form(params));
                    if !merged.contains_key(CONTENT_TYPE) {
                        merged.insert(
                            CONTENT_TYPE,
                            HeaderValue::from_static("application/x-www-form-urlencoded"),
                        );
                    }
                    Some(text.into_bytes())
                }
            }
        };

        let mut request = HttpRequest::new(method, url);
        request.headers = merged;
        request.body = body;
        Ok(request)
    }

    fn merge_headers(&self, headers: &HeaderMap) -> HeaderMap {
        let mut merged = self.headers.clone();
        for name in headers.keys() {
            merged.remove(name);
            for value in headers.get_all(name) {
                merged.append(name.clone(), value.clone());
            }
        }
        merged
    }
}

impl<H: HttpClient> HttpInvoker<H> {
    /// Performs one call and returns the normalized response.
    ///
    /// The body is decoded as JSON when the response declares
    /// `application/json`.
    ///
    /// # Errors
    ///
    /// - [`InvokeError::Encode`] if the request cannot be built
    /// - [`InvokeError::Transport`] if no response was received
    /// - [`InvokeError::Http`] for status 400 and above
    /// - [`InvokeError::Decode`] if a declared-JSON body is malformed
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        headers: &HeaderMap,
        params: &Value,
    ) -> Result<Response, InvokeError> {
        let request = self.build_request(method, path, headers, params)?;
        self.execute(request, ResponseFormat::Auto).await
    }

    /// Like [`call`](Self::call), but the response body must be JSON.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call); [`InvokeError::Decode`] whenever the body is
    /// not valid JSON.
    pub async fn call_json(
        &self,
        method: Method,
        path: &str,
        headers: &HeaderMap,
        params: &Value,
    ) -> Result<Response, InvokeError> {
        let request = self.build_request(method, path, headers, params)?;
        self.execute(request, ResponseFormat::Json).await
    }

    /// Sends a fully built request and classifies the outcome.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn execute(
        &self,
        request: HttpRequest,
        format: ResponseFormat,
    ) -> Result<Response, InvokeError> {
        tracing::debug!(method = %request.method, url = %request.url, "Sending request");

        let response = self.client.request(request).await.inspect_err(|e| {
            tracing::debug!("Transport failure: {e}");
        })?;

        let status = response.status;
        let headers = encode::normalize_headers(&response.headers);
        let text = response.body_text();

        if status.as_u16() >= 400 {
            let message = encode::error_message(&text);
            tracing::debug!(%status, "Backend rejected request: {message}");
            return Err(InvokeError::Http {
                status,
                message,
                body: text,
            });
        }

        let declared_json = headers
            .get("content-type")
            .is_some_and(|ct| encode::media_type(ct) == "application/json");

        let body = match format {
            ResponseFormat::Json => ResponseBody::Json(decode(status, &text)?),
            ResponseFormat::Auto if declared_json && !text.trim().is_empty() => {
                ResponseBody::Json(decode(status, &text)?)
            }
            ResponseFormat::Auto => ResponseBody::Text(text),
        };

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

fn decode(status: StatusCode, text: &str) -> Result<Value, InvokeError> {
    serde_json::from_str(text).map_err(|source| InvokeError::Decode { status, source })
}

fn header_value(value: &str) -> Result<HeaderValue, InvokeError> {
    HeaderValue::from_str(value)
        .map_err(|e| InvokeError::Encode(format!("invalid header value '{value}': {e}")))
}
