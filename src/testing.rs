//! Shared test fixtures: a scripted HTTP client and response builders.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use serde_json::Value;

use crate::invoker::{HttpClient, HttpRequest, HttpResponse, TransportError};
use crate::time::Clock;

/// Mock HTTP client that returns a scripted sequence of responses and
/// records every request it receives.
///
/// Once the script runs out it answers `200` with an empty body.
#[derive(Debug, Default)]
pub struct MockClient {
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
    call_count: AtomicUsize,
}

impl MockClient {
    pub fn new(responses: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        })
    }

    /// Answers every request with `200 {}`.
    pub fn ok() -> Arc<Self> {
        Self::replying(vec![json_response(200, &serde_json::json!({}))])
    }

    pub fn replying(responses: Vec<HttpResponse>) -> Arc<Self> {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    pub fn failing() -> Arc<Self> {
        Self::new(vec![Err(TransportError::Connection(Box::new(
            std::io::Error::other("connection refused"),
        )))])
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> HttpRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request was sent")
    }
}

impl HttpClient for MockClient {
    async fn request(&self, req: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(req);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(text_response(200, "")))
    }
}

impl HttpClient for Arc<MockClient> {
    async fn request(&self, req: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).request(req).await
    }
}

/// A response with `Content-Type: application/json`.
pub fn json_response(status: u16, body: &Value) -> HttpResponse {
    let mut headers = http::HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json; charset=utf-8"),
    );
    HttpResponse::new(
        http::StatusCode::from_u16(status).unwrap(),
        headers,
        serde_json::to_vec(body).unwrap(),
    )
}

/// A response with `Content-Type: text/plain`.
pub fn text_response(status: u16, body: &str) -> HttpResponse {
    typed_response(status, "text/plain", body)
}

/// A response with an arbitrary content type.
pub fn typed_response(status: u16, content_type: &'static str, body: &str) -> HttpResponse {
    let mut headers = http::HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static(content_type),
    );
    HttpResponse::new(
        http::StatusCode::from_u16(status).unwrap(),
        headers,
        body.as_bytes().to_vec(),
    )
}

/// Parses the JSON body of a captured request.
pub fn json_body(request: &HttpRequest) -> Value {
    serde_json::from_slice(request.body.as_deref().expect("request has no body")).unwrap()
}

/// Decodes the form body of a captured request into ordered pairs.
pub fn form_body(request: &HttpRequest) -> Vec<(String, String)> {
    url::form_urlencoded::parse(request.body.as_deref().expect("request has no body"))
        .into_owned()
        .collect()
}

/// Looks up one decoded form field.
pub fn form_field(request: &HttpRequest, key: &str) -> Option<String> {
    form_body(request)
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
}

/// Looks up one decoded query parameter.
pub fn query_param(request: &HttpRequest, key: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Returns a request header as a string.
pub fn header<'a>(request: &'a HttpRequest, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|v| v.to_str().ok())
}

pub fn url(s: &str) -> url::Url {
    url::Url::parse(s).unwrap()
}

/// Clock frozen at a fixed number of seconds after the epoch.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(self.0)
    }
}
