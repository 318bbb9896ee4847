//! HTTP invocation layer shared by every adapter.
//!
//! This module provides types and traits for:
//! - Building HTTP requests ([`HttpRequest`])
//! - Handling HTTP responses ([`HttpResponse`])
//! - Abstracting HTTP clients ([`HttpClient`])
//! - Production HTTP client implementation ([`ReqwestClient`])
//! - Content-type-driven encoding and response parsing ([`HttpInvoker`])
//! - The pure encoding helpers behind it ([`encode`])

mod client;
pub mod encode;
mod error;
mod invoke;
mod transport;


pub use client::{ReqwestClient, Timeouts};
pub use encode::{Encoding, flatten};
pub use error::{InvokeError, TransportError};
pub use invoke::{HttpInvoker, Response, ResponseBody, ResponseFormat};
pub use transport::{HttpClient, HttpRequest, HttpResponse};
