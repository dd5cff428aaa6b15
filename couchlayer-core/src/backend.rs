//! HTTP backend abstraction for the document store client.
//!
//! The [`HttpBackend`] trait is the only place where network I/O happens. The
//! [`Transport`](crate::transport::Transport) layers retries, timeouts and
//! cancellation on top of it, and every higher-level operation goes through the
//! transport.
//!
//! Two implementations ship with the workspace:
//!
//! - `couchlayer-reqwest` sends real requests with `reqwest`
//! - `couchlayer-memory` emulates the store's HTTP surface in process
//!
//! # Example
//!
//! ```ignore
//! use couchlayer::backend::{HttpBackend, HttpRequest, Method};
//!
//! let response = backend
//!     .send(HttpRequest::new(Method::Head, url, Duration::from_secs(5)))
//!     .await?;
//! assert_eq!(response.status, 200);
//! ```

use async_trait::async_trait;
use std::{fmt, fmt::Debug, sync::Arc, time::Duration};
use thiserror::Error;
use url::Url;

use crate::error::CouchResult;

/// HTTP verbs used by the store protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Existence probes.
    Head,
    /// Reading documents and views.
    Get,
    /// Creating documents.
    Post,
    /// Creating databases, creating and updating documents.
    Put,
    /// Removing documents.
    Delete,
}

impl Method {
    /// Returns the canonical upper-case verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Head => "HEAD",
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved request handed to a backend for a single attempt.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP verb.
    pub method: Method,
    /// The absolute request URL, possibly carrying basic-auth user info.
    pub url: Url,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Serialized JSON body, if any.
    pub body: Option<Vec<u8>>,
    /// Deadline for this attempt, measured from the moment it is sent.
    pub timeout: Duration,
}

impl HttpRequest {
    /// Creates a request with no headers and no body.
    pub fn new(method: Method, url: Url, timeout: Duration) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// The status code and full body of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns the body decoded lossily as UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Returns `true` for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failures that prevent a request from producing a response at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The connection could not be established.
    #[error("Connection error: {0}")]
    Connect(String),
    /// The attempt did not complete within its deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// The request could not be built or sent.
    #[error("Request error: {0}")]
    Request(String),
    /// The response body could not be read.
    #[error("Response body error: {0}")]
    Body(String),
}

/// Abstract interface for sending HTTP requests.
///
/// Implementations perform exactly one network round trip per call and never
/// retry; retries belong to the transport. Any response, whatever its status
/// code, is a successful call.
#[async_trait]
pub trait HttpBackend: Send + Sync + Debug {
    /// Sends a request and reads the full response body.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, BackendError>;
}

#[async_trait]
impl<B> HttpBackend for &B
where
    B: HttpBackend,
{
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, BackendError> {
        (*self).send(request).await
    }
}

#[async_trait]
impl<B> HttpBackend for Arc<B>
where
    B: HttpBackend + ?Sized,
{
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, BackendError> {
        (**self).send(request).await
    }
}

/// Factory trait for constructing backend instances.
#[async_trait]
pub trait HttpBackendBuilder: Send {
    /// The backend this builder produces.
    type Backend: HttpBackend + 'static;

    /// Builds the backend.
    async fn build(self) -> CouchResult<Self::Backend>;
}
