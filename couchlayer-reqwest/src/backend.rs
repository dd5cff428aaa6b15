//! `reqwest` implementation of the HTTP backend.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

use couchlayer_core::{
    backend::{BackendError, HttpBackend, HttpBackendBuilder, HttpRequest, HttpResponse, Method},
    endpoint::redacted,
    error::{CouchError, CouchResult},
};

const USER_AGENT: &str = concat!("couchlayer/", env!("CARGO_PKG_VERSION"));

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Head => reqwest::Method::HEAD,
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout(timeout)
    } else if err.is_connect() {
        BackendError::Connect(err.to_string())
    } else if err.is_body() || err.is_decode() {
        BackendError::Body(err.to_string())
    } else {
        BackendError::Request(err.to_string())
    }
}

/// HTTP backend sending requests with a shared `reqwest` client.
///
/// Cloning is cheap and clones share the connection pool. Credentials embedded
/// in the request URL are sent as basic auth.
#[derive(Debug, Clone, Default)]
pub struct ReqwestBackend {
    client: Client,
}

impl ReqwestBackend {
    /// Creates a backend with a default client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend on top of an existing client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Creates a builder for configuring the client.
    pub fn builder() -> ReqwestBackendBuilder {
        ReqwestBackendBuilder::new()
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    #[instrument(skip(self, request), fields(method = %request.method, url = %redacted(&request.url)))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, BackendError> {
        let timeout = request.timeout;
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), request.url)
            .timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|err| classify(err, timeout))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| classify(err, timeout))?;

        debug!(status, bytes = body.len(), "received response");
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

/// Builder for [`ReqwestBackend`].
///
/// # Example
///
/// ```ignore
/// use couchlayer::{backend::HttpBackendBuilder, reqwest::ReqwestBackendBuilder};
///
/// let backend = ReqwestBackendBuilder::new()
///     .connect_timeout(Duration::from_secs(5))
///     .build()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct ReqwestBackendBuilder {
    user_agent: String,
    connect_timeout: Option<Duration>,
    pool_idle_timeout: Option<Duration>,
}

impl Default for ReqwestBackendBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestBackendBuilder {
    /// Creates a builder with the default user agent.
    pub fn new() -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            connect_timeout: None,
            pool_idle_timeout: None,
        }
    }

    /// Sets the `User-Agent` header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Bounds the time spent establishing a connection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets how long idle pooled connections are kept.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl HttpBackendBuilder for ReqwestBackendBuilder {
    type Backend = ReqwestBackend;

    async fn build(self) -> CouchResult<Self::Backend> {
        let mut builder = Client::builder()
            .user_agent(self.user_agent)
            .tcp_nodelay(true);
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = self.pool_idle_timeout {
            builder = builder.pool_idle_timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|err| CouchError::Initialization(err.to_string()))?;
        Ok(ReqwestBackend::from_client(client))
    }
}
