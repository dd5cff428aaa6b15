//! The entry point: a handle on a document store server.
//!
//! A [`CouchService`] owns the [`Transport`] and the [`StatusTable`] and hands out
//! [`Database`] handles that share both.
//!
//! # Example
//!
//! ```ignore
//! use couchlayer::prelude::*;
//!
//! let service = CouchService::builder("http://localhost:5984")
//!     .credentials("admin", "secret")
//!     .max_attempts(3)
//!     .build_with(ReqwestBackendBuilder::new())
//!     .await?;
//!
//! service.ping().await?;
//! let people = service.get_db("people", true).await?;
//! ```

use std::{sync::Arc, time::Duration};
use tracing::{debug, info, instrument};

use crate::{
    backend::{HttpBackend, HttpBackendBuilder, Method},
    database::Database,
    endpoint::{RequestPath, parse_endpoint, redacted, with_credentials},
    error::{CouchError, CouchResult, ResultExt},
    status::StatusTable,
    transport::{Cancellation, Transport, TransportConfig},
};

/// Returns `true` if `name` satisfies the store's database naming rule,
/// `^[a-z][a-z0-9_$()+/-]*$`.
pub fn is_valid_db_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => chars.all(|c| {
            c.is_ascii_lowercase()
                || c.is_ascii_digit()
                || matches!(c, '_' | '$' | '(' | ')' | '+' | '/' | '-')
        }),
        _ => false,
    }
}

/// A handle on a document store server.
///
/// Cloning is cheap; clones share the backend and the status table.
#[derive(Debug, Clone)]
pub struct CouchService {
    transport: Arc<Transport>,
    statuses: Arc<StatusTable>,
}

impl CouchService {
    /// Creates a service with the default transport policy and status table.
    ///
    /// # Errors
    ///
    /// Returns [`CouchError::InvalidEndpoint`] if `endpoint` is not an absolute
    /// `http` or `https` URL.
    pub fn new(endpoint: &str, backend: impl HttpBackend + 'static) -> CouchResult<Self> {
        Self::builder(endpoint).build(backend)
    }

    /// Starts building a service for `endpoint`.
    pub fn builder(endpoint: impl Into<String>) -> CouchServiceBuilder {
        CouchServiceBuilder::new(endpoint)
    }

    /// Returns the endpoint with any credentials removed.
    pub fn endpoint(&self) -> String {
        redacted(self.transport.base())
    }

    /// Returns the transport shared by this service's database handles.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Returns a copy of this service whose requests observe `cancellation`.
    ///
    /// Database handles obtained from the copy inherit the cancellation.
    pub fn with_cancellation(&self, cancellation: Cancellation) -> Self {
        Self {
            transport: Arc::new(self.transport.with_cancellation(cancellation)),
            statuses: self.statuses.clone(),
        }
    }

    /// Checks that the server is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`CouchError::Status`] for any non-2xx response and
    /// [`CouchError::Transport`] if the server cannot be reached.
    #[instrument(skip(self), fields(endpoint = %self.endpoint()))]
    pub async fn ping(&self) -> CouchResult<()> {
        let response = self.transport.send(Method::Head, &RequestPath::root()).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(CouchError::status(response.status, &response.body))
        }
    }

    /// Opens the database `name`, creating it first when `create_if_missing` is set.
    ///
    /// # Errors
    ///
    /// - [`CouchError::DatabaseNotFound`] if the database does not exist and
    ///   `create_if_missing` is `false`
    /// - [`CouchError::InvalidName`] if the database must be created and `name`
    ///   breaks the naming rule; nothing is sent in that case
    /// - [`CouchError::Status`] for any other unexpected response
    #[instrument(skip(self))]
    pub async fn get_db(&self, name: &str, create_if_missing: bool) -> CouchResult<Database> {
        match self.probe(name).await? {
            Some(db) => Ok(db),
            None if !create_if_missing => Err(CouchError::DatabaseNotFound(name.to_string())),
            None => {
                self.create_db(name).await?;
                self.probe(name)
                    .await
                    .and_then(|db| db.ok_or_else(|| CouchError::DatabaseNotFound(name.to_string())))
                    .context(format!("error opening created database {name}"))
            }
        }
    }

    /// Creates the database `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CouchError::InvalidName`] without sending anything if `name`
    /// breaks the naming rule, and a wrapped error if the store refuses.
    #[instrument(skip(self))]
    pub async fn create_db(&self, name: &str) -> CouchResult<()> {
        if !is_valid_db_name(name) {
            return Err(CouchError::InvalidName(name.to_string()));
        }

        let response = self
            .transport
            .send(Method::Put, &RequestPath::database(name))
            .await
            .context(format!("error creating database {name}"))?;

        match response.status {
            201 | 202 => {
                info!(database = name, "created database");
                Ok(())
            }
            status => Err(CouchError::status(status, &response.body)
                .context(format!("error creating database {name}"))),
        }
    }

    /// Probes for `name`, returning a handle if it exists and `None` on 404.
    async fn probe(&self, name: &str) -> CouchResult<Option<Database>> {
        let response = self
            .transport
            .send(Method::Head, &RequestPath::database(name))
            .await?;

        debug!(database = name, status = response.status, "probed database");
        match response.status {
            200 => Ok(Some(Database::new(
                name,
                self.transport.clone(),
                self.statuses.clone(),
            ))),
            404 => Ok(None),
            status => Err(CouchError::status(status, &response.body)),
        }
    }
}

/// Builder for [`CouchService`].
#[derive(Debug, Clone)]
pub struct CouchServiceBuilder {
    endpoint: String,
    credentials: Option<(String, String)>,
    config: TransportConfig,
    statuses: StatusTable,
}

impl CouchServiceBuilder {
    /// Creates a builder for `endpoint` with default settings.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials: None,
            config: TransportConfig::default(),
            statuses: StatusTable::default(),
        }
    }

    /// Authenticates every request with basic auth.
    ///
    /// Ignored unless both parts are non-empty.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Replaces the whole transport policy.
    pub fn config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the maximum number of attempts per request.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.config = self.config.with_max_attempts(max_attempts);
        self
    }

    /// Sets the delay between attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config = self.config.with_retry_delay(delay);
        self
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_timeout(timeout);
        self
    }

    /// Replaces the status-to-error table.
    pub fn status_table(mut self, statuses: StatusTable) -> Self {
        self.statuses = statuses;
        self
    }

    /// Builds the service on top of `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`CouchError::InvalidEndpoint`] if the endpoint cannot be parsed
    /// or cannot carry credentials.
    pub fn build(self, backend: impl HttpBackend + 'static) -> CouchResult<CouchService> {
        let mut base = parse_endpoint(&self.endpoint)?;
        if let Some((username, password)) = &self.credentials {
            base = with_credentials(base, username, password)?;
        }

        debug!(endpoint = %redacted(&base), "building service");
        Ok(CouchService {
            transport: Arc::new(Transport::new(base, Arc::new(backend), self.config)),
            statuses: Arc::new(self.statuses),
        })
    }

    /// Builds the backend with `builder`, then the service on top of it.
    pub async fn build_with<B>(self, builder: B) -> CouchResult<CouchService>
    where
        B: HttpBackendBuilder,
    {
        let backend = builder.build().await?;
        self.build(backend)
    }
}
