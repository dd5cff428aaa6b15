//! Error types and result types for document store client operations.
//!
//! Every fallible operation in this crate returns [`CouchResult<T>`]. Errors fall
//! into four families:
//!
//! - **validation** errors raised before any network call ([`CouchError::InvalidName`],
//!   [`CouchError::MissingIdentifier`], [`CouchError::Shape`], ...)
//! - **transport** errors raised once the retry budget is spent ([`CouchError::Transport`])
//!   or when the caller cancels ([`CouchError::Cancelled`])
//! - **protocol** errors for unexpected status codes ([`CouchError::Status`])
//! - **domain** errors callers are expected to branch on ([`CouchError::DatabaseNotFound`],
//!   [`CouchError::DocumentNotFound`])
//!
//! Higher layers wrap lower-layer failures with [`CouchError::Context`]. Use
//! [`CouchError::root`] to get at the underlying condition.

use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::{backend::BackendError, shape::ShapeError};

/// Represents all possible errors that can occur when talking to a document store.
#[derive(Error, Debug)]
pub enum CouchError {
    /// Serialization/deserialization error when converting to or from JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The database name does not satisfy the store's naming rule.
    #[error("Invalid database name: {0}")]
    InvalidName(String),
    /// A backend could not be constructed.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The service endpoint could not be parsed or has no usable scheme.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// A caller-supplied target type cannot hold the decoded value.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The document is missing its `_id` field.
    #[error("Missing _id field")]
    MissingIdentifier,
    /// The document is missing its `_rev` field.
    #[error("Missing _rev field")]
    MissingRevision,
    /// The value has a shape that cannot carry document identity.
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),
    /// A view result type does not satisfy the row contract.
    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),
    /// The requested database does not exist.
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),
    /// The requested document does not exist.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),
    /// The store answered with a status the operation does not accept.
    #[error("Unexpected status {status}: {body}")]
    Status {
        /// HTTP status code returned by the store.
        status: u16,
        /// Raw response body, decoded lossily as UTF-8.
        body: String,
    },
    /// Every attempt failed at the network level.
    #[error("Transport error after {attempts} attempt(s): {source}")]
    Transport {
        /// Number of attempts made before giving up.
        attempts: usize,
        /// The failure of the final attempt.
        #[source]
        source: BackendError,
    },
    /// The caller's cancellation signal fired or its deadline passed.
    #[error("Request cancelled")]
    Cancelled,
    /// A lower-level error wrapped with a description of the failed operation.
    #[error("{context}: {source}")]
    Context {
        /// What was being attempted.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<CouchError>,
    },
}

/// A specialized `Result` type for document store client operations.
pub type CouchResult<T> = Result<T, CouchError>;

impl CouchError {
    /// Builds a protocol error from a status code and raw response body.
    pub fn status(status: u16, body: &[u8]) -> Self {
        CouchError::Status {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }

    /// Wraps this error with a description of the operation that failed.
    pub fn context(self, context: impl Into<String>) -> Self {
        CouchError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping every [`CouchError::Context`] layer.
    pub fn root(&self) -> &CouchError {
        let mut current = self;
        while let CouchError::Context { source, .. } = current {
            current = source;
        }
        current
    }

    /// Returns `true` if the root cause is [`CouchError::DocumentNotFound`].
    pub fn is_document_not_found(&self) -> bool {
        matches!(self.root(), CouchError::DocumentNotFound(_))
    }

    /// Returns `true` if the root cause is [`CouchError::DatabaseNotFound`].
    pub fn is_database_not_found(&self) -> bool {
        matches!(self.root(), CouchError::DatabaseNotFound(_))
    }

    /// Returns the status code if the root cause is a protocol error.
    pub fn status_code(&self) -> Option<u16> {
        match self.root() {
            CouchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Extension trait for attaching operation context to results.
pub trait ResultExt<T> {
    /// Wraps the error, if any, with `context`.
    fn context(self, context: impl Into<String>) -> CouchResult<T>;
}

impl<T> ResultExt<T> for CouchResult<T> {
    fn context(self, context: impl Into<String>) -> CouchResult<T> {
        self.map_err(|err| err.context(context))
    }
}

impl From<SerdeJsonError> for CouchError {
    fn from(err: SerdeJsonError) -> Self {
        CouchError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for CouchError {
    fn from(err: url::ParseError) -> Self {
        CouchError::InvalidEndpoint(err.to_string())
    }
}
