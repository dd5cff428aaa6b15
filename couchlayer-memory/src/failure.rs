//! Error responses produced by the in-memory store.
//!
//! Every failure renders as the store's usual `{"error": ..., "reason": ...}`
//! body with the matching status code.

use serde_json::json;
use thiserror::Error;

use couchlayer_core::backend::HttpResponse;

/// A request the in-memory store refuses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreFailure {
    /// The addressed database does not exist.
    #[error("Database does not exist.")]
    DatabaseMissing,
    /// The database to create already exists.
    #[error("The database could not be created, the file already exists.")]
    DatabaseExists,
    /// The database name breaks the naming rule.
    #[error(
        "Name: '{0}'. Only lowercase characters (a-z), digits (0-9), and any of the characters _, $, (, ), +, -, and / are allowed. Must begin with a letter."
    )]
    IllegalDatabaseName(String),
    /// The addressed document never existed.
    #[error("missing")]
    DocumentMissing,
    /// The addressed document has been deleted.
    #[error("deleted")]
    DocumentDeleted,
    /// The design document has no view with this name.
    #[error("missing_named_view")]
    ViewMissing,
    /// The supplied revision is not the current one.
    #[error("Document update conflict.")]
    Conflict,
    /// The request body or query string is malformed.
    #[error("{0}")]
    BadRequest(String),
    /// The view query combines options that cannot be used together.
    #[error("{0}")]
    QueryParse(String),
    /// A view function has no registered implementation.
    #[error("no implementation registered for {0}")]
    Compilation(String),
    /// The route does not accept this method.
    #[error("Only {0} allowed")]
    MethodNotAllowed(&'static str),
    /// No route matches the path.
    #[error("unknown path")]
    UnknownPath,
    /// A failure queued with [`InMemoryCouch::inject_failure`](crate::InMemoryCouch::inject_failure).
    #[error("injected failure")]
    Injected(u16),
}

impl StoreFailure {
    /// Returns the status code of this failure.
    pub fn status(&self) -> u16 {
        match self {
            StoreFailure::BadRequest(_)
            | StoreFailure::QueryParse(_)
            | StoreFailure::Compilation(_)
            | StoreFailure::IllegalDatabaseName(_) => 400,
            StoreFailure::DatabaseMissing
            | StoreFailure::DocumentMissing
            | StoreFailure::DocumentDeleted
            | StoreFailure::ViewMissing
            | StoreFailure::UnknownPath => 404,
            StoreFailure::MethodNotAllowed(_) => 405,
            StoreFailure::Conflict => 409,
            StoreFailure::DatabaseExists => 412,
            StoreFailure::Injected(status) => *status,
        }
    }

    /// Returns the short error tag of this failure.
    pub fn error(&self) -> &'static str {
        match self {
            StoreFailure::BadRequest(_) => "bad_request",
            StoreFailure::QueryParse(_) => "query_parse_error",
            StoreFailure::Compilation(_) => "compilation_error",
            StoreFailure::IllegalDatabaseName(_) => "illegal_database_name",
            StoreFailure::DatabaseMissing
            | StoreFailure::DocumentMissing
            | StoreFailure::DocumentDeleted
            | StoreFailure::ViewMissing
            | StoreFailure::UnknownPath => "not_found",
            StoreFailure::MethodNotAllowed(_) => "method_not_allowed",
            StoreFailure::Conflict => "conflict",
            StoreFailure::DatabaseExists => "file_exists",
            StoreFailure::Injected(_) => "injected",
        }
    }

    /// Renders this failure as a response.
    pub fn into_response(self) -> HttpResponse {
        let body = json!({ "error": self.error(), "reason": self.to_string() });
        HttpResponse::new(self.status(), body.to_string())
    }
}
