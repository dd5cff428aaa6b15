//! Convenient re-exports of commonly used types from couchlayer.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use couchlayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - The service and database handles
//! - Document, design document and view types
//! - View query parameters
//! - The `Shaped` trait and derive
//! - Backend traits, transport configuration and cancellation
//! - Error types

pub use couchlayer_core::{
    backend::{HttpBackend, HttpBackendBuilder},
    database::Database,
    design::{DesignDocument, ViewDefinition},
    document::{Document, DocumentResponse},
    error::{CouchError, CouchResult, ResultExt},
    params::{Stale, Update, ViewParams, ViewParamsBuilder},
    service::{CouchService, CouchServiceBuilder},
    shape::Shaped,
    status::StatusTable,
    transport::{CancelHandle, Cancellation, TransportConfig},
    view::{ViewResponse, ViewRow},
};
