//! Main couchlayer crate providing a thin client for CouchDB-style document stores.
//!
//! This crate is the primary entry point for users of couchlayer. It re-exports
//! the core types from the sub-crates and gives access to the available HTTP
//! backends.
//!
//! # Features
//!
//! - **Resilient transport** - Bounded retries on server errors and network failures,
//!   per-attempt timeouts, and caller cancellation
//! - **Typed documents** - Read and write your own Serde types; identity fields are
//!   checked before anything is sent
//! - **Design documents and views** - Upsert design documents and query views into
//!   result types validated against the row contract
//! - **Pluggable backends** - `reqwest` for real servers, an in-memory store for tests
//!
//! # Quick Start
//!
//! ```ignore
//! use couchlayer::{prelude::*, memory::InMemoryCouch};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Shaped)]
//! pub struct User {
//!     #[serde(flatten)]
//!     pub document: Document,
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> CouchResult<()> {
//!     let service = CouchService::new("http://localhost:5984", InMemoryCouch::new())?;
//!     let users = service.get_db("users", true).await?;
//!
//!     let created = users
//!         .create_doc(&User { document: Document::default(), name: "Alice".into() })
//!         .await?;
//!
//!     let mut user: User = users.get_doc(&created.id).await?;
//!     user.name = "Alicia".into();
//!     users.update_doc(&created.id, &user).await?;
//!
//!     users.delete_doc(&created.id).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Views
//!
//! Views are defined in design documents and queried into any type whose rows
//! expose `id` and `key`. [`view::ViewResponse`] and [`view::ViewRow`] cover the
//! common case; custom row types derive [`Shaped`](shape::Shaped) so their
//! structure can be checked before the request is sent.
//!
//! ```ignore
//! use couchlayer::prelude::*;
//! use std::collections::BTreeMap;
//!
//! users
//!     .create_design_doc(
//!         "users",
//!         BTreeMap::from([(
//!             "by_name".to_string(),
//!             ViewDefinition::map("function(doc) { emit(doc.name, null); }"),
//!         )]),
//!     )
//!     .await?;
//!
//! let page: ViewResponse<ViewRow<User>> = users
//!     .view(
//!         "users",
//!         "by_name",
//!         &ViewParams::builder().include_docs(true).limit(20).build(),
//!     )
//!     .await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-process emulation of the store for development and testing
//! - [`reqwest`] - Real HTTP backend (requires the default `reqwest` feature)

pub mod prelude;

pub use couchlayer_core::{
    backend, database, design, document, endpoint, error, params, service, shape, status,
    transport, view,
};

// Re-exported for `json!` and `Value` in documents and view keys
pub use serde_json;

/// In-memory storage backend implementations.
pub mod memory {
    pub use couchlayer_memory::{
        Emitter, InMemoryCouch, InMemoryCouchBuilder, MapFunction, RecordedRequest,
        ReduceFunction, StoreFailure,
    };
}

/// `reqwest` HTTP backend implementations.
///
/// This module is only available when the `reqwest` feature is enabled.
#[cfg(feature = "reqwest")]
pub mod reqwest {
    pub use couchlayer_reqwest::{ReqwestBackend, ReqwestBackendBuilder};
}
