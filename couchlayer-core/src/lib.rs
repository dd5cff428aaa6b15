//! A thin client layer over the HTTP API of CouchDB-style document stores.
//!
//! This crate is the core of the couchlayer project and provides:
//!
//! - **HTTP backend abstraction** ([`backend`]) - The trait network backends implement
//! - **Resilient transport** ([`transport`]) - Bounded retries, per-attempt timeouts and cancellation
//! - **Service handle** ([`service`]) - Connectivity checks and database discovery/creation
//! - **Database handle** ([`database`]) - Document CRUD, design documents and view queries
//! - **Documents** ([`document`], [`design`]) - Wire types for documents and design documents
//! - **Views** ([`view`], [`params`]) - View response envelopes and query parameters
//! - **Shape validation** ([`shape`]) - Structural checks on caller-supplied types
//! - **Error handling** ([`error`], [`status`]) - Error types and the status-to-error table
//!
//! # Example
//!
//! ```ignore
//! use couchlayer::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Shaped)]
//! pub struct Person {
//!     #[serde(flatten)]
//!     pub document: Document,
//!     pub name: String,
//! }
//!
//! let service = CouchService::new("http://localhost:5984", backend)?;
//! let people = service.get_db("people", true).await?;
//! let created = people.create_doc(&Person { document: Document::default(), name: "Ann".into() }).await?;
//! let person: Person = people.get_doc(&created.id).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as couchlayer;

pub mod backend;
pub mod database;
pub mod design;
pub mod document;
pub mod endpoint;
pub mod error;
pub mod params;
pub mod service;
pub mod shape;
pub mod status;
pub mod transport;
pub mod view;

#[cfg(test)]
mod testing;
