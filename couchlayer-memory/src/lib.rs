//! In-memory document store backend for couchlayer.
//!
//! This crate provides [`InMemoryCouch`], an [`HttpBackend`](couchlayer_core::backend::HttpBackend)
//! that answers the store's HTTP protocol from process-local state. It is meant
//! for tests and local development: the full client stack, transport included,
//! runs against it unchanged.
//!
//! # Features
//!
//! - **Databases** - Creation with the server's naming rule, probes, deletion
//! - **Documents** - Store-assigned ids, revision tracking, conflicts and tombstones
//! - **Views** - Map functions registered as Rust closures, key ranges, paging,
//!   embedded documents, and `_count`/`_sum`/custom reduces with grouping
//! - **Inspection** - A log of every request and injectable failures
//!
//! # Quick Start
//!
//! ```ignore
//! use couchlayer::{prelude::*, memory::InMemoryCouch};
//!
//! #[tokio::main]
//! async fn main() -> CouchResult<()> {
//!     let couch = InMemoryCouch::builder().build().await?;
//!     let service = CouchService::new("http://localhost:5984", couch.clone())?;
//!
//!     let people = service.get_db("people", true).await?;
//!     people.create_doc(&serde_json::json!({"name": "Alice"})).await?;
//!
//!     assert_eq!(couch.requests().await.len(), 4);
//!     Ok(())
//! }
//! ```

pub mod collate;
pub mod failure;
pub mod store;
pub mod view;

pub use failure::StoreFailure;
pub use store::{InMemoryCouch, InMemoryCouchBuilder, RecordedRequest};
pub use view::{Emitter, MapFunction, ReduceFunction};
