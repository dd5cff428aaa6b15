//! Network backend for couchlayer built on `reqwest`.
//!
//! This crate provides [`ReqwestBackend`], an implementation of the `HttpBackend`
//! trait that sends real requests over HTTP or HTTPS (rustls). It performs one
//! round trip per call; retries, timeouts per attempt and cancellation are
//! handled by the transport above it.
//!
//! It is enabled by the default `reqwest` feature of the `couchlayer` crate:
//!
//! ```toml
//! [dependencies]
//! couchlayer = { version = "x.y.z" }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use couchlayer::{prelude::*, reqwest::ReqwestBackendBuilder};
//!
//! #[tokio::main]
//! async fn main() -> CouchResult<()> {
//!     let service = CouchService::builder("http://localhost:5984")
//!         .credentials("admin", "secret")
//!         .build_with(ReqwestBackendBuilder::new().user_agent("my-app"))
//!         .await?;
//!
//!     service.ping().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;

pub use backend::{ReqwestBackend, ReqwestBackendBuilder};
