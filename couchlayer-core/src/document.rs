//! Core types for document identity and write acknowledgements.
//!
//! Every document in the store carries two reserved fields: `_id`, its stable
//! identifier, and `_rev`, an opaque revision token that changes on every
//! successful write. Updates and deletes must present the current `_rev`; the
//! store rejects anything else with a conflict, and the client surfaces that
//! rejection unchanged.
//!
//! Embed [`Document`] in your own types to carry both fields:
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
//!     pub age: u32,
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::shape::Shaped;

/// The reserved identity fields of a stored document.
///
/// Both fields are omitted from the wire when unset, so a fresh document can be
/// created without an id and the store assigns one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Shaped)]
pub struct Document {
    /// The document identifier.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The current revision token.
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
}

impl Document {
    /// Creates identity fields for a document that does not exist yet.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            rev: None,
        }
    }

    /// Creates identity fields for an existing revision.
    pub fn with_rev(id: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            rev: Some(rev.into()),
        }
    }

    /// Returns the identifier, if set.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns the revision token, if set.
    pub fn rev(&self) -> Option<&str> {
        self.rev.as_deref()
    }

    /// Records the revision returned by a successful write.
    pub fn apply(&mut self, response: &DocumentResponse) {
        self.id = Some(response.id.clone());
        self.rev = Some(response.rev.clone());
    }
}

/// The store's acknowledgement of a document write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentResponse {
    /// The identifier of the written document.
    pub id: String,
    /// Whether the write succeeded.
    #[serde(default)]
    pub ok: bool,
    /// The revision created by the write.
    pub rev: String,
}
