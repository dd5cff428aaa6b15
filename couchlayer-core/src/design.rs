//! Design documents and view definitions.
//!
//! A design document is a regular document whose id starts with `_design/`. It
//! holds named views, each a map function and an optional reduce function, that
//! the store uses to build its indexes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::shape::Shaped;

/// Id prefix of design documents.
pub const DESIGN_PREFIX: &str = "_design/";

/// Language tag for design document functions.
pub const DEFAULT_LANGUAGE: &str = "javascript";

/// A single view: a map function and an optional reduce function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Shaped)]
pub struct ViewDefinition {
    /// Source of the map function.
    pub map: String,
    /// Source of the reduce function, or a built-in such as `_count`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
}

impl ViewDefinition {
    /// Creates a map-only view.
    pub fn map(map: impl Into<String>) -> Self {
        Self {
            map: map.into(),
            reduce: None,
        }
    }

    /// Adds a reduce function.
    pub fn with_reduce(mut self, reduce: impl Into<String>) -> Self {
        self.reduce = Some(reduce.into());
        self
    }
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_autoupdate() -> bool {
    true
}

/// A design document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Shaped)]
pub struct DesignDocument {
    /// The full id, `_design/{name}`.
    #[serde(rename = "_id")]
    pub id: String,
    /// The current revision, when the document already exists.
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// Language of the functions in this document.
    #[serde(default = "default_language")]
    pub language: String,
    /// View indexer options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, Value>,
    /// Change feed filter functions.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, String>,
    /// List functions (deprecated by the store, still accepted).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lists: BTreeMap<String, String>,
    /// Rewrite rules, either an array or a function source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrites: Option<Value>,
    /// Show functions (deprecated by the store, still accepted).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub shows: BTreeMap<String, String>,
    /// Update handler functions.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub updates: BTreeMap<String, String>,
    /// Validation function run on every write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate_doc_update: Option<String>,
    /// Named views.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub views: BTreeMap<String, ViewDefinition>,
    /// Whether the store refreshes the views automatically.
    #[serde(default = "default_autoupdate")]
    pub autoupdate: bool,
}

impl DesignDocument {
    /// Creates an empty design document named `name`, in the default language,
    /// with automatic updates enabled.
    pub fn new(name: &str) -> Self {
        Self {
            id: design_id(name),
            rev: None,
            language: default_language(),
            options: BTreeMap::new(),
            filters: BTreeMap::new(),
            lists: BTreeMap::new(),
            rewrites: None,
            shows: BTreeMap::new(),
            updates: BTreeMap::new(),
            validate_doc_update: None,
            views: BTreeMap::new(),
            autoupdate: default_autoupdate(),
        }
    }

    /// Returns the name without the `_design/` prefix.
    pub fn name(&self) -> &str {
        self.id.strip_prefix(DESIGN_PREFIX).unwrap_or(&self.id)
    }

    /// Adds a view.
    pub fn with_view(mut self, name: impl Into<String>, view: ViewDefinition) -> Self {
        self.views.insert(name.into(), view);
        self
    }

    /// Replaces all views.
    pub fn with_views(mut self, views: BTreeMap<String, ViewDefinition>) -> Self {
        self.views = views;
        self
    }
}

/// Returns the full id of the design document named `name`.
pub fn design_id(name: &str) -> String {
    if name.starts_with(DESIGN_PREFIX) {
        name.to_string()
    } else {
        format!("{DESIGN_PREFIX}{name}")
    }
}
