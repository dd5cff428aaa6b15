//! Mapping from response status codes to named error conditions.
//!
//! A [`StatusTable`] is built once, when the service is constructed, and shared
//! read-only by every database handle. The default table maps the store's
//! not-found family (400 and 404) to [`StatusCondition::DocumentNotFound`].

use std::collections::BTreeMap;

use crate::error::CouchError;

/// A named condition a status code can stand for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCondition {
    /// The addressed document does not exist.
    DocumentNotFound,
}

impl StatusCondition {
    /// Builds the error for this condition on the document `id`.
    pub fn into_error(self, id: &str) -> CouchError {
        match self {
            StatusCondition::DocumentNotFound => CouchError::DocumentNotFound(id.to_string()),
        }
    }
}

/// An immutable status-to-condition lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTable {
    entries: BTreeMap<u16, StatusCondition>,
}

impl StatusTable {
    /// Creates a table with no entries.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Returns a copy of this table with `status` mapped to `condition`.
    pub fn with(mut self, status: u16, condition: StatusCondition) -> Self {
        self.entries.insert(status, condition);
        self
    }

    /// Looks up the condition for `status`.
    pub fn lookup(&self, status: u16) -> Option<StatusCondition> {
        self.entries.get(&status).copied()
    }

    /// Returns the error for `status` on the document `id`, if the status is mapped.
    pub fn error_for(&self, status: u16, id: &str) -> Option<CouchError> {
        self.lookup(status).map(|condition| condition.into_error(id))
    }
}

impl Default for StatusTable {
    fn default() -> Self {
        Self::empty()
            .with(400, StatusCondition::DocumentNotFound)
            .with(404, StatusCondition::DocumentNotFound)
    }
}
