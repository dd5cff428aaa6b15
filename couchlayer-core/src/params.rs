//! View query parameters and their query-string encoding.
//!
//! [`ViewParams`] holds the fixed set of options the store recognizes on its
//! view endpoint. Only options that are explicitly set reach the wire: zero,
//! `false` and empty values are treated as unset and omitted, so the store
//! applies its own defaults. Flags whose store default is `true`
//! (`inclusive_end`, `reduce`, `sorted`) are tri-state so an explicit `false`
//! can still be sent.
//!
//! # Example
//!
//! ```ignore
//! use couchlayer::params::ViewParams;
//! use serde_json::json;
//!
//! let params = ViewParams::builder()
//!     .start_key(json!("a"))
//!     .end_key(json!("b"))
//!     .limit(10)
//!     .include_docs(true)
//!     .build();
//!
//! assert_eq!(
//!     params.to_query_string(),
//!     "endkey=%22b%22&include_docs=true&limit=10&startkey=%22a%22"
//! );
//! ```

use serde_json::Value;
use url::form_urlencoded;

/// Whether stale index results are acceptable (`stale`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stale {
    /// Return the index as is, without updating it.
    Ok,
    /// Return the index as is and update it afterwards.
    UpdateAfter,
}

impl Stale {
    fn as_str(&self) -> &'static str {
        match self {
            Stale::Ok => "ok",
            Stale::UpdateAfter => "update_after",
        }
    }
}

/// When the index is updated relative to the query (`update`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    /// Update before responding.
    True,
    /// Do not update.
    False,
    /// Respond first, update afterwards.
    Lazy,
}

impl Update {
    fn as_str(&self) -> &'static str {
        match self {
            Update::True => "true",
            Update::False => "false",
            Update::Lazy => "lazy",
        }
    }
}

/// Options for a view query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewParams {
    /// Include conflict information for embedded documents.
    pub conflicts: bool,
    /// Return rows in descending key order.
    pub descending: bool,
    /// Stop at this key.
    pub end_key: Option<Value>,
    /// Stop at this document id within `end_key`.
    pub end_key_doc_id: Option<String>,
    /// Group reduced results by key.
    pub group: bool,
    /// Group reduced results by key prefix of this length.
    pub group_level: Option<u32>,
    /// Embed the emitting document in each row.
    pub include_docs: bool,
    /// Include attachment bodies in embedded documents.
    pub attachments: bool,
    /// Include encoding information for embedded attachments.
    pub att_encoding_info: bool,
    /// Whether `end_key` itself is included.
    pub inclusive_end: Option<bool>,
    /// Return only rows with this key.
    pub key: Option<Value>,
    /// Return only rows with these keys.
    pub keys: Vec<Value>,
    /// Maximum number of rows.
    pub limit: Option<u64>,
    /// Whether to apply the reduce function.
    pub reduce: Option<bool>,
    /// Number of rows to skip.
    pub skip: Option<u64>,
    /// Whether rows are sorted.
    pub sorted: Option<bool>,
    /// Answer from a stable set of shards.
    pub stable: bool,
    /// Stale index tolerance.
    pub stale: Option<Stale>,
    /// Start at this key.
    pub start_key: Option<Value>,
    /// Start at this document id within `start_key`.
    pub start_key_doc_id: Option<String>,
    /// Index update policy.
    pub update: Option<Update>,
    /// Include the update sequence in the response.
    pub update_seq: bool,
}

impl ViewParams {
    /// Creates a parameter set with every option unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder.
    pub fn builder() -> ViewParamsBuilder {
        ViewParamsBuilder::new()
    }

    /// Returns the options that are set, as wire names and encoded values, in
    /// alphabetical order of wire name.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();

        push_flag(&mut pairs, "att_encoding_info", self.att_encoding_info);
        push_flag(&mut pairs, "attachments", self.attachments);
        push_flag(&mut pairs, "conflicts", self.conflicts);
        push_flag(&mut pairs, "descending", self.descending);
        push_json(&mut pairs, "endkey", self.end_key.as_ref());
        push_text(&mut pairs, "endkey_docid", self.end_key_doc_id.as_deref());
        push_flag(&mut pairs, "group", self.group);
        push_number(&mut pairs, "group_level", self.group_level.map(u64::from));
        push_flag(&mut pairs, "include_docs", self.include_docs);
        push_tristate(&mut pairs, "inclusive_end", self.inclusive_end);
        push_json(&mut pairs, "key", self.key.as_ref());
        if !self.keys.is_empty() {
            pairs.push(("keys", Value::Array(self.keys.clone()).to_string()));
        }
        push_number(&mut pairs, "limit", self.limit);
        push_tristate(&mut pairs, "reduce", self.reduce);
        push_number(&mut pairs, "skip", self.skip);
        push_tristate(&mut pairs, "sorted", self.sorted);
        push_flag(&mut pairs, "stable", self.stable);
        if let Some(stale) = self.stale {
            pairs.push(("stale", stale.as_str().to_string()));
        }
        push_json(&mut pairs, "startkey", self.start_key.as_ref());
        push_text(&mut pairs, "startkey_docid", self.start_key_doc_id.as_deref());
        if let Some(update) = self.update {
            pairs.push(("update", update.as_str().to_string()));
        }
        push_flag(&mut pairs, "update_seq", self.update_seq);

        pairs
    }

    /// Encodes the options that are set as a URL query string.
    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.to_pairs())
            .finish()
    }
}

fn push_flag(pairs: &mut Vec<(&'static str, String)>, name: &'static str, value: bool) {
    if value {
        pairs.push((name, "true".to_string()));
    }
}

fn push_tristate(pairs: &mut Vec<(&'static str, String)>, name: &'static str, value: Option<bool>) {
    if let Some(value) = value {
        pairs.push((name, value.to_string()));
    }
}

fn push_number(pairs: &mut Vec<(&'static str, String)>, name: &'static str, value: Option<u64>) {
    if let Some(value) = value.filter(|value| *value != 0) {
        pairs.push((name, value.to_string()));
    }
}

fn push_text(pairs: &mut Vec<(&'static str, String)>, name: &'static str, value: Option<&str>) {
    if let Some(value) = value.filter(|value| !value.is_empty()) {
        pairs.push((name, value.to_string()));
    }
}

fn push_json(pairs: &mut Vec<(&'static str, String)>, name: &'static str, value: Option<&Value>) {
    match value {
        None | Some(Value::Null) => {}
        Some(Value::String(text)) if text.is_empty() => {}
        Some(value) => pairs.push((name, value.to_string())),
    }
}

/// Builder for [`ViewParams`].
#[derive(Debug, Clone, Default)]
pub struct ViewParamsBuilder {
    params: ViewParams,
}

impl ViewParamsBuilder {
    /// Creates a builder with every option unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `conflicts`.
    pub fn conflicts(mut self, conflicts: bool) -> Self {
        self.params.conflicts = conflicts;
        self
    }

    /// Sets `descending`.
    pub fn descending(mut self, descending: bool) -> Self {
        self.params.descending = descending;
        self
    }

    /// Sets `endkey`.
    pub fn end_key(mut self, key: impl Into<Value>) -> Self {
        self.params.end_key = Some(key.into());
        self
    }

    /// Sets `endkey_docid`.
    pub fn end_key_doc_id(mut self, id: impl Into<String>) -> Self {
        self.params.end_key_doc_id = Some(id.into());
        self
    }

    /// Sets `group`.
    pub fn group(mut self, group: bool) -> Self {
        self.params.group = group;
        self
    }

    /// Sets `group_level`.
    pub fn group_level(mut self, level: u32) -> Self {
        self.params.group_level = Some(level);
        self
    }

    /// Sets `include_docs`.
    pub fn include_docs(mut self, include_docs: bool) -> Self {
        self.params.include_docs = include_docs;
        self
    }

    /// Sets `attachments`.
    pub fn attachments(mut self, attachments: bool) -> Self {
        self.params.attachments = attachments;
        self
    }

    /// Sets `att_encoding_info`.
    pub fn att_encoding_info(mut self, info: bool) -> Self {
        self.params.att_encoding_info = info;
        self
    }

    /// Sets `inclusive_end`.
    pub fn inclusive_end(mut self, inclusive: bool) -> Self {
        self.params.inclusive_end = Some(inclusive);
        self
    }

    /// Sets `key`.
    pub fn key(mut self, key: impl Into<Value>) -> Self {
        self.params.key = Some(key.into());
        self
    }

    /// Sets `keys`.
    pub fn keys(mut self, keys: impl IntoIterator<Item = Value>) -> Self {
        self.params.keys = keys.into_iter().collect();
        self
    }

    /// Sets `limit`.
    pub fn limit(mut self, limit: u64) -> Self {
        self.params.limit = Some(limit);
        self
    }

    /// Sets `reduce`.
    pub fn reduce(mut self, reduce: bool) -> Self {
        self.params.reduce = Some(reduce);
        self
    }

    /// Sets `skip`.
    pub fn skip(mut self, skip: u64) -> Self {
        self.params.skip = Some(skip);
        self
    }

    /// Sets `sorted`.
    pub fn sorted(mut self, sorted: bool) -> Self {
        self.params.sorted = Some(sorted);
        self
    }

    /// Sets `stable`.
    pub fn stable(mut self, stable: bool) -> Self {
        self.params.stable = stable;
        self
    }

    /// Sets `stale`.
    pub fn stale(mut self, stale: Stale) -> Self {
        self.params.stale = Some(stale);
        self
    }

    /// Sets `startkey`.
    pub fn start_key(mut self, key: impl Into<Value>) -> Self {
        self.params.start_key = Some(key.into());
        self
    }

    /// Sets `startkey_docid`.
    pub fn start_key_doc_id(mut self, id: impl Into<String>) -> Self {
        self.params.start_key_doc_id = Some(id.into());
        self
    }

    /// Sets `update`.
    pub fn update(mut self, update: Update) -> Self {
        self.params.update = Some(update);
        self
    }

    /// Sets `update_seq`.
    pub fn update_seq(mut self, update_seq: bool) -> Self {
        self.params.update_seq = update_seq;
        self
    }

    /// Builds the parameter set.
    pub fn build(self) -> ViewParams {
        self.params
    }
}
