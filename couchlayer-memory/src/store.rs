//! In-memory emulation of the store's HTTP surface.
//!
//! [`InMemoryCouch`] implements [`HttpBackend`] by routing each request to a
//! handler over process-local state instead of the network. It keeps databases,
//! documents with revision tracking, tombstones for deleted documents, design
//! documents, and a log of every request it has seen.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value, json};
use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
    sync::Arc,
};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use couchlayer_core::{
    backend::{BackendError, HttpBackend, HttpBackendBuilder, HttpRequest, HttpResponse, Method},
    error::CouchResult,
    service::is_valid_db_name,
};

use crate::{
    failure::StoreFailure,
    view::{Emitter, MapFunction, ReduceFunction, Reducer, ViewQuery, ViewSource, run_view},
};

type Outcome = Result<HttpResponse, StoreFailure>;

/// A request as seen by the in-memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// The HTTP verb.
    pub method: Method,
    /// The decoded path segments.
    pub segments: Vec<String>,
    /// The raw query string.
    pub query: Option<String>,
}

impl RecordedRequest {
    /// Returns the decoded path, such as `/people/_design/people`.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

#[derive(Debug, Clone)]
struct StoredDocument {
    rev: String,
    body: Map<String, Value>,
    deleted: bool,
}

impl StoredDocument {
    fn generation(&self) -> u64 {
        self.rev
            .split_once('-')
            .and_then(|(generation, _)| generation.parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct DatabaseState {
    documents: BTreeMap<String, StoredDocument>,
    update_seq: u64,
}

impl DatabaseState {
    fn live(&self, id: &str) -> Result<&StoredDocument, StoreFailure> {
        match self.documents.get(id) {
            Some(document) if document.deleted => Err(StoreFailure::DocumentDeleted),
            Some(document) => Ok(document),
            None => Err(StoreFailure::DocumentMissing),
        }
    }

    fn write(&mut self, id: &str, mut body: Map<String, Value>) -> Outcome {
        let supplied = body.get("_rev").and_then(Value::as_str).map(str::to_string);
        let generation = match self.documents.get(id) {
            Some(current) if !current.deleted => {
                if supplied.as_deref() != Some(current.rev.as_str()) {
                    return Err(StoreFailure::Conflict);
                }
                current.generation()
            }
            Some(tombstone) => {
                if supplied.is_some() && supplied.as_deref() != Some(tombstone.rev.as_str()) {
                    return Err(StoreFailure::Conflict);
                }
                tombstone.generation()
            }
            None if supplied.is_some() => return Err(StoreFailure::Conflict),
            None => 0,
        };

        let rev = new_rev(generation + 1);
        body.insert("_id".into(), json!(id));
        body.insert("_rev".into(), json!(rev));
        self.update_seq += 1;
        self.documents.insert(
            id.to_string(),
            StoredDocument {
                rev: rev.clone(),
                body,
                deleted: false,
            },
        );

        Ok(json_response(201, json!({ "ok": true, "id": id, "rev": rev })))
    }

    fn delete(&mut self, id: &str, rev: Option<&str>) -> Outcome {
        let current = self.live(id)?;
        if rev != Some(current.rev.as_str()) {
            return Err(StoreFailure::Conflict);
        }

        let rev = new_rev(current.generation() + 1);
        let mut body = Map::new();
        body.insert("_id".into(), json!(id));
        body.insert("_rev".into(), json!(rev));
        body.insert("_deleted".into(), json!(true));
        self.update_seq += 1;
        self.documents.insert(
            id.to_string(),
            StoredDocument {
                rev: rev.clone(),
                body,
                deleted: true,
            },
        );

        Ok(json_response(200, json!({ "ok": true, "id": id, "rev": rev })))
    }
}

#[derive(Debug, Default)]
struct State {
    databases: BTreeMap<String, DatabaseState>,
    requests: Vec<RecordedRequest>,
    injected: VecDeque<u16>,
}

#[derive(Default, Clone)]
struct FunctionRegistry {
    maps: BTreeMap<String, MapFunction>,
    reduces: BTreeMap<String, ReduceFunction>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("maps", &self.maps.keys().collect::<Vec<_>>())
            .field("reduces", &self.reduces.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FunctionRegistry {
    fn map(&self, source: &str) -> Result<&MapFunction, StoreFailure> {
        self.maps
            .get(source.trim())
            .ok_or_else(|| StoreFailure::Compilation(format!("map function {source}")))
    }

    fn reducer(&self, source: &str) -> Result<Reducer, StoreFailure> {
        match source.trim() {
            "_count" => Ok(Reducer::Count),
            "_sum" => Ok(Reducer::Sum),
            other => self
                .reduces
                .get(other)
                .cloned()
                .map(Reducer::Custom)
                .ok_or_else(|| StoreFailure::Compilation(format!("reduce function {source}"))),
        }
    }
}

/// Thread-safe in-memory document store speaking the store's HTTP protocol.
///
/// Clones share the same state, so a test can keep one clone for inspection
/// and hand another to the service.
///
/// The store expects to be addressed at the root of its endpoint, such as
/// `http://localhost:5984/`.
///
/// # Example
///
/// ```ignore
/// use couchlayer::{prelude::*, memory::InMemoryCouch};
///
/// let couch = InMemoryCouch::builder()
///     .map_function("function(doc) { emit(doc.name, null); }", |doc, emitter| {
///         emitter.emit(doc["name"].clone(), Value::Null);
///     })
///     .build()
///     .await?;
///
/// let service = CouchService::new("http://localhost:5984", couch.clone())?;
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryCouch {
    state: Arc<RwLock<State>>,
    functions: Arc<FunctionRegistry>,
}

impl Default for InMemoryCouch {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCouch {
    /// Creates an empty store with no registered view functions.
    pub fn new() -> Self {
        Self::with_functions(FunctionRegistry::default())
    }

    /// Creates a builder for registering view functions and seeding databases.
    pub fn builder() -> InMemoryCouchBuilder {
        InMemoryCouchBuilder::default()
    }

    fn with_functions(functions: FunctionRegistry) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            functions: Arc::new(functions),
        }
    }

    /// Returns every request received so far, oldest first.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.state.read().await.requests.clone()
    }

    /// Forgets the recorded requests.
    pub async fn clear_requests(&self) {
        self.state.write().await.requests.clear();
    }

    /// Makes the next request fail with `status`, before it is routed.
    ///
    /// Queued failures are consumed in order, one per request.
    pub async fn inject_failure(&self, status: u16) {
        self.state.write().await.injected.push_back(status);
    }

    /// Returns the names of the existing databases.
    pub async fn database_names(&self) -> Vec<String> {
        self.state.read().await.databases.keys().cloned().collect()
    }

    fn route(&self, state: &mut State, method: Method, segments: &[String], url: &Url, body: Option<&[u8]>) -> Outcome {
        let parts: Vec<&str> = segments.iter().map(String::as_str).collect();

        match parts.as_slice() {
            [] => match method {
                Method::Head | Method::Get => {
                    Ok(json_response(200, json!({ "couchdb": "Welcome", "vendor": { "name": "couchlayer-memory" } })))
                }
                _ => Err(StoreFailure::MethodNotAllowed("GET,HEAD")),
            },
            [db] => self.database(state, method, db, body),
            [db, "_design", design, "_view", view] => self.view(state, method, db, design, view, url),
            [db, namespace @ ("_design" | "_local"), name] => {
                let id = format!("{namespace}/{name}");
                self.document(state, method, db, &id, url, body)
            }
            [db, id] => self.document(state, method, db, id, url, body),
            _ => Err(StoreFailure::UnknownPath),
        }
    }

    fn database(&self, state: &mut State, method: Method, name: &str, body: Option<&[u8]>) -> Outcome {
        match method {
            Method::Head | Method::Get => {
                let db = state.databases.get(name).ok_or(StoreFailure::DatabaseMissing)?;
                let doc_count = db.documents.values().filter(|document| !document.deleted).count();
                Ok(json_response(
                    200,
                    json!({
                        "db_name": name,
                        "doc_count": doc_count,
                        "doc_del_count": db.documents.len() - doc_count,
                        "update_seq": db.update_seq,
                    }),
                ))
            }
            Method::Put => {
                if !is_valid_db_name(name) {
                    return Err(StoreFailure::IllegalDatabaseName(name.to_string()));
                }
                if state.databases.contains_key(name) {
                    return Err(StoreFailure::DatabaseExists);
                }
                state.databases.insert(name.to_string(), DatabaseState::default());
                debug!(database = name, "created database");
                Ok(json_response(201, json!({ "ok": true })))
            }
            Method::Delete => {
                state.databases.remove(name).ok_or(StoreFailure::DatabaseMissing)?;
                Ok(json_response(200, json!({ "ok": true })))
            }
            Method::Post => {
                let db = state.databases.get_mut(name).ok_or(StoreFailure::DatabaseMissing)?;
                let document = parse_document(body)?;
                let id = match document.get("_id") {
                    Some(Value::String(id)) if !id.is_empty() => id.clone(),
                    Some(_) => {
                        return Err(StoreFailure::BadRequest("Document id must be a string".into()));
                    }
                    None => Uuid::new_v4().simple().to_string(),
                };
                db.write(&id, document)
            }
        }
    }

    fn document(
        &self,
        state: &mut State,
        method: Method,
        db: &str,
        id: &str,
        url: &Url,
        body: Option<&[u8]>,
    ) -> Outcome {
        let db = state.databases.get_mut(db).ok_or(StoreFailure::DatabaseMissing)?;

        match method {
            Method::Head | Method::Get => {
                let document = db.live(id)?;
                Ok(json_response(200, Value::Object(document.body.clone())))
            }
            Method::Put => {
                let document = parse_document(body)?;
                if let Some(Value::String(body_id)) = document.get("_id") {
                    if body_id != id {
                        return Err(StoreFailure::BadRequest(
                            "Document id in body does not match the path".into(),
                        ));
                    }
                }
                db.write(id, document)
            }
            Method::Delete => {
                let rev = url
                    .query_pairs()
                    .find(|(name, _)| name == "rev")
                    .map(|(_, rev)| rev.into_owned());
                db.delete(id, rev.as_deref())
            }
            Method::Post => Err(StoreFailure::MethodNotAllowed("DELETE,GET,HEAD,PUT")),
        }
    }

    fn view(&self, state: &mut State, method: Method, db: &str, design: &str, view: &str, url: &Url) -> Outcome {
        if !matches!(method, Method::Get | Method::Head) {
            return Err(StoreFailure::MethodNotAllowed("GET,HEAD"));
        }

        let db = state.databases.get(db).ok_or(StoreFailure::DatabaseMissing)?;
        let design = db.live(&format!("_design/{design}"))?;
        let definition = design
            .body
            .get("views")
            .and_then(|views| views.get(view))
            .ok_or(StoreFailure::ViewMissing)?;

        let map = definition
            .get("map")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreFailure::Compilation(format!("view {view} has no map function")))?;
        let map = self.functions.map(map)?;
        let reducer = definition
            .get("reduce")
            .and_then(Value::as_str)
            .map(|source| self.functions.reducer(source))
            .transpose()?;

        let query = ViewQuery::from_url(url)?;
        let source = ViewSource {
            documents: db
                .documents
                .iter()
                .filter(|(id, document)| !document.deleted && !id.starts_with("_design/") && !id.starts_with("_local/"))
                .map(|(id, document)| (id.as_str(), &document.body))
                .collect(),
            update_seq: db.update_seq,
        };

        run_view(&source, map, reducer.as_ref(), &query).map(|body| json_response(200, body))
    }
}

#[async_trait]
impl HttpBackend for InMemoryCouch {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, BackendError> {
        let segments = decode_segments(&request.url)?;
        let mut state = self.state.write().await;

        state.requests.push(RecordedRequest {
            method: request.method,
            segments: segments.clone(),
            query: request.url.query().map(str::to_string),
        });

        let outcome = match state.injected.pop_front() {
            Some(status) => Err(StoreFailure::Injected(status)),
            None => self.route(
                &mut state,
                request.method,
                &segments,
                &request.url,
                request.body.as_deref(),
            ),
        };
        let response = outcome.unwrap_or_else(StoreFailure::into_response);
        debug!(method = %request.method, path = request.url.path(), status = response.status, "handled request");

        Ok(match request.method {
            Method::Head => HttpResponse::new(response.status, Vec::new()),
            _ => response,
        })
    }
}

/// Builder for [`InMemoryCouch`].
///
/// # Example
///
/// ```ignore
/// use couchlayer::{backend::HttpBackendBuilder, memory::InMemoryCouch};
///
/// let couch = InMemoryCouch::builder()
///     .database("people")
///     .map_function("by_age", |doc, emitter| emitter.emit(doc["age"].clone(), 1))
///     .build()
///     .await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryCouchBuilder {
    functions: FunctionRegistry,
    databases: Vec<String>,
}

impl InMemoryCouchBuilder {
    /// Registers the implementation of the map function with source `source`.
    ///
    /// Design documents whose view `map` equals `source` (ignoring surrounding
    /// whitespace) run `map` when queried.
    pub fn map_function<F>(mut self, source: impl Into<String>, map: F) -> Self
    where
        F: Fn(&Value, &mut Emitter) + Send + Sync + 'static,
    {
        self.functions
            .maps
            .insert(source.into().trim().to_string(), Arc::new(map));
        self
    }

    /// Registers the implementation of the reduce function with source `source`.
    pub fn reduce_function<F>(mut self, source: impl Into<String>, reduce: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        self.functions
            .reduces
            .insert(source.into().trim().to_string(), Arc::new(reduce));
        self
    }

    /// Creates the database `name` up front.
    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.databases.push(name.into());
        self
    }
}

#[async_trait]
impl HttpBackendBuilder for InMemoryCouchBuilder {
    type Backend = InMemoryCouch;

    /// Builds the store. Seeded databases skip the naming rule.
    async fn build(self) -> CouchResult<Self::Backend> {
        let couch = InMemoryCouch::with_functions(self.functions);
        {
            let mut state = couch.state.write().await;
            for name in self.databases {
                state.databases.entry(name).or_default();
            }
        }
        Ok(couch)
    }
}

fn decode_segments(url: &Url) -> Result<Vec<String>, BackendError> {
    url.path_segments()
        .into_iter()
        .flatten()
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            percent_decode_str(segment)
                .decode_utf8()
                .map(|segment| segment.into_owned())
                .map_err(|err| BackendError::Request(format!("invalid path segment {segment}: {err}")))
        })
        .collect()
}

fn parse_document(body: Option<&[u8]>) -> Result<Map<String, Value>, StoreFailure> {
    let body = body.ok_or_else(|| StoreFailure::BadRequest("Request body is required".into()))?;
    match serde_json::from_slice(body) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(_) => Err(StoreFailure::BadRequest("Document must be a JSON object".into())),
        Err(err) => Err(StoreFailure::BadRequest(format!("invalid UTF-8 JSON: {err}"))),
    }
}

fn new_rev(generation: u64) -> String {
    format!("{generation}-{}", Uuid::new_v4().simple())
}

fn json_response(status: u16, body: Value) -> HttpResponse {
    HttpResponse::new(status, body.to_string())
}
