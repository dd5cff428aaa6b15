//! Document, design document and view operations on a single database.
//!
//! A [`Database`] is obtained from [`CouchService::get_db`](crate::service::CouchService::get_db)
//! and shares the service's transport and status table. It holds no other state,
//! so it can be cloned freely and used from concurrent tasks.
//!
//! # Example
//!
//! ```ignore
//! use couchlayer::prelude::*;
//!
//! let people = service.get_db("people", true).await?;
//!
//! let created = people.create_doc(&json!({"name": "John Doe", "age": 30})).await?;
//! let mut person: Person = people.get_doc(&created.id).await?;
//! person.age += 1;
//! people.update_doc(&created.id, &person).await?;
//!
//! let adults: ViewResponse<ViewRow> = people
//!     .view("people", "by_age", &ViewParams::builder().start_key(18).build())
//!     .await?;
//! ```

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, instrument};

use crate::{
    backend::{HttpResponse, Method},
    design::{DESIGN_PREFIX, DesignDocument, ViewDefinition, design_id},
    document::DocumentResponse,
    endpoint::RequestPath,
    error::{CouchError, CouchResult, ResultExt},
    params::ViewParams,
    shape::{REV_KEY, Shaped, check_document_target, check_identity, check_view_result},
    status::StatusTable,
    transport::{Cancellation, Transport},
};

/// A handle on one database.
#[derive(Debug, Clone)]
pub struct Database {
    name: String,
    transport: Arc<Transport>,
    statuses: Arc<StatusTable>,
}

impl Database {
    pub(crate) fn new(name: &str, transport: Arc<Transport>, statuses: Arc<StatusTable>) -> Self {
        Self {
            name: name.to_string(),
            transport,
            statuses,
        }
    }

    /// Returns the database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a copy of this handle whose requests observe `cancellation`.
    pub fn with_cancellation(&self, cancellation: Cancellation) -> Self {
        Self {
            name: self.name.clone(),
            transport: Arc::new(self.transport.with_cancellation(cancellation)),
            statuses: self.statuses.clone(),
        }
    }

    /// Creates a document. The store assigns an id unless `doc` carries `_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CouchError::Status`] for any response other than 200 or 201.
    #[instrument(skip(self, doc), fields(db = %self.name))]
    pub async fn create_doc<D>(&self, doc: &D) -> CouchResult<DocumentResponse>
    where
        D: Serialize + ?Sized + Sync,
    {
        let response = self
            .transport
            .request(Method::Post, &RequestPath::database(&self.name), Some(doc))
            .await
            .context("error creating doc")?;

        match response.status {
            200 | 201 => {
                let created: DocumentResponse = decode(&response)?;
                debug!(id = %created.id, rev = %created.rev, "created doc");
                Ok(created)
            }
            _ => Err(unexpected(&response).context("error creating doc")),
        }
    }

    /// Reads the document `id` into `T`.
    ///
    /// `T` must be a record or an open string-keyed map.
    ///
    /// # Errors
    ///
    /// - [`CouchError::InvalidArgument`] if `T` cannot hold a document; nothing
    ///   is sent in that case
    /// - [`CouchError::DocumentNotFound`] for statuses in the status table
    /// - [`CouchError::Status`] for any other non-200 response
    #[instrument(skip(self), fields(db = %self.name))]
    pub async fn get_doc<T>(&self, id: &str) -> CouchResult<T>
    where
        T: DeserializeOwned + Shaped,
    {
        check_document_target(&T::shape())?;

        let response = self
            .transport
            .send(Method::Get, &RequestPath::document(&self.name, id))
            .await
            .context(format!("error getting doc {id}"))?;

        match response.status {
            200 => decode(&response),
            status => Err(self
                .statuses
                .error_for(status, id)
                .unwrap_or_else(|| unexpected(&response))),
        }
    }

    /// Replaces the document `id` with `doc`.
    ///
    /// `doc` must carry both `_id` and `_rev`; a stale `_rev` is rejected by the
    /// store with a 409, which is returned unchanged.
    ///
    /// # Errors
    ///
    /// - [`CouchError::MissingIdentifier`], [`CouchError::MissingRevision`] or
    ///   [`CouchError::UnsupportedType`] if `doc` cannot carry identity; nothing
    ///   is sent in that case
    /// - [`CouchError::Status`] for any response other than 200 or 201
    #[instrument(skip(self, doc), fields(db = %self.name))]
    pub async fn update_doc<D>(&self, id: &str, doc: &D) -> CouchResult<DocumentResponse>
    where
        D: Serialize + Shaped + ?Sized + Sync,
    {
        let value = serde_json::to_value(doc)?;
        check_identity(&D::shape(), &value)?;

        let response = self
            .transport
            .request(Method::Put, &RequestPath::document(&self.name, id), Some(&value))
            .await
            .context(format!("error updating doc {id}"))?;

        match response.status {
            200 | 201 => decode(&response),
            _ => Err(unexpected(&response).context(format!("error updating doc {id}"))),
        }
    }

    /// Deletes the current revision of the document `id`.
    ///
    /// # Errors
    ///
    /// Fails if the document cannot be read, and with [`CouchError::Status`] for
    /// any delete response other than 200 or 202.
    #[instrument(skip(self), fields(db = %self.name))]
    pub async fn delete_doc(&self, id: &str) -> CouchResult<DocumentResponse> {
        let current: Map<String, Value> = self
            .get_doc(id)
            .await
            .context("error getting doc to delete")?;
        let rev = current
            .get(REV_KEY)
            .and_then(Value::as_str)
            .ok_or(CouchError::MissingRevision)?;

        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("rev", rev)
            .finish();
        let response = self
            .transport
            .send(Method::Delete, &RequestPath::document(&self.name, id).query(query))
            .await
            .context(format!("error deleting doc {id}"))?;

        match response.status {
            200 | 202 => decode(&response),
            _ => Err(unexpected(&response).context(format!("error deleting doc {id}"))),
        }
    }

    /// Returns whether the document `id` exists.
    ///
    /// # Errors
    ///
    /// Returns [`CouchError::Status`] for anything but 200, 304 or 404.
    #[instrument(skip(self), fields(db = %self.name))]
    pub async fn doc_exists(&self, id: &str) -> CouchResult<bool> {
        let response = self
            .transport
            .send(Method::Head, &RequestPath::document(&self.name, id))
            .await?;

        match response.status {
            200 | 304 => Ok(true),
            404 => Ok(false),
            _ => Err(unexpected(&response)),
        }
    }

    /// Creates or replaces the design document `name` with `views`.
    ///
    /// The document is written in the default language with automatic updates
    /// enabled. See [`put_design_doc`](Self::put_design_doc) for the upsert rules.
    pub async fn create_design_doc(
        &self,
        name: &str,
        views: BTreeMap<String, ViewDefinition>,
    ) -> CouchResult<DocumentResponse> {
        self.put_design_doc(DesignDocument::new(name).with_views(views))
            .await
    }

    /// Creates or replaces a design document.
    ///
    /// The current revision is read first and carried into the write, whatever
    /// the rest of the stored design document holds. A missing design document
    /// is created; any other read failure aborts. A concurrent
    /// writer between the read and the write makes the store answer 409, which
    /// is returned as [`CouchError::Status`].
    #[instrument(skip(self, design), fields(db = %self.name, id = %design.id))]
    pub async fn put_design_doc(&self, mut design: DesignDocument) -> CouchResult<DocumentResponse> {
        design.rev = match self.get_doc::<Map<String, Value>>(&design.id).await {
            Ok(existing) => existing.get(REV_KEY).and_then(Value::as_str).map(str::to_string),
            Err(err) if err.is_document_not_found() => None,
            Err(err) => return Err(err.context("error reading design doc")),
        };
        debug!(rev = ?design.rev, "writing design doc");

        let response = self
            .transport
            .request(Method::Put, &RequestPath::document(&self.name, &design.id), Some(&design))
            .await
            .context("error writing design doc")?;

        match response.status {
            200 | 201 => decode(&response),
            _ => Err(unexpected(&response).context("error writing design doc")),
        }
    }

    /// Reads the design document `name`.
    pub async fn get_design_doc(&self, name: &str) -> CouchResult<DesignDocument> {
        self.get_doc(&design_id(name)).await
    }

    /// Queries the view `view` of the design document `design`.
    ///
    /// `T` is checked against the row contract before anything is sent: it must
    /// be a record with a `rows` sequence of records exposing `id` and `key`, and
    /// a `doc` field when `params.include_docs` is set. [`ViewResponse`] satisfies
    /// it for any such row type.
    ///
    /// [`ViewResponse`]: crate::view::ViewResponse
    ///
    /// # Errors
    ///
    /// - [`CouchError::Shape`] if `T` breaks the row contract
    /// - [`CouchError::Status`] for any non-200 response
    #[instrument(skip(self, params), fields(db = %self.name))]
    pub async fn view<T>(&self, design: &str, view: &str, params: &ViewParams) -> CouchResult<T>
    where
        T: DeserializeOwned + Shaped,
    {
        check_view_result(&T::shape(), params.include_docs)?;

        let path = RequestPath::database(&self.name)
            .segment("_design")
            .segment(design.strip_prefix(DESIGN_PREFIX).unwrap_or(design))
            .segment("_view")
            .segment(view)
            .query(params.to_query_string());
        let response = self
            .transport
            .send(Method::Get, &path)
            .await
            .context(format!("error querying view {design}/{view}"))?;

        match response.status {
            200 => decode(&response),
            _ => Err(unexpected(&response).context(format!("error querying view {design}/{view}"))),
        }
    }
}

fn decode<T: DeserializeOwned>(response: &HttpResponse) -> CouchResult<T> {
    Ok(serde_json::from_slice(&response.body)?)
}

fn unexpected(response: &HttpResponse) -> CouchError {
    CouchError::status(response.status, &response.body)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::{
        document::Document,
        service::CouchService,
        shape::ShapeError,
        testing::ScriptedBackend,
        view::{ViewResponse, ViewRow},
    };

    #[derive(Debug, Serialize, Deserialize, Shaped)]
    struct Person {
        #[serde(flatten)]
        document: Document,
        name: String,
    }

    fn database(backend: &Arc<ScriptedBackend>) -> Database {
        let service = CouchService::builder("http://localhost:5984")
            .max_attempts(1)
            .build(backend.clone())
            .unwrap();
        Database::new("people", Arc::new(service.transport().clone()), Arc::default())
    }

    #[tokio::test]
    async fn create_doc_posts_to_database() {
        let backend = Arc::new(
            ScriptedBackend::new().respond(201, json!({"id": "abc", "ok": true, "rev": "1-x"})),
        );
        let db = database(&backend);

        let created = db.create_doc(&json!({"name": "John Doe"})).await.unwrap();

        assert_eq!(created.id, "abc");
        assert_eq!(created.rev, "1-x");
        let request = &backend.requests()[0];
        assert_eq!((request.method, request.path.as_str()), (Method::Post, "/people"));
    }

    #[tokio::test]
    async fn get_doc_rejects_unsupported_target_without_sending() {
        let backend = Arc::new(ScriptedBackend::new());
        let db = database(&backend);

        let err = db.get_doc::<Vec<String>>("abc").await.unwrap_err();

        assert!(matches!(err, CouchError::InvalidArgument(_)));
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn get_doc_maps_not_found_family() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .respond(404, json!({"error": "not_found", "reason": "missing"}))
                .respond(400, json!({"error": "bad_request"}))
                .respond(401, json!({"error": "unauthorized"})),
        );
        let db = database(&backend);

        let err = db.get_doc::<Map<String, Value>>("abc").await.unwrap_err();
        assert!(matches!(err, CouchError::DocumentNotFound(id) if id == "abc"));
        assert!(db.get_doc::<Person>("abc").await.unwrap_err().is_document_not_found());
        assert_eq!(db.get_doc::<Person>("abc").await.unwrap_err().status_code(), Some(401));
    }

    #[tokio::test]
    async fn get_doc_decodes_records() {
        let backend = Arc::new(ScriptedBackend::new().respond(
            200,
            json!({"_id": "abc", "_rev": "1-x", "name": "John Doe"}),
        ));
        let db = database(&backend);

        let person: Person = db.get_doc("abc").await.unwrap();

        assert_eq!(person.document, Document::with_rev("abc", "1-x"));
        assert_eq!(person.name, "John Doe");
    }

    #[tokio::test]
    async fn update_doc_without_rev_sends_nothing() {
        let backend = Arc::new(ScriptedBackend::new());
        let db = database(&backend);

        let err = db
            .update_doc("abc", &json!({"_id": "abc", "name": "John Doe"}))
            .await
            .unwrap_err();
        assert!(matches!(err, CouchError::MissingRevision));

        let person = Person {
            document: Document::new("abc"),
            name: "John Doe".into(),
        };
        let err = db.update_doc("abc", &person).await.unwrap_err();
        assert!(matches!(err, CouchError::MissingRevision));

        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn update_doc_puts_once_and_surfaces_conflicts() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .respond(201, json!({"id": "abc", "ok": true, "rev": "2-y"}))
                .respond(409, json!({"error": "conflict", "reason": "Document update conflict."})),
        );
        let db = database(&backend);
        let person = Person {
            document: Document::with_rev("abc", "1-x"),
            name: "John Doe".into(),
        };

        let updated = db.update_doc("abc", &person).await.unwrap();
        assert_eq!(updated.rev, "2-y");
        let request = &backend.requests()[0];
        assert_eq!((request.method, request.path.as_str()), (Method::Put, "/people/abc"));
        assert_eq!(
            request.body,
            Some(json!({"_id": "abc", "_rev": "1-x", "name": "John Doe"}))
        );

        let err = db.update_doc("abc", &person).await.unwrap_err();
        assert_eq!(err.status_code(), Some(409));
        assert!(err.to_string().contains("Document update conflict."));
        assert_eq!(backend.requests().len(), 2);
    }

    #[tokio::test]
    async fn delete_doc_reads_current_revision() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .respond(200, json!({"_id": "a b", "_rev": "3-z"}))
                .respond(200, json!({"id": "a b", "ok": true, "rev": "4-w"})),
        );
        let db = database(&backend);

        let deleted = db.delete_doc("a b").await.unwrap();

        assert_eq!(deleted.rev, "4-w");
        let requests = backend.requests();
        assert_eq!(requests[1].method, Method::Delete);
        assert_eq!(requests[1].path, "/people/a%20b");
        assert_eq!(requests[1].query.as_deref(), Some("rev=3-z"));
    }

    #[tokio::test]
    async fn delete_doc_aborts_when_read_fails() {
        let backend = Arc::new(ScriptedBackend::new().respond(404, json!({"error": "not_found"})));
        let db = database(&backend);

        let err = db.delete_doc("abc").await.unwrap_err();

        assert!(err.is_document_not_found());
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn doc_exists_status_table() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .respond_empty(200)
                .respond_empty(304)
                .respond_empty(404)
                .respond_empty(401),
        );
        let db = database(&backend);

        assert!(db.doc_exists("abc").await.unwrap());
        assert!(db.doc_exists("abc").await.unwrap());
        assert!(!db.doc_exists("abc").await.unwrap());
        assert_eq!(db.doc_exists("abc").await.unwrap_err().status_code(), Some(401));
    }

    #[tokio::test]
    async fn create_design_doc_carries_existing_revision() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .respond(200, json!({"_id": "_design/people", "_rev": "2-abc", "views": {}}))
                .respond(201, json!({"id": "_design/people", "ok": true, "rev": "3-def"})),
        );
        let db = database(&backend);
        let views = BTreeMap::from([(
            "by_name".to_string(),
            ViewDefinition::map("function(doc) { emit(doc.name, null); }"),
        )]);

        db.create_design_doc("people", views).await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests[0].path, "/people/_design/people");
        assert_eq!(requests[1].method, Method::Put);
        assert_eq!(
            requests[1].body,
            Some(json!({
                "_id": "_design/people",
                "_rev": "2-abc",
                "language": "javascript",
                "views": { "by_name": { "map": "function(doc) { emit(doc.name, null); }" } },
                "autoupdate": true
            }))
        );
    }

    #[tokio::test]
    async fn create_design_doc_replaces_untyped_existing_document() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .respond(
                    200,
                    json!({
                        "_id": "_design/people",
                        "_rev": "2-abc",
                        "views": {
                            "lib": { "util": "exports.upper = function(s) { return s.toUpperCase(); }" },
                            "by_name": { "map": "function(doc) { emit(doc.name, null); }" }
                        }
                    }),
                )
                .respond(201, json!({"id": "_design/people", "ok": true, "rev": "3-def"})),
        );
        let db = database(&backend);

        let created = db.create_design_doc("people", BTreeMap::new()).await.unwrap();

        assert_eq!(created.rev, "3-def");
        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].method, Method::Put);
        assert_eq!(requests[1].body.as_ref().unwrap()["_rev"], json!("2-abc"));
    }

    #[tokio::test]
    async fn create_design_doc_without_existing_document() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .respond(404, json!({"error": "not_found"}))
                .respond(201, json!({"id": "_design/people", "ok": true, "rev": "1-abc"})),
        );
        let db = database(&backend);

        db.create_design_doc("people", BTreeMap::new()).await.unwrap();

        let body = backend.requests()[1].body.clone().unwrap();
        assert!(body.get("_rev").is_none());
    }

    #[tokio::test]
    async fn create_design_doc_aborts_on_other_read_failures() {
        let backend = Arc::new(ScriptedBackend::new().respond(500, json!({"error": "boom"})));
        let db = database(&backend);

        let err = db.create_design_doc("people", BTreeMap::new()).await.unwrap_err();

        assert_eq!(err.status_code(), Some(500));
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn view_encodes_path_and_query() {
        let backend = Arc::new(ScriptedBackend::new().respond(
            200,
            json!({
                "offset": 0,
                "total_rows": 1,
                "rows": [{"id": "abc", "key": "John Doe", "value": null, "doc": {"_id": "abc", "name": "John Doe"}}]
            }),
        ));
        let db = database(&backend);
        let params = ViewParams::builder().include_docs(true).limit(10).build();

        let response: ViewResponse<ViewRow> = db.view("people", "by_name", &params).await.unwrap();

        assert_eq!(response.rows[0].id.as_deref(), Some("abc"));
        assert_eq!(response.rows[0].doc.as_ref().unwrap()["name"], json!("John Doe"));
        let request = &backend.requests()[0];
        assert_eq!(request.path, "/people/_design/people/_view/by_name");
        assert_eq!(request.query.as_deref(), Some("include_docs=true&limit=10"));
    }

    #[tokio::test]
    async fn view_rejects_rows_without_doc_when_docs_requested() {
        #[derive(Debug, Deserialize, Shaped)]
        #[allow(dead_code)]
        struct Row {
            id: String,
            key: Value,
        }

        let backend = Arc::new(ScriptedBackend::new());
        let db = database(&backend);
        let params = ViewParams::builder().include_docs(true).build();

        let err = db
            .view::<ViewResponse<Row>>("people", "by_name", &params)
            .await
            .unwrap_err();

        assert!(matches!(err, CouchError::Shape(ShapeError::MissingDoc("Row"))));
        assert!(backend.requests().is_empty());
    }
}
