//! Structural descriptions of caller types and the checks run against them.
//!
//! The client decodes store responses into caller-defined types. Before a request
//! is sent, the caller's type is checked against the keys the protocol needs, so a
//! type that could never hold the response fails fast instead of after a wasted
//! round trip.
//!
//! Types describe themselves through the [`Shaped`] trait, usually derived:
//!
//! ```ignore
//! use couchlayer::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize, Shaped)]
//! struct PeopleByName {
//!     rows: Vec<PersonRow>,
//! }
//!
//! #[derive(Deserialize, Shaped)]
//! struct PersonRow {
//!     id: String,
//!     key: String,
//!     doc: Option<Person>,
//! }
//! ```
//!
//! The derive reads `#[serde(rename)]`, `#[serde(rename_all)]`, `#[serde(flatten)]`
//! and `#[serde(skip)]`, so the wire keys it reports match what serde decodes.
//!
//! The checks are:
//!
//! - [`check_view_result`] for view response envelopes (rows, row ids and keys,
//!   embedded documents)
//! - [`check_document_target`] for document reads
//! - [`check_identity`] for document updates

use serde_json::Value;
use std::{
    collections::{BTreeMap, HashMap},
    hash::BuildHasher,
    rc::Rc,
    sync::Arc,
};
use thiserror::Error;

use crate::error::{CouchError, CouchResult};

pub use couchlayer_macros::Shaped;

/// Wire key of the row sequence in a view response.
pub const ROWS_KEY: &str = "rows";
/// Wire key of a row's document id.
pub const ROW_ID_KEY: &str = "id";
/// Wire key of a row's emitted key.
pub const ROW_KEY_KEY: &str = "key";
/// Wire key of a row's embedded document.
pub const ROW_DOC_KEY: &str = "doc";
/// Reserved document identifier key.
pub const ID_KEY: &str = "_id";
/// Reserved document revision key.
pub const REV_KEY: &str = "_rev";

/// The structure of a type as seen by JSON decoding.
///
/// Nested shapes are stored as function pointers so recursive types can be
/// described without recursing at construction time.
#[derive(Debug, Clone)]
pub enum Shape {
    /// Strings, numbers, booleans and unit.
    Scalar,
    /// Any JSON value (`serde_json::Value`).
    Any,
    /// An ordered sequence of elements.
    Sequence(fn() -> Shape),
    /// An open mapping from string keys to values.
    Map(fn() -> Shape),
    /// A record with named fields.
    Record(RecordShape),
}

impl Shape {
    /// Returns a short name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Scalar => "scalar",
            Shape::Any => "any value",
            Shape::Sequence(_) => "sequence",
            Shape::Map(_) => "map",
            Shape::Record(_) => "record",
        }
    }
}

/// The fields of a record type.
#[derive(Debug, Clone)]
pub struct RecordShape {
    /// The type's name.
    pub name: &'static str,
    /// Declared fields, in declaration order.
    pub fields: Vec<FieldShape>,
}

impl RecordShape {
    /// Returns the fields as they appear on the wire, with flattened records
    /// merged into their parent.
    pub fn wire_fields(&self) -> Vec<FieldShape> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            if !field.flatten {
                fields.push(field.clone());
                continue;
            }
            if let Shape::Record(inner) = (field.shape)() {
                fields.extend(inner.wire_fields());
            }
        }
        fields
    }

    /// Finds a wire field by key.
    pub fn field_by_key(&self, key: &str) -> Option<FieldShape> {
        self.wire_fields().into_iter().find(|field| field.key == key)
    }

    /// Finds a wire field by its Rust identifier.
    pub fn field_by_ident(&self, ident: &str) -> Option<FieldShape> {
        self.wire_fields().into_iter().find(|field| field.ident == ident)
    }
}

/// A single field of a record.
#[derive(Debug, Clone)]
pub struct FieldShape {
    /// The Rust identifier.
    pub ident: &'static str,
    /// The JSON key the field decodes from. Meaningless when `flatten` is set.
    pub key: &'static str,
    /// Whether the field is flattened into its parent.
    pub flatten: bool,
    /// The field's own shape.
    pub shape: fn() -> Shape,
}

/// Types that can describe their JSON structure.
///
/// Derive it with `#[derive(Shaped)]` on structs; implementations for common
/// standard library and `serde_json` types are provided.
pub trait Shaped {
    /// Returns the type's shape.
    fn shape() -> Shape;
}

macro_rules! scalar_shapes {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Shaped for $ty {
                fn shape() -> Shape {
                    Shape::Scalar
                }
            }
        )*
    };
}

scalar_shapes!(
    (), bool, char, String, str, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize,
    f32, f64,
);

impl Shaped for Value {
    fn shape() -> Shape {
        Shape::Any
    }
}

impl Shaped for serde_json::Map<String, Value> {
    fn shape() -> Shape {
        Shape::Map(Value::shape)
    }
}

impl<T: Shaped> Shaped for Option<T> {
    fn shape() -> Shape {
        T::shape()
    }
}

impl<T: Shaped + ?Sized> Shaped for &T {
    fn shape() -> Shape {
        T::shape()
    }
}

impl<T: Shaped + ?Sized> Shaped for Box<T> {
    fn shape() -> Shape {
        T::shape()
    }
}

impl<T: Shaped + ?Sized> Shaped for Rc<T> {
    fn shape() -> Shape {
        T::shape()
    }
}

impl<T: Shaped + ?Sized> Shaped for Arc<T> {
    fn shape() -> Shape {
        T::shape()
    }
}

impl<T: Shaped> Shaped for Vec<T> {
    fn shape() -> Shape {
        Shape::Sequence(T::shape)
    }
}

impl<T: Shaped> Shaped for [T] {
    fn shape() -> Shape {
        Shape::Sequence(T::shape)
    }
}

impl<V: Shaped, S: BuildHasher> Shaped for HashMap<String, V, S> {
    fn shape() -> Shape {
        Shape::Map(V::shape)
    }
}

impl<V: Shaped> Shaped for BTreeMap<String, V> {
    fn shape() -> Shape {
        Shape::Map(V::shape)
    }
}

/// Ways a view result type can fail the row contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    /// The target is not a record.
    #[error("view result must be a record, found {0}")]
    NotRecord(&'static str),
    /// No field decodes from `rows`.
    #[error("{0} has no field with wire key 'rows'")]
    MissingRows(&'static str),
    /// The `rows` field is not a sequence.
    #[error("{0}.rows must be a sequence")]
    RowsNotSequence(&'static str),
    /// Row elements are not records.
    #[error("rows must hold records, found {0}")]
    RowNotRecord(&'static str),
    /// Row elements have no field decoding from `id`.
    #[error("row type {0} has no field with wire key 'id'")]
    MissingRowId(&'static str),
    /// Row elements have no field decoding from `key`.
    #[error("row type {0} has no field with wire key 'key'")]
    MissingRowKey(&'static str),
    /// A `doc` field decodes from some other key.
    #[error("row type {0} has a 'doc' field with wire key '{1}', expected 'doc'")]
    MisnamedDoc(&'static str, &'static str),
    /// Embedded documents were requested but rows cannot hold them.
    #[error("row type {0} has no field with wire key 'doc' but documents were requested")]
    MissingDoc(&'static str),
}

/// Checks that a shape can hold a view response.
///
/// Rules, each short-circuiting:
///
/// 1. the target is a record with a sequence field whose wire key is `rows`
/// 2. row elements are records with fields for the `id` and `key` wire keys
/// 3. a field named `doc` decodes from the `doc` key; when `include_docs` is
///    set such a field must exist
pub fn check_view_result(shape: &Shape, include_docs: bool) -> Result<(), ShapeError> {
    let Shape::Record(record) = shape else {
        return Err(ShapeError::NotRecord(shape.kind()));
    };

    let rows = record
        .field_by_key(ROWS_KEY)
        .ok_or(ShapeError::MissingRows(record.name))?;
    let Shape::Sequence(element) = (rows.shape)() else {
        return Err(ShapeError::RowsNotSequence(record.name));
    };

    let element = element();
    let Shape::Record(row) = element else {
        return Err(ShapeError::RowNotRecord(element.kind()));
    };

    if row.field_by_key(ROW_ID_KEY).is_none() {
        return Err(ShapeError::MissingRowId(row.name));
    }
    if row.field_by_key(ROW_KEY_KEY).is_none() {
        return Err(ShapeError::MissingRowKey(row.name));
    }

    if let Some(doc) = row.field_by_ident(ROW_DOC_KEY) {
        if doc.key != ROW_DOC_KEY {
            return Err(ShapeError::MisnamedDoc(row.name, doc.key));
        }
    }
    if include_docs && row.field_by_key(ROW_DOC_KEY).is_none() {
        return Err(ShapeError::MissingDoc(row.name));
    }

    Ok(())
}

/// Checks that a type can receive a decoded document.
///
/// Records and open mappings (`Map<String, Value>` and friends) are accepted;
/// everything else fails with [`CouchError::InvalidArgument`].
pub fn check_document_target(shape: &Shape) -> CouchResult<()> {
    match shape {
        Shape::Record(_) => Ok(()),
        Shape::Map(value) if matches!(value(), Shape::Any) => Ok(()),
        other => Err(CouchError::InvalidArgument(format!(
            "document target must be a record or an open string-keyed map, found {}",
            other.kind()
        ))),
    }
}

/// Checks that a document carries both identity keys.
///
/// Records must expose `_id` and `_rev` wire keys, either directly or through a
/// flattened [`Document`](crate::document::Document). Since optional identity
/// fields are left off the wire when unset, the serialized `value` of a record
/// must carry both keys too. Maps and untyped values are checked against the
/// serialized `value` only.
pub fn check_identity(shape: &Shape, value: &Value) -> CouchResult<()> {
    match shape {
        Shape::Record(record) => {
            if record.field_by_key(ID_KEY).is_none() {
                return Err(CouchError::MissingIdentifier);
            }
            if record.field_by_key(REV_KEY).is_none() {
                return Err(CouchError::MissingRevision);
            }
            match value.as_object() {
                Some(object) => check_identity_keys(object),
                None => Ok(()),
            }
        }
        Shape::Map(_) | Shape::Any => {
            let Some(object) = value.as_object() else {
                return Err(CouchError::UnsupportedType(format!(
                    "expected a JSON object, found {value}"
                )));
            };
            check_identity_keys(object)
        }
        other => Err(CouchError::UnsupportedType(other.kind().to_string())),
    }
}

fn check_identity_keys(object: &serde_json::Map<String, Value>) -> CouchResult<()> {
    if !object.contains_key(ID_KEY) {
        return Err(CouchError::MissingIdentifier);
    }
    if !object.contains_key(REV_KEY) {
        return Err(CouchError::MissingRevision);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::document::Document;

    #[derive(Shaped)]
    #[allow(dead_code)]
    struct ValidResult {
        rows: Vec<ValidRow>,
    }

    #[derive(Shaped)]
    #[allow(dead_code)]
    struct ValidRow {
        id: String,
        key: String,
    }

    #[derive(Shaped)]
    #[allow(dead_code)]
    struct DocResult {
        rows: Vec<DocRow>,
    }

    #[derive(Shaped)]
    #[allow(dead_code)]
    struct DocRow {
        id: String,
        key: Value,
        doc: Option<Value>,
    }

    #[derive(Shaped)]
    #[allow(dead_code)]
    struct MissingRows {
        total_rows: u64,
    }

    #[derive(Shaped)]
    #[allow(dead_code)]
    struct WrongTypeRows {
        rows: String,
    }

    #[derive(Shaped)]
    #[allow(dead_code)]
    struct RenamedRows {
        #[serde(rename = "items")]
        rows: Vec<ValidRow>,
    }

    #[derive(Shaped)]
    #[allow(dead_code)]
    struct MissingIdResult {
        rows: Vec<KeyOnlyRow>,
    }

    #[derive(Shaped)]
    #[allow(dead_code)]
    struct KeyOnlyRow {
        key: String,
    }

    #[derive(Shaped)]
    #[allow(dead_code)]
    struct MissingKeyResult {
        rows: Vec<IdOnlyRow>,
    }

    #[derive(Shaped)]
    #[allow(dead_code)]
    struct IdOnlyRow {
        id: String,
    }

    #[derive(Shaped)]
    #[allow(dead_code)]
    struct MisnamedDocResult {
        rows: Vec<MisnamedDocRow>,
    }

    #[derive(Shaped)]
    #[allow(dead_code)]
    struct MisnamedDocRow {
        id: String,
        key: String,
        #[serde(rename = "dock")]
        doc: Value,
    }

    #[derive(Shaped)]
    #[allow(dead_code)]
    struct ScalarRows {
        rows: Vec<i32>,
    }

    #[derive(Shaped)]
    #[serde(rename_all = "UPPERCASE")]
    #[allow(dead_code)]
    struct ShoutingResult {
        rows: Vec<ValidRow>,
    }

    #[derive(Shaped)]
    #[allow(dead_code)]
    struct WithTags {
        #[serde(rename = "_id")]
        id: String,
        #[serde(rename = "_rev")]
        rev: String,
    }

    #[derive(Shaped)]
    #[allow(dead_code)]
    struct WithoutTags {
        id: String,
        rev: String,
    }

    #[derive(Shaped)]
    #[allow(dead_code)]
    struct MixedTags {
        #[serde(rename = "_id")]
        id: String,
        rev: String,
    }

    #[derive(Shaped)]
    #[allow(dead_code)]
    struct EmbedsDocument {
        #[serde(flatten)]
        document: Document,
        name: String,
    }

    #[test]
    fn view_result_accepts_conforming_types() {
        assert_eq!(check_view_result(&ValidResult::shape(), false), Ok(()));
        assert_eq!(check_view_result(&DocResult::shape(), true), Ok(()));
    }

    #[test]
    fn view_result_requires_rows_sequence() {
        assert_eq!(
            check_view_result(&MissingRows::shape(), false),
            Err(ShapeError::MissingRows("MissingRows"))
        );
        assert_eq!(
            check_view_result(&WrongTypeRows::shape(), false),
            Err(ShapeError::RowsNotSequence("WrongTypeRows"))
        );
        assert_eq!(
            check_view_result(&RenamedRows::shape(), false),
            Err(ShapeError::MissingRows("RenamedRows"))
        );
        assert_eq!(
            check_view_result(&ShoutingResult::shape(), false),
            Err(ShapeError::MissingRows("ShoutingResult"))
        );
        assert_eq!(
            check_view_result(&Value::shape(), false),
            Err(ShapeError::NotRecord("any value"))
        );
    }

    #[test]
    fn view_result_requires_row_id_and_key() {
        assert_eq!(
            check_view_result(&MissingIdResult::shape(), false),
            Err(ShapeError::MissingRowId("KeyOnlyRow"))
        );
        assert_eq!(
            check_view_result(&MissingKeyResult::shape(), false),
            Err(ShapeError::MissingRowKey("IdOnlyRow"))
        );
        assert_eq!(
            check_view_result(&ScalarRows::shape(), false),
            Err(ShapeError::RowNotRecord("scalar"))
        );
    }

    #[test]
    fn view_result_checks_doc_field() {
        assert_eq!(
            check_view_result(&MisnamedDocResult::shape(), false),
            Err(ShapeError::MisnamedDoc("MisnamedDocRow", "dock"))
        );
        assert_eq!(
            check_view_result(&ValidResult::shape(), true),
            Err(ShapeError::MissingDoc("ValidRow"))
        );
    }

    #[test]
    fn document_target_accepts_records_and_open_maps() {
        assert!(check_document_target(&WithTags::shape()).is_ok());
        assert!(check_document_target(&serde_json::Map::<String, Value>::shape()).is_ok());
        assert!(check_document_target(&HashMap::<String, Value>::shape()).is_ok());

        for shape in [
            HashMap::<String, String>::shape(),
            Vec::<String>::shape(),
            String::shape(),
            Value::shape(),
        ] {
            assert!(matches!(
                check_document_target(&shape),
                Err(CouchError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn identity_checks_maps_at_runtime() {
        let shape = serde_json::Map::<String, Value>::shape();

        assert!(check_identity(&shape, &json!({"_id": "123", "_rev": "456"})).is_ok());
        assert!(matches!(
            check_identity(&shape, &json!({"_rev": "456"})),
            Err(CouchError::MissingIdentifier)
        ));
        assert!(matches!(
            check_identity(&shape, &json!({"_id": "123"})),
            Err(CouchError::MissingRevision)
        ));
        assert!(matches!(
            check_identity(&Value::shape(), &json!(123)),
            Err(CouchError::UnsupportedType(_))
        ));
    }

    #[test]
    fn identity_checks_record_keys() {
        let value = json!({});
        let tagged = json!({"_id": "123", "_rev": "456"});

        assert!(check_identity(&WithTags::shape(), &tagged).is_ok());
        assert!(check_identity(&EmbedsDocument::shape(), &tagged).is_ok());
        assert!(matches!(
            check_identity(&EmbedsDocument::shape(), &json!({"_id": "123", "name": "a"})),
            Err(CouchError::MissingRevision)
        ));
        assert!(matches!(
            check_identity(&WithoutTags::shape(), &value),
            Err(CouchError::MissingIdentifier)
        ));
        assert!(matches!(
            check_identity(&MixedTags::shape(), &value),
            Err(CouchError::MissingRevision)
        ));
        assert!(matches!(
            check_identity(&i32::shape(), &json!(123)),
            Err(CouchError::UnsupportedType(_))
        ));
    }
}
