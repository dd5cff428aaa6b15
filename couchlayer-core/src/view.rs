//! View response envelopes.
//!
//! [`ViewResponse`] is the envelope the store wraps around view rows. It satisfies
//! the row contract checked by [`check_view_result`](crate::shape::check_view_result)
//! for any row type that exposes `id` and `key`, such as [`ViewRow`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::shape::Shaped;

/// A view query response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Shaped)]
pub struct ViewResponse<R> {
    /// Number of rows in the view index before the first returned row.
    #[serde(default)]
    pub offset: u64,
    /// The returned rows, in index order.
    pub rows: Vec<R>,
    /// Number of rows in the view index.
    #[serde(default)]
    pub total_rows: u64,
    /// The database update sequence the index reflects, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_seq: Option<Value>,
}

/// A generic view row.
///
/// `id` is absent for reduced rows. `doc` is populated only when the query sets
/// `include_docs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Shaped)]
pub struct ViewRow<D = Value> {
    /// Id of the document that emitted this row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The emitted key.
    #[serde(default)]
    pub key: Value,
    /// The emitted or reduced value.
    #[serde(default)]
    pub value: Value,
    /// The emitting document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<D>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::shape::check_view_result;

    #[test]
    fn envelope_satisfies_row_contract() {
        let shape = ViewResponse::<ViewRow>::shape();

        assert_eq!(check_view_result(&shape, false), Ok(()));
        assert_eq!(check_view_result(&shape, true), Ok(()));
    }

    #[test]
    fn decodes_reduced_rows() {
        let response: ViewResponse<ViewRow> = serde_json::from_value(json!({
            "rows": [{ "key": null, "value": 3 }]
        }))
        .unwrap();

        assert_eq!(response.rows[0].id, None);
        assert_eq!(response.rows[0].value, json!(3));
        assert_eq!(response.total_rows, 0);
    }

    #[test]
    fn decodes_embedded_docs_without_default() {
        #[derive(Debug, Deserialize)]
        struct Person {
            name: String,
        }

        let response: ViewResponse<ViewRow<Person>> = serde_json::from_value(json!({
            "total_rows": 2,
            "offset": 0,
            "rows": [
                { "id": "a", "key": "Ann", "value": null, "doc": { "name": "Ann" } },
                { "id": "b", "key": "Bob", "value": null }
            ]
        }))
        .unwrap();

        assert_eq!(response.rows[0].doc.as_ref().map(|doc| doc.name.as_str()), Some("Ann"));
        assert!(response.rows[1].doc.is_none());
    }
}
