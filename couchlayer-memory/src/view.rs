//! View evaluation for the in-memory store.
//!
//! Map and reduce functions cannot be interpreted in process, so their sources
//! act as lookup keys: a design document's `map` source is resolved to a Rust
//! closure registered under the same source with
//! [`InMemoryCouchBuilder::map_function`](crate::InMemoryCouchBuilder::map_function).
//! The built-in reducers `_count` and `_sum` need no registration.

use serde_json::{Map, Value, json};
use std::{fmt, sync::Arc};
use url::Url;

use crate::{
    collate::{collate, keys_equal},
    failure::StoreFailure,
};

/// Collects the rows a map function emits for one document.
#[derive(Debug, Default)]
pub struct Emitter {
    rows: Vec<(Value, Value)>,
}

impl Emitter {
    /// Emits a row.
    pub fn emit(&mut self, key: impl Into<Value>, value: impl Into<Value>) {
        self.rows.push((key.into(), value.into()));
    }
}

/// A map function: called once per document, emitting any number of rows.
pub type MapFunction = Arc<dyn Fn(&Value, &mut Emitter) + Send + Sync>;

/// A reduce function: folds the values of one group into a single value.
pub type ReduceFunction = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// A resolved reduce function.
#[derive(Clone)]
pub(crate) enum Reducer {
    Count,
    Sum,
    Custom(ReduceFunction),
}

impl fmt::Debug for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reducer::Count => f.write_str("_count"),
            Reducer::Sum => f.write_str("_sum"),
            Reducer::Custom(_) => f.write_str("custom"),
        }
    }
}

impl Reducer {
    fn apply(&self, values: &[Value]) -> Value {
        match self {
            Reducer::Count => json!(values.len()),
            Reducer::Sum => {
                if values.iter().all(|value| value.is_i64()) {
                    json!(values.iter().filter_map(Value::as_i64).sum::<i64>())
                } else {
                    json!(values.iter().filter_map(Value::as_f64).sum::<f64>())
                }
            }
            Reducer::Custom(reduce) => reduce(values),
        }
    }
}

/// The view options the in-memory store honours. Others are accepted and ignored.
#[derive(Debug, Clone)]
pub(crate) struct ViewQuery {
    descending: bool,
    end_key: Option<Value>,
    end_key_doc_id: Option<String>,
    group: bool,
    group_level: Option<usize>,
    include_docs: bool,
    inclusive_end: bool,
    key: Option<Value>,
    keys: Option<Vec<Value>>,
    limit: Option<usize>,
    reduce: Option<bool>,
    skip: usize,
    start_key: Option<Value>,
    start_key_doc_id: Option<String>,
    update_seq: bool,
}

impl Default for ViewQuery {
    fn default() -> Self {
        Self {
            descending: false,
            end_key: None,
            end_key_doc_id: None,
            group: false,
            group_level: None,
            include_docs: false,
            inclusive_end: true,
            key: None,
            keys: None,
            limit: None,
            reduce: None,
            skip: 0,
            start_key: None,
            start_key_doc_id: None,
            update_seq: false,
        }
    }
}

impl ViewQuery {
    /// Reads the view options from the query string of `url`.
    pub(crate) fn from_url(url: &Url) -> Result<Self, StoreFailure> {
        let mut query = Self::default();

        for (name, value) in url.query_pairs() {
            let value = value.as_ref();
            match name.as_ref() {
                "descending" => query.descending = flag(&name, value)?,
                "endkey" | "end_key" => query.end_key = Some(json_value(&name, value)?),
                "endkey_docid" | "end_key_doc_id" => query.end_key_doc_id = Some(value.to_string()),
                "group" => query.group = flag(&name, value)?,
                "group_level" => query.group_level = Some(number(&name, value)?),
                "include_docs" => query.include_docs = flag(&name, value)?,
                "inclusive_end" => query.inclusive_end = flag(&name, value)?,
                "key" => query.key = Some(json_value(&name, value)?),
                "keys" => match json_value(&name, value)? {
                    Value::Array(keys) => query.keys = Some(keys),
                    _ => return Err(StoreFailure::BadRequest("`keys` must be an array".into())),
                },
                "limit" => query.limit = Some(number(&name, value)?),
                "reduce" => query.reduce = Some(flag(&name, value)?),
                "skip" => query.skip = number(&name, value)?,
                "startkey" | "start_key" => query.start_key = Some(json_value(&name, value)?),
                "startkey_docid" | "start_key_doc_id" => {
                    query.start_key_doc_id = Some(value.to_string())
                }
                "update_seq" => query.update_seq = flag(&name, value)?,
                _ => {}
            }
        }

        if query.key.is_some() && query.keys.is_some() {
            return Err(StoreFailure::QueryParse(
                "`keys` is incompatible with `key`".into(),
            ));
        }

        Ok(query)
    }

    fn ordered(&self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }

    fn compare(&self, row: &MappedRow, key: &Value, doc_id: Option<&str>) -> std::cmp::Ordering {
        self.ordered(
            collate(&row.key, key)
                .then_with(|| doc_id.map_or(std::cmp::Ordering::Equal, |id| row.id.as_str().cmp(id))),
        )
    }

    fn after_start(&self, row: &MappedRow) -> bool {
        match (&self.key, &self.start_key) {
            (Some(key), _) => self.compare(row, key, None).is_ge(),
            (None, Some(start)) => self
                .compare(row, start, self.start_key_doc_id.as_deref())
                .is_ge(),
            (None, None) => true,
        }
    }

    fn before_end(&self, row: &MappedRow) -> bool {
        match (&self.key, &self.end_key) {
            (Some(key), _) => self.compare(row, key, None).is_le(),
            (None, Some(end)) => {
                let ordering = self.compare(row, end, self.end_key_doc_id.as_deref());
                if self.inclusive_end {
                    ordering.is_le()
                } else {
                    ordering.is_lt()
                }
            }
            (None, None) => true,
        }
    }

    fn page<T>(&self, rows: Vec<T>) -> Vec<T> {
        rows.into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

fn flag(name: &str, value: &str) -> Result<bool, StoreFailure> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(StoreFailure::QueryParse(format!(
            "Invalid boolean parameter for `{name}`: {value}"
        ))),
    }
}

fn number(name: &str, value: &str) -> Result<usize, StoreFailure> {
    value.parse().map_err(|_| {
        StoreFailure::QueryParse(format!("Invalid integer parameter for `{name}`: {value}"))
    })
}

fn json_value(name: &str, value: &str) -> Result<Value, StoreFailure> {
    serde_json::from_str(value)
        .map_err(|_| StoreFailure::BadRequest(format!("invalid JSON for `{name}`: {value}")))
}

#[derive(Debug, Clone)]
struct MappedRow {
    id: String,
    key: Value,
    value: Value,
}

/// The documents a view runs over and the database's update sequence.
pub(crate) struct ViewSource<'a> {
    pub documents: Vec<(&'a str, &'a Map<String, Value>)>,
    pub update_seq: u64,
}

/// Runs a view over `source` and renders the response body.
pub(crate) fn run_view(
    source: &ViewSource<'_>,
    map: &MapFunction,
    reducer: Option<&Reducer>,
    query: &ViewQuery,
) -> Result<Value, StoreFailure> {
    let reducing = match (reducer, query.reduce) {
        (Some(_), None | Some(true)) => true,
        (None, Some(true)) => {
            return Err(StoreFailure::QueryParse(
                "Reduce is invalid for map-only views.".into(),
            ));
        }
        _ => false,
    };
    if reducing && query.include_docs {
        return Err(StoreFailure::QueryParse(
            "`include_docs` is invalid for reduce".into(),
        ));
    }
    if !reducing && (query.group || query.group_level.is_some()) {
        return Err(StoreFailure::QueryParse(
            "Invalid use of grouping on a map view.".into(),
        ));
    }

    let mut rows = Vec::new();
    for (id, document) in &source.documents {
        let mut emitter = Emitter::default();
        map(&Value::Object((*document).clone()), &mut emitter);
        rows.extend(emitter.rows.into_iter().map(|(key, value)| MappedRow {
            id: id.to_string(),
            key,
            value,
        }));
    }
    rows.sort_by(|a, b| collate(&a.key, &b.key).then_with(|| a.id.cmp(&b.id)));
    if query.descending {
        rows.reverse();
    }
    let total_rows = rows.len();

    let (offset, selected) = match &query.keys {
        Some(keys) => (
            0,
            keys.iter()
                .flat_map(|key| rows.iter().filter(move |row| keys_equal(&row.key, key)))
                .cloned()
                .collect::<Vec<_>>(),
        ),
        None => (
            rows.iter().take_while(|row| !query.after_start(row)).count(),
            rows.iter()
                .filter(|row| query.after_start(row) && query.before_end(row))
                .cloned()
                .collect(),
        ),
    };

    let mut body = match (reducing, reducer) {
        (true, Some(reducer)) => json!({ "rows": reduce_rows(selected, reducer, query) }),
        _ => {
            let rows = query
                .page(selected)
                .into_iter()
                .map(|row| render_row(row, source, query.include_docs))
                .collect::<Vec<_>>();
            json!({
                "total_rows": total_rows,
                "offset": offset.saturating_add(query.skip).min(total_rows),
                "rows": rows,
            })
        }
    };
    if query.update_seq {
        body["update_seq"] = json!(source.update_seq);
    }

    Ok(body)
}

fn render_row(row: MappedRow, source: &ViewSource<'_>, include_docs: bool) -> Value {
    let mut rendered = json!({ "id": row.id, "key": row.key, "value": row.value });
    if include_docs {
        rendered["doc"] = source
            .documents
            .iter()
            .find(|(id, _)| *id == row.id)
            .map(|(_, document)| Value::Object((*document).clone()))
            .unwrap_or(Value::Null);
    }
    rendered
}

fn group_key(key: &Value, query: &ViewQuery) -> Value {
    match (key, query.group_level) {
        (Value::Array(items), Some(level)) => {
            Value::Array(items.iter().take(level).cloned().collect())
        }
        (_, Some(_)) => key.clone(),
        (_, None) if query.group => key.clone(),
        (_, None) => Value::Null,
    }
}

fn reduce_rows(rows: Vec<MappedRow>, reducer: &Reducer, query: &ViewQuery) -> Vec<Value> {
    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
    for row in rows {
        let key = group_key(&row.key, query);
        match groups.last_mut() {
            Some((current, values)) if keys_equal(current, &key) => values.push(row.value),
            _ => groups.push((key, vec![row.value])),
        }
    }

    query
        .page(groups)
        .into_iter()
        .map(|(key, values)| json!({ "key": key, "value": reducer.apply(&values) }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_age() -> MapFunction {
        Arc::new(|doc: &Value, emitter: &mut Emitter| {
            emitter.emit(doc["age"].clone(), doc["name"].clone());
        })
    }

    fn query(params: &str) -> ViewQuery {
        let url = Url::parse(&format!("http://localhost/db/_design/d/_view/v?{params}")).unwrap();
        ViewQuery::from_url(&url).unwrap()
    }

    fn documents() -> Vec<(String, Map<String, Value>)> {
        [("a", "Ann", 31), ("b", "Bob", 25), ("c", "Cid", 40), ("d", "Dee", 25)]
            .into_iter()
            .map(|(id, name, age)| {
                let Value::Object(body) = json!({"_id": id, "name": name, "age": age}) else {
                    unreachable!()
                };
                (id.to_string(), body)
            })
            .collect()
    }

    fn run(params: &str, reducer: Option<Reducer>) -> Result<Value, StoreFailure> {
        let documents = documents();
        let source = ViewSource {
            documents: documents.iter().map(|(id, body)| (id.as_str(), body)).collect(),
            update_seq: 4,
        };
        run_view(&source, &by_age(), reducer.as_ref(), &query(params))
    }

    fn keys(body: &Value) -> Vec<Value> {
        body["rows"]
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["key"].clone())
            .collect()
    }

    #[test]
    fn rows_are_sorted_by_key_then_id() {
        let body = run("", None).unwrap();

        assert_eq!(keys(&body), vec![json!(25), json!(25), json!(31), json!(40)]);
        assert_eq!(body["rows"][0]["id"], json!("b"));
        assert_eq!(body["total_rows"], json!(4));
        assert_eq!(body["offset"], json!(0));
    }

    #[test]
    fn range_and_paging() {
        let body = run("startkey=26&endkey=40&inclusive_end=false", None).unwrap();
        assert_eq!(keys(&body), vec![json!(31)]);
        assert_eq!(body["offset"], json!(2));

        let body = run("descending=true&limit=2&skip=1", None).unwrap();
        assert_eq!(keys(&body), vec![json!(31), json!(25)]);
        assert_eq!(body["offset"], json!(1));

        let body = run(&format!("skip={}", usize::MAX), None).unwrap();
        assert_eq!(keys(&body), Vec::<Value>::new());
        assert_eq!(body["offset"], json!(4));
    }

    #[test]
    fn key_and_keys_select_exact_matches() {
        let body = run("key=25", None).unwrap();
        assert_eq!(keys(&body), vec![json!(25), json!(25)]);

        let body = run("keys=%5B40%2C25%5D", None).unwrap();
        assert_eq!(keys(&body), vec![json!(40), json!(25), json!(25)]);
    }

    #[test]
    fn include_docs_and_update_seq() {
        let body = run("key=40&include_docs=true&update_seq=true", None).unwrap();

        assert_eq!(body["rows"][0]["doc"]["name"], json!("Cid"));
        assert_eq!(body["update_seq"], json!(4));
    }

    #[test]
    fn reduce_and_group() {
        let body = run("", Some(Reducer::Count)).unwrap();
        assert_eq!(body["rows"], json!([{"key": null, "value": 4}]));

        let body = run("group=true", Some(Reducer::Count)).unwrap();
        assert_eq!(
            body["rows"],
            json!([
                {"key": 25, "value": 2},
                {"key": 31, "value": 1},
                {"key": 40, "value": 1}
            ])
        );

        let body = run("reduce=false", Some(Reducer::Count)).unwrap();
        assert_eq!(body["total_rows"], json!(4));
    }

    #[test]
    fn invalid_combinations_are_rejected() {
        assert!(matches!(
            run("include_docs=true", Some(Reducer::Sum)),
            Err(StoreFailure::QueryParse(_))
        ));
        assert!(matches!(run("group=true", None), Err(StoreFailure::QueryParse(_))));
        assert!(matches!(run("reduce=true", None), Err(StoreFailure::QueryParse(_))));
    }

    #[test]
    fn sum_keeps_integers() {
        assert_eq!(Reducer::Sum.apply(&[json!(1), json!(2)]), json!(3));
        assert_eq!(Reducer::Sum.apply(&[json!(1), json!(0.5)]), json!(1.5));
    }
}
