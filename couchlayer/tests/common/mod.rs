#![allow(dead_code)]

use std::time::Duration;

use couchlayer::{
    memory::{InMemoryCouch, InMemoryCouchBuilder},
    prelude::*,
    serde_json::Value,
};
use serde::{Deserialize, Serialize};

pub const ENDPOINT: &str = "http://localhost:5984";

pub const BY_NAME: &str = "function(doc) { if (doc.name) { emit(doc.name, doc.age); } }";
pub const BY_AGE: &str = "function(doc) { if (doc.age) { emit([doc.age, doc.name], 1); } }";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Shaped)]
pub struct Person {
    #[serde(flatten)]
    pub document: Document,
    pub name: String,
    pub age: u32,
}

impl Person {
    pub fn new(name: &str, age: u32) -> Self {
        Self {
            document: Document::default(),
            name: name.to_string(),
            age,
        }
    }
}

pub fn couch() -> InMemoryCouchBuilder {
    InMemoryCouch::builder()
        .map_function(BY_NAME, |doc: &Value, emitter| {
            if let Some(name) = doc.get("name") {
                emitter.emit(name.clone(), doc["age"].clone());
            }
        })
        .map_function(BY_AGE, |doc: &Value, emitter| {
            if let Some(age) = doc.get("age") {
                emitter.emit(Value::Array(vec![age.clone(), doc["name"].clone()]), 1);
            }
        })
}

pub fn service(couch: &InMemoryCouch) -> CouchService {
    CouchService::builder(ENDPOINT)
        .max_attempts(3)
        .retry_delay(Duration::from_millis(1))
        .timeout(Duration::from_secs(5))
        .build(couch.clone())
        .unwrap()
}

pub async fn people() -> (InMemoryCouch, Database) {
    let couch = couch().database("people").build().await.unwrap();
    let db = service(&couch).get_db("people", false).await.unwrap();
    couch.clear_requests().await;
    (couch, db)
}
