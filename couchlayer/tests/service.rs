mod common;

use couchlayer::{backend::Method, memory::InMemoryCouch, prelude::*};

use common::{ENDPOINT, couch, service};

#[tokio::test]
async fn missing_database_is_not_created_unless_asked() {
    let couch = couch().build().await.unwrap();

    let err = service(&couch).get_db("people", false).await.unwrap_err();

    assert!(err.is_database_not_found());
    let methods: Vec<_> = couch.requests().await.iter().map(|r| r.method).collect();
    assert_eq!(methods, [Method::Head]);
    assert!(couch.database_names().await.is_empty());
}

#[tokio::test]
async fn missing_database_is_created_once() {
    let couch = couch().build().await.unwrap();
    let service = service(&couch);

    let db = service.get_db("people", true).await.unwrap();
    assert_eq!(db.name(), "people");

    let requests = couch.requests().await;
    let methods: Vec<_> = requests.iter().map(|r| r.method).collect();
    assert_eq!(methods, [Method::Head, Method::Put, Method::Head]);
    assert_eq!(couch.database_names().await, ["people"]);

    service.get_db("people", true).await.unwrap();
    assert_eq!(couch.requests().await.len(), 4);
}

#[tokio::test]
async fn invalid_names_are_rejected_before_creation() {
    let couch = couch().build().await.unwrap();

    let err = service(&couch).get_db("1people", true).await.unwrap_err();

    assert!(matches!(err, CouchError::InvalidName(_)));
    assert_eq!(couch.requests().await.len(), 1);
}

#[tokio::test]
async fn names_with_slashes_round_trip() {
    let couch = couch().build().await.unwrap();

    service(&couch).get_db("team/people", true).await.unwrap();

    assert_eq!(couch.database_names().await, ["team/people"]);
    assert_eq!(couch.requests().await[1].path(), "/team/people");
    assert_eq!(couch.requests().await[1].segments, ["team/people"]);
}

#[tokio::test]
async fn transient_server_errors_are_retried() {
    let couch = couch().database("people").build().await.unwrap();
    couch.inject_failure(503).await;
    couch.inject_failure(500).await;

    service(&couch).get_db("people", false).await.unwrap();

    assert_eq!(couch.requests().await.len(), 3);
}

#[tokio::test]
async fn exhausted_retries_surface_the_last_status() {
    let couch = couch().database("people").build().await.unwrap();
    for _ in 0..3 {
        couch.inject_failure(503).await;
    }

    let err = service(&couch).get_db("people", false).await.unwrap_err();

    assert_eq!(err.status_code(), Some(503));
    assert_eq!(couch.requests().await.len(), 3);
}

#[tokio::test]
async fn ping_reaches_the_root() {
    let couch = InMemoryCouch::new();

    service(&couch).ping().await.unwrap();

    assert_eq!(couch.requests().await[0].path(), "/");
}

#[tokio::test]
async fn cancelled_service_sends_nothing() {
    let couch = InMemoryCouch::new();
    let (handle, cancellation) = Cancellation::pair();
    handle.cancel();

    let err = service(&couch)
        .with_cancellation(cancellation)
        .get_db("people", true)
        .await
        .unwrap_err();

    assert!(matches!(err, CouchError::Cancelled));
    assert!(couch.requests().await.is_empty());
}

#[tokio::test]
async fn endpoint_must_have_a_scheme() {
    let err = CouchService::new("localhost:5984", InMemoryCouch::new()).unwrap_err();
    assert!(matches!(err, CouchError::InvalidEndpoint(_)));

    let service = CouchService::builder(ENDPOINT)
        .credentials("admin", "secret")
        .build(InMemoryCouch::new())
        .unwrap();
    assert_eq!(service.endpoint(), "http://localhost:5984/");
}
