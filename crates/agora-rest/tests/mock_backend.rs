//! Mock server tests for the REST backend.
//!
//! These tests use wiremock to simulate the hosted REST API and check the
//! requests the backend sends and how it maps responses.

use agora_core::error::{AuthError, Error};
use agora_core::repo::{ActionKind, Filter, Query, QueuedAction, Record};
use agora_core::traits::Backend;
use agora_core::types::{Collection, RecordId, ServiceUrl};
use agora_rest::{RestBackend, RestConfig};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> RestBackend {
    let url = ServiceUrl::new(format!("http://127.0.0.1:{}", server.address().port())).unwrap();
    RestBackend::new(RestConfig::new(url, "anon-key").with_access_token("user-jwt")).unwrap()
}

fn posts() -> Collection {
    Collection::new("posts").unwrap()
}

fn row(value: serde_json::Value) -> Record {
    Record::new(value).unwrap()
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn test_select_sends_query_and_auth() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/posts"))
        .and(query_param("select", "*,profiles(username)"))
        .and(query_param("category_id", "eq.c1"))
        .and(query_param("order", "created_at.desc"))
        .and(query_param("limit", "20"))
        .and(header("apikey", "anon-key"))
        .and(header("authorization", "Bearer user-jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "p2", "title": "Second", "profiles": {"username": "ana"}},
            {"id": "p1", "title": "First", "profiles": {"username": "bo"}}
        ])))
        .mount(&server)
        .await;

    let query = Query::new()
        .select("*,profiles(username)")
        .filter(Filter::eq("category_id", "c1"))
        .order("created_at", true)
        .limit(20);

    let rows = backend(&server).select(&posts(), &query).await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id().unwrap().as_str(), "p2");
    assert_eq!(rows[0].get("profiles").unwrap()["username"], "ana");
}

#[tokio::test]
async fn test_fetch_one_uses_join_expression() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/posts"))
        .and(query_param("id", "eq.p1"))
        .and(query_param("select", "*,profiles(username)"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "p1", "profiles": {"username": "ana"}}
        ])))
        .mount(&server)
        .await;

    let record = backend(&server)
        .fetch_one(
            &posts(),
            &RecordId::new("p1").unwrap(),
            Some("*,profiles(username)"),
        )
        .await
        .unwrap();

    assert_eq!(record.get("profiles").unwrap()["username"], "ana");
}

#[tokio::test]
async fn test_fetch_one_missing_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let err = backend(&server)
        .fetch_one(&posts(), &RecordId::new("gone").unwrap(), None)
        .await
        .unwrap_err();

    match err {
        Error::Protocol(p) => assert!(p.is_not_found()),
        other => panic!("unexpected error {:?}", other),
    }
}

// ============================================================================
// Mutations
// ============================================================================

#[tokio::test]
async fn test_insert_returns_representation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/posts"))
        .and(header("prefer", "return=representation"))
        .and(body_json(json!({"title": "Hello"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            {"id": "p9", "title": "Hello", "created_at": "2026-10-17T10:00:00Z"}
        ])))
        .mount(&server)
        .await;

    let stored = backend(&server)
        .insert(&posts(), &row(json!({"title": "Hello"})))
        .await
        .unwrap();

    assert_eq!(stored.id().unwrap().as_str(), "p9");
}

#[tokio::test]
async fn test_apply_update_patches_by_id() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/posts"))
        .and(query_param("id", "eq.p1"))
        .and(body_json(json!({"id": "p1", "title": "Edited"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let action = QueuedAction::new(
        ActionKind::Update,
        posts(),
        row(json!({"id": "p1", "title": "Edited"})),
    )
    .unwrap();

    backend(&server).apply(&action).await.unwrap();
}

#[tokio::test]
async fn test_apply_delete_filters_by_id() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/posts"))
        .and(query_param("id", "eq.p1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let action =
        QueuedAction::new(ActionKind::Delete, posts(), row(json!({"id": "p1"}))).unwrap();

    backend(&server).apply(&action).await.unwrap();
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn test_error_body_is_mapped() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/posts"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint",
            "details": "Key (id)=(p1) already exists.",
            "hint": null
        })))
        .mount(&server)
        .await;

    let err = backend(&server)
        .insert(&posts(), &row(json!({"id": "p1"})))
        .await
        .unwrap_err();

    assert!(!err.is_transient());
    let text = err.to_string();
    assert!(text.contains("409"));
    assert!(text.contains("23505"));
    assert!(text.contains("already exists"));
}

#[tokio::test]
async fn test_unauthorized_is_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/posts"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "JWT expired"
        })))
        .mount(&server)
        .await;

    let err = backend(&server)
        .select(&posts(), &Query::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::Rejected(ref m)) if m == "JWT expired"));
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/posts"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = backend(&server)
        .delete(&posts(), &Filter::eq("id", "p1"))
        .await
        .unwrap_err();

    assert!(err.is_transient());
}
