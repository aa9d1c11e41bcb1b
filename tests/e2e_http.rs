//! End-to-end tests for the JSON HTTP surface: health, auto-commit Cypher,
//! and the explicit transaction lifecycle.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use graphdb::http::{router, AppState};
use graphdb::Graph;
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_app() -> axum::Router {
    let graph = Graph::open_memory().unwrap();
    router(AppState::new(Arc::new(graph)))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["initialized"], true);
    assert_eq!(body["nodeCount"], 0);
    assert_eq!(body["relationshipCount"], 0);
}

#[tokio::test]
async fn test_cypher_autocommit_create_and_return() {
    let app = test_app();

    let request_body = json!({ "query": "CREATE (n:Person {name: 'Ada'}) RETURN n.name" });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cypher")
                .header("content-type", "application/json")
                .body(Body::from(request_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["keys"], json!(["n.name"]));
    assert_eq!(body["records"][0]["n.name"], "Ada");
    assert_eq!(body["summary"]["counters"]["nodesCreated"], 1);
}

#[tokio::test]
async fn test_cypher_syntax_error_returns_400() {
    let app = test_app();

    let request_body = json!({ "query": "THIS IS NOT CYPHER (((" });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cypher")
                .header("content-type", "application/json")
                .body(Body::from(request_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "Neo.ClientError.Statement.SyntaxError");
}

#[tokio::test]
async fn test_transaction_lifecycle_commit() {
    let app = test_app();

    let begin_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/transaction/begin")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(begin_response.status(), StatusCode::OK);
    let begin_body = body_json(begin_response).await;
    let tx_id = begin_body["transactionId"].as_u64().unwrap();

    let query_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cypher")
                .header("content-type", "application/json")
                .header("x-transaction-id", tx_id.to_string())
                .body(Body::from(json!({ "query": "CREATE (n:Person {name: 'Grace'})" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(query_response.status(), StatusCode::OK);

    // Not yet visible outside the transaction.
    let health_before = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let health_before_body = body_json(health_before).await;
    assert_eq!(health_before_body["nodeCount"], 0);

    let commit_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/transaction/commit")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "transactionId": tx_id }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(commit_response.status(), StatusCode::OK);
    let commit_body = body_json(commit_response).await;
    assert_eq!(commit_body["success"], true);

    let health_after = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let health_after_body = body_json(health_after).await;
    assert_eq!(health_after_body["nodeCount"], 1);
}

#[tokio::test]
async fn test_transaction_rollback_discards_writes() {
    let app = test_app();

    let begin_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/transaction/begin")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    let begin_body = body_json(begin_response).await;
    let tx_id = begin_body["transactionId"].as_u64().unwrap();

    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cypher")
                .header("content-type", "application/json")
                .header("x-transaction-id", tx_id.to_string())
                .body(Body::from(json!({ "query": "CREATE (n:Person {name: 'Temp'})" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let rollback_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/transaction/rollback")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "transactionId": tx_id }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(rollback_response.status(), StatusCode::OK);

    let health = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let health_body = body_json(health).await;
    assert_eq!(health_body["nodeCount"], 0, "rolled-back writes must not land in the store");
}

#[tokio::test]
async fn test_get_node_by_id() {
    let app = test_app();

    let create_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cypher")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "query": "CREATE (n:Person {name: 'Linus'}) RETURN n" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let create_body = body_json(create_response).await;
    let node_id = create_body["records"][0]["n"]["id"].as_u64().unwrap();

    let response = app
        .oneshot(Request::builder().uri(format!("/node/{node_id}")).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["labels"], json!(["Person"]));
    assert_eq!(body["properties"]["name"], "Linus");
}

#[tokio::test]
async fn test_get_node_not_found() {
    let app = test_app();

    let response = app
        .oneshot(Request::builder().uri("/node/9999").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
