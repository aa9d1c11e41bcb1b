//! JSON HTTP surface over `Graph`. Thin by design: each handler parses a
//! request, dispatches into the synchronous engine via `spawn_blocking`, and
//! serializes the result. No Bolt framing, no routing-layer cleverness —
//! just `axum` doing what it already does well.

mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::model::{NodeId, PropertyMap, Value};
use crate::tx::{TxId, TxMode};
use crate::{Error, Graph};

pub use types::*;

#[derive(Clone)]
pub struct AppState {
    graph: Arc<Graph>,
}

impl AppState {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self { graph }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/cypher", post(cypher))
        .route("/transaction/begin", post(transaction_begin))
        .route("/transaction/commit", post(transaction_commit))
        .route("/transaction/rollback", post(transaction_rollback))
        .route("/node/:id", get(get_node))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Wraps `Error` for `IntoResponse`, mapping Neo4j-style codes onto HTTP
/// statuses the way a Cypher-over-HTTP client expects.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = if code.starts_with("Neo.ClientError.Statement.EntityNotFound") {
            StatusCode::NOT_FOUND
        } else if code.starts_with("Neo.ClientError.") {
            StatusCode::BAD_REQUEST
        } else if code.starts_with("Neo.TransientError.") {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = ErrorBody { error: self.0.to_string(), code: code.to_string(), message: self.0.to_string() };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Reads an optional `X-Transaction-Id` header off a `/cypher` request —
/// present, the query runs staged inside that transaction; absent, it runs
/// auto-commit.
fn transaction_id(headers: &HeaderMap) -> Result<Option<TxId>, ApiError> {
    match headers.get("x-transaction-id") {
        None => Ok(None),
        Some(v) => {
            let text = v.to_str().map_err(|_| ApiError(Error::TxError("invalid X-Transaction-Id header".into())))?;
            let id: u64 = text
                .parse()
                .map_err(|_| ApiError(Error::TxError(format!("invalid X-Transaction-Id '{text}'"))))?;
            Ok(Some(TxId(id)))
        }
    }
}

fn json_to_params(params: Option<serde_json::Value>) -> PropertyMap {
    match params {
        Some(serde_json::Value::Object(map)) => {
            map.into_iter().map(|(k, v)| (k, json_to_value(v))).collect()
        }
        _ => PropertyMap::new(),
    }
}

fn json_to_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(map) => {
            Value::Map(map.into_iter().map(|(k, v)| (k, json_to_value(v))).collect())
        }
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::json!(i),
        Value::Float(f) => serde_json::json!(f),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::json!(b),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => {
            serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect())
        }
        Value::Node(n) => serde_json::json!({
            "id": n.id.0,
            "labels": n.labels,
            "properties": n.properties.iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect::<serde_json::Map<_, _>>(),
        }),
        Value::Relationship(r) => serde_json::json!({
            "id": r.id.0,
            "type": r.rel_type,
            "startNodeId": r.src.0,
            "endNodeId": r.dst.0,
            "properties": r.properties.iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect::<serde_json::Map<_, _>>(),
        }),
        Value::Path(p) => serde_json::json!({
            "nodes": p.nodes.iter().map(|n| value_to_json(&Value::Node(Box::new(n.clone())))).collect::<Vec<_>>(),
            "relationships": p.relationships.iter().map(|r| value_to_json(&Value::Relationship(Box::new(r.clone())))).collect::<Vec<_>>(),
        }),
        Value::Date(d) => serde_json::Value::String(d.to_string()),
        Value::Time(t) => serde_json::Value::String(t.to_string()),
        Value::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
        Value::LocalDateTime(dt) => serde_json::Value::String(dt.to_string()),
        Value::Duration(d) => serde_json::Value::String(format!("P{}M{}DT{}S", d.months, d.days, d.seconds)),
        Value::Point2D { srid, x, y } => serde_json::json!({ "srid": srid, "x": x, "y": y }),
        Value::Point3D { srid, x, y, z } => serde_json::json!({ "srid": srid, "x": x, "y": y, "z": z }),
    }
}

fn result_to_response(result: crate::execution::QueryResult) -> QueryResponse {
    let keys = result.columns.clone();
    let records = result
        .rows
        .into_iter()
        .map(|row| {
            row.values
                .into_iter()
                .map(|(key, value)| (key, value_to_json(&value)))
                .collect::<HashMap<_, _>>()
        })
        .collect();

    QueryResponse {
        records,
        keys,
        summary: QuerySummary {
            counters: StatsCounters {
                nodes_created: result.stats.nodes_created,
                nodes_deleted: result.stats.nodes_deleted,
                relationships_created: result.stats.relationships_created,
                relationships_deleted: result.stats.relationships_deleted,
                properties_set: result.stats.properties_set,
            },
        },
        bookmarks: None,
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let graph = state.graph.clone();
    let (schema_version, node_count, relationship_count) = tokio::task::spawn_blocking(move || {
        let schema_version = graph.schema().get_current_version()?;
        let node_count = graph.store().node_count()?;
        let relationship_count = graph.store().relationship_count()?;
        Ok::<_, Error>((schema_version, node_count, relationship_count))
    })
    .await
    .map_err(|e| Error::ExecutionError(format!("blocking task panicked: {e}")))??;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        initialized: true,
        schema_version,
        node_count,
        relationship_count,
    }))
}

/// Runs a Cypher statement. With an `X-Transaction-Id` header present, the
/// statement runs staged inside that transaction's work buffer; otherwise
/// it runs auto-commit.
async fn cypher(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let tx_id = transaction_id(&headers)?;
    let graph = state.graph.clone();
    let params = json_to_params(req.parameters);
    let result = tokio::task::spawn_blocking(move || match tx_id {
        Some(tx_id) => graph.run_in(tx_id, &req.query, params),
        None => graph.run(&req.query, params),
    })
    .await
    .map_err(|e| Error::ExecutionError(format!("blocking task panicked: {e}")))??;
    Ok(Json(result_to_response(result)))
}

async fn transaction_begin(
    State(state): State<AppState>,
    Json(req): Json<BeginTransactionRequest>,
) -> Json<BeginTransactionResponse> {
    let graph = state.graph.clone();
    let timeout = req.timeout.map(Duration::from_millis);
    let tx_id = tokio::task::spawn_blocking(move || match timeout {
        Some(timeout) => graph.tx_manager().begin_with_timeout(TxMode::ReadWrite, timeout),
        None => graph.begin(TxMode::ReadWrite),
    })
    .await
    .expect("begin task panicked");

    Json(BeginTransactionResponse { transaction_id: tx_id.0 })
}

async fn transaction_commit(
    State(state): State<AppState>,
    Json(req): Json<TransactionIdRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let graph = state.graph.clone();
    let tx_id = TxId(req.transaction_id);
    tokio::task::spawn_blocking(move || graph.commit(tx_id))
        .await
        .map_err(|e| Error::ExecutionError(format!("blocking task panicked: {e}")))??;
    Ok(Json(SuccessResponse { success: true }))
}

async fn transaction_rollback(
    State(state): State<AppState>,
    Json(req): Json<TransactionIdRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let graph = state.graph.clone();
    let tx_id = TxId(req.transaction_id);
    tokio::task::spawn_blocking(move || graph.rollback(tx_id))
        .await
        .map_err(|e| Error::ExecutionError(format!("blocking task panicked: {e}")))??;
    Ok(Json(SuccessResponse { success: true }))
}

/// Fetches a single node by id, bypassing Cypher entirely — a convenience
/// lookup a thin client can use without constructing a query string.
async fn get_node(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let graph = state.graph.clone();
    let node = tokio::task::spawn_blocking(move || graph.store().get_node(NodeId(id)))
        .await
        .map_err(|e| Error::ExecutionError(format!("blocking task panicked: {e}")))??
        .ok_or_else(|| ApiError(Error::NotFound(format!("node {id}"))))?;
    Ok(Json(value_to_json(&Value::Node(Box::new(node)))))
}
