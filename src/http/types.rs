//! Request/response DTOs for the HTTP API.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Deserialize)]
pub struct QueryRequest {
    /// The Cypher query text.
    pub query: String,
    /// Query parameters as a JSON object, e.g. `{"name": "Ada"}`.
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct QueryResponse {
    pub records: Vec<HashMap<String, serde_json::Value>>,
    pub keys: Vec<String>,
    pub summary: QuerySummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmarks: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct QuerySummary {
    pub counters: StatsCounters,
}

#[derive(Serialize)]
pub struct StatsCounters {
    #[serde(rename = "nodesCreated")]
    pub nodes_created: u64,
    #[serde(rename = "nodesDeleted")]
    pub nodes_deleted: u64,
    #[serde(rename = "relationshipsCreated")]
    pub relationships_created: u64,
    #[serde(rename = "relationshipsDeleted")]
    pub relationships_deleted: u64,
    #[serde(rename = "propertiesSet")]
    pub properties_set: u64,
}

#[derive(Deserialize, Default)]
pub struct BeginTransactionRequest {
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[derive(Serialize)]
pub struct BeginTransactionResponse {
    #[serde(rename = "transactionId")]
    pub transaction_id: u64,
}

#[derive(Deserialize)]
pub struct TransactionIdRequest {
    #[serde(rename = "transactionId")]
    pub transaction_id: u64,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub initialized: bool,
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "nodeCount")]
    pub node_count: u64,
    #[serde(rename = "relationshipCount")]
    pub relationship_count: u64,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    /// Neo4j-style namespaced status code.
    pub code: String,
    pub message: String,
}
