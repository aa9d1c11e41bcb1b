//! # graphdb — an embedded property graph database
//!
//! A Neo4j-wire-compatible property graph store: a Cypher subset compiled
//! to a typed AST and interpreted directly against a row-structured
//! SQLite-backed store, with ACID transactions, versioned schema
//! migrations, and an async Driver/Session/Result client stack on top.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graphdb::{Graph, Value, PropertyMap};
//!
//! # fn example() -> graphdb::Result<()> {
//! let graph = Graph::open_memory()?;
//!
//! let mut params = PropertyMap::new();
//! params.insert("name".into(), Value::from("Ada"));
//! let result = graph.run("CREATE (n:Person {name: $name}) RETURN n", params)?;
//!
//! for row in &result.rows {
//!     println!("{:?}", row.get_value("n"));
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod cypher;
pub mod view;
pub mod execution;
pub mod store;
pub mod schema;
pub mod tx;
pub mod driver;
pub mod http;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{Node, NodeId, Path, Direction, PropertyMap, RelId, Relationship, Value};

// ============================================================================
// Re-exports: Execution
// ============================================================================

pub use execution::{QueryResult, ResultRow};

// ============================================================================
// Re-exports: Transactions
// ============================================================================

pub use tx::{TxId, TxMode};

// ============================================================================
// Top-level embedded handle
// ============================================================================

use std::path::Path as FsPath;
use std::sync::Arc;

use tracing::instrument;

/// The embedded entry point: a store, its schema manager, and the
/// transaction manager that mediates isolated writes against it.
///
/// `Graph` is synchronous — every method here runs a query to completion on
/// the calling thread. The async `driver` module is the boundary that
/// offloads these calls onto a blocking thread pool.
pub struct Graph {
    store: store::Store,
    schema: schema::SchemaManager,
    tx_manager: Arc<tx::TransactionManager>,
}

impl Graph {
    pub fn open(path: impl AsRef<FsPath>) -> Result<Self> {
        let store = store::Store::open(path)?;
        Self::from_store(store)
    }

    pub fn open_memory() -> Result<Self> {
        let store = store::Store::open_memory()?;
        Self::from_store(store)
    }

    fn from_store(store: store::Store) -> Result<Self> {
        let schema = schema::SchemaManager::new(store.clone(), schema::SchemaManager::default_migrations())?;
        schema.run_migrations()?;
        let tx_manager = Arc::new(tx::TransactionManager::new(store.clone()));
        Ok(Self { store, schema, tx_manager })
    }

    /// Parse and run a statement in auto-commit mode: writes land directly
    /// in the store, no transaction survives the call.
    #[instrument(skip(self, params))]
    pub fn run(&self, query: &str, params: impl Into<PropertyMap>) -> Result<QueryResult> {
        let statement = cypher::parse(query)?;
        let mut store = self.store.clone();
        execution::execute_statement(&mut store, &statement, &params.into())
    }

    pub fn begin(&self, mode: TxMode) -> TxId {
        self.tx_manager.begin(mode)
    }

    /// Runs a statement inside a previously-begun transaction; writes are
    /// staged in that transaction's work buffer until `commit`.
    pub fn run_in(&self, tx: TxId, query: &str, params: impl Into<PropertyMap>) -> Result<QueryResult> {
        let statement = cypher::parse(query)?;
        let params = params.into();
        self.tx_manager.with_view(tx, |view| execution::execute_statement(view, &statement, &params))
    }

    pub fn commit(&self, tx: TxId) -> Result<()> {
        self.tx_manager.commit(tx)
    }

    pub fn rollback(&self, tx: TxId) -> Result<()> {
        self.tx_manager.rollback(tx)
    }

    pub fn schema(&self) -> &schema::SchemaManager {
        &self.schema
    }

    pub fn tx_manager(&self) -> &Arc<tx::TransactionManager> {
        &self.tx_manager
    }

    pub fn store(&self) -> &store::Store {
        &self.store
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Neo4j-style namespaced status codes: `Neo.<Classification>.<Category>.<Title>`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cypher syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Semantic error: {0}")]
    SemanticError(String),

    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("Planning error: {0}")]
    PlanError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Transaction error: {0}")]
    TxError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The Neo4j-style status code a driver/HTTP client would see.
    pub fn code(&self) -> &'static str {
        match self {
            Error::SyntaxError { .. } => "Neo.ClientError.Statement.SyntaxError",
            Error::SemanticError(msg) if msg.contains("parameter") => "Neo.ClientError.Statement.ParameterMissing",
            Error::SemanticError(_) => "Neo.ClientError.Statement.SemanticError",
            Error::TypeError { .. } => "Neo.ClientError.Statement.TypeError",
            Error::ExecutionError(msg) if msg.contains("Neo.ClientError.Statement.NotImplemented") => {
                "Neo.ClientError.Statement.NotImplemented"
            }
            Error::ExecutionError(_) => "Neo.DatabaseError.Statement.ExecutionFailed",
            Error::PlanError(_) => "Neo.DatabaseError.Statement.ExecutionFailed",
            Error::StorageError(msg) if msg.contains("locked") || msg.contains("busy") => {
                "Neo.TransientError.General.DatabaseUnavailable"
            }
            Error::StorageError(_) => "Neo.DatabaseError.General.UnknownError",
            Error::TxError(_) => "Neo.ClientError.Transaction.TransactionNotFound",
            Error::NotFound(_) => "Neo.ClientError.Statement.EntityNotFound",
            Error::ConstraintViolation(_) => "Neo.ClientError.Schema.ConstraintValidationFailed",
            Error::Io(_) => "Neo.DatabaseError.General.UnknownError",
        }
    }

    /// Whether a driver should retry the transaction this error occurred in.
    pub fn is_retryable(&self) -> bool {
        self.code().starts_with("Neo.TransientError.")
    }
}

pub type Result<T> = std::result::Result<T, Error>;
