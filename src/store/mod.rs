//! Row store — the persistent `nodes` / `relationships` / `schema_version`
//! tables and the id generators layered on top of them.
//!
//! Every call that embeds caller data goes through `rusqlite::params!`
//! (positional binding) — never string interpolation, per the remediation
//! this crate carries forward from the reference prototype's SQL injection
//! issue.

use std::path::Path as FsPath;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use serde_json::Value as Json;
use tracing::instrument;

use crate::cypher::ast::PatternDirection;
use crate::model::{Node, NodeId, PropertyMap, RelId, Relationship, Value};
use crate::{Error, Result};

pub const REQUIRED_TABLES: &[&str] = &["nodes", "relationships", "schema_version"];
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_nodes_labels",
    "idx_relationships_start",
    "idx_relationships_end",
    "idx_relationships_type",
];

/// The embedded row store. Cheap to clone — holds a pooled connection and
/// shared id generators.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    pool: Pool<SqliteConnectionManager>,
    next_node_id: AtomicU64,
    next_rel_id: AtomicU64,
}

impl Store {
    /// Open (creating if absent) the store at `path`. `:memory:` opens an
    /// in-memory database for tests and embedding.
    #[instrument(skip(path))]
    pub fn open(path: impl AsRef<FsPath>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path.as_ref());
        let pool = Pool::new(manager).map_err(|e| Error::StorageError(e.to_string()))?;
        Self::from_pool(pool)
    }

    pub fn open_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        // r2d2 pools a memory-backed connection manager to a single physical
        // connection so every pooled checkout shares the same in-memory db.
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| Error::StorageError(e.to_string()))?;
        Self::from_pool(pool)
    }

    fn from_pool(pool: Pool<SqliteConnectionManager>) -> Result<Self> {
        let conn = pool.get().map_err(|e| Error::StorageError(e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                description TEXT,
                applied_at TEXT
            );",
        )
        .map_err(|e| Error::StorageError(e.to_string()))?;

        let next_node: i64 = conn
            .query_row("SELECT COALESCE(MAX(id), 0) FROM nodes", [], |r| r.get(0))
            .unwrap_or(0);
        let next_rel: i64 = conn
            .query_row("SELECT COALESCE(MAX(id), 0) FROM relationships", [], |r| r.get(0))
            .unwrap_or(0);

        Ok(Self {
            inner: Arc::new(StoreInner {
                pool,
                next_node_id: AtomicU64::new(next_node as u64 + 1),
                next_rel_id: AtomicU64::new(next_rel as u64 + 1),
            }),
        })
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.inner.pool.get().map_err(|e| Error::StorageError(e.to_string()))
    }

    /// Run `f` with a raw connection — used by the schema manager to apply
    /// migrations directly against the store.
    pub fn with_connection<T>(&self, f: impl FnOnce(&rusqlite::Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.conn()?;
        f(&conn).map_err(|e| Error::StorageError(e.to_string()))
    }

    pub fn next_node_id(&self) -> NodeId {
        NodeId(self.inner.next_node_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn next_rel_id(&self) -> RelId {
        RelId(self.inner.next_rel_id.fetch_add(1, Ordering::SeqCst))
    }

    // ------------------------------------------------------------------
    // Node reads
    // ------------------------------------------------------------------

    pub fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        let conn = self.conn()?;
        row_to_node_opt(conn.query_row(
            "SELECT id, labels, properties, created_at, updated_at FROM nodes WHERE id = ?1",
            params![id.0 as i64],
            node_from_row,
        ))
    }

    pub fn all_nodes(&self) -> Result<Vec<Node>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, labels, properties, created_at, updated_at FROM nodes ORDER BY id")
            .map_err(|e| Error::StorageError(e.to_string()))?;
        let rows = stmt
            .query_map([], node_from_row)
            .map_err(|e| Error::StorageError(e.to_string()))?;
        collect_rows(rows)
    }

    /// Nodes carrying every label in `labels`, pre-filtered in SQL via
    /// `json_each`, then exact-matched against `props` in Rust.
    pub fn find_nodes(&self, labels: &[String], props: &PropertyMap) -> Result<Vec<Node>> {
        let conn = self.conn()?;
        let candidates: Vec<Node> = if labels.is_empty() {
            let mut stmt = conn
                .prepare("SELECT id, labels, properties, created_at, updated_at FROM nodes ORDER BY id")
                .map_err(|e| Error::StorageError(e.to_string()))?;
            collect_rows(stmt.query_map([], node_from_row).map_err(|e| Error::StorageError(e.to_string()))?)?
        } else {
            let mut sql = String::from(
                "SELECT id, labels, properties, created_at, updated_at FROM nodes WHERE ",
            );
            for (i, _) in labels.iter().enumerate() {
                if i > 0 {
                    sql.push_str(" AND ");
                }
                sql.push_str(&format!(
                    "EXISTS (SELECT 1 FROM json_each(labels) WHERE value = ?{})",
                    i + 1
                ));
            }
            sql.push_str(" ORDER BY id");
            let mut stmt = conn.prepare(&sql).map_err(|e| Error::StorageError(e.to_string()))?;
            let label_params: Vec<&dyn rusqlite::ToSql> =
                labels.iter().map(|l| l as &dyn rusqlite::ToSql).collect();
            collect_rows(
                stmt.query_map(label_params.as_slice(), node_from_row)
                    .map_err(|e| Error::StorageError(e.to_string()))?,
            )?
        };

        Ok(candidates
            .into_iter()
            .filter(|n| props.iter().all(|(k, v)| n.properties.get(k) == Some(v)))
            .collect())
    }

    pub fn node_count(&self) -> Result<u64> {
        let conn = self.conn()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get(0))
            .map_err(|e| Error::StorageError(e.to_string()))?;
        Ok(n as u64)
    }

    // ------------------------------------------------------------------
    // Relationship reads
    // ------------------------------------------------------------------

    pub fn get_relationship(&self, id: RelId) -> Result<Option<Relationship>> {
        let conn = self.conn()?;
        row_to_rel_opt(conn.query_row(
            "SELECT id, type, start_node_id, end_node_id, properties, created_at FROM relationships WHERE id = ?1",
            params![id.0 as i64],
            rel_from_row,
        ))
    }

    /// Relationships incident on `node`, filtered by direction and (if
    /// non-empty) type set.
    pub fn relationships_incident(
        &self,
        node: NodeId,
        direction: PatternDirection,
        types: &[String],
    ) -> Result<Vec<Relationship>> {
        let conn = self.conn()?;
        let base = "SELECT id, type, start_node_id, end_node_id, properties, created_at FROM relationships WHERE ";
        let (clause, id_first) = match direction {
            PatternDirection::Right => ("start_node_id = ?1", true),
            PatternDirection::Left => ("end_node_id = ?1", true),
            PatternDirection::Both => ("(start_node_id = ?1 OR end_node_id = ?1)", true),
        };
        let _ = id_first;
        let mut sql = format!("{base}{clause}");
        if !types.is_empty() {
            let placeholders: Vec<String> =
                (0..types.len()).map(|i| format!("?{}", i + 2)).collect();
            sql.push_str(&format!(" AND type IN ({})", placeholders.join(", ")));
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = conn.prepare(&sql).map_err(|e| Error::StorageError(e.to_string()))?;
        let node_id_i64 = node.0 as i64;
        let mut bound: Vec<&dyn rusqlite::ToSql> = vec![&node_id_i64];
        for t in types {
            bound.push(t as &dyn rusqlite::ToSql);
        }
        collect_rows(stmt.query_map(bound.as_slice(), rel_from_row).map_err(|e| Error::StorageError(e.to_string()))?)
    }

    pub fn relationship_count(&self) -> Result<u64> {
        let conn = self.conn()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM relationships", [], |r| r.get(0))
            .map_err(|e| Error::StorageError(e.to_string()))?;
        Ok(n as u64)
    }

    // ------------------------------------------------------------------
    // Writes (auto-commit path — called directly, no work buffer)
    // ------------------------------------------------------------------

    pub fn insert_node(&self, node: &Node) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO nodes (id, labels, properties, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                node.id.0 as i64,
                labels_json(&node.labels),
                props_json(&node.properties)?,
                node.created_at.to_rfc3339(),
                node.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::StorageError(e.to_string()))?;
        Ok(())
    }

    pub fn insert_relationship(&self, rel: &Relationship) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO relationships (id, type, start_node_id, end_node_id, properties, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                rel.id.0 as i64,
                rel.rel_type,
                rel.src.0 as i64,
                rel.dst.0 as i64,
                props_json(&rel.properties)?,
                rel.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::StorageError(e.to_string()))?;
        Ok(())
    }

    pub fn delete_node_row(&self, id: NodeId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM nodes WHERE id = ?1", params![id.0 as i64])
            .map_err(|e| Error::StorageError(e.to_string()))?;
        Ok(())
    }

    pub fn delete_relationship_row(&self, id: RelId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM relationships WHERE id = ?1", params![id.0 as i64])
            .map_err(|e| Error::StorageError(e.to_string()))?;
        Ok(())
    }

    pub fn set_node_properties(&self, id: NodeId, properties: &PropertyMap) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE nodes SET properties = ?1, updated_at = ?2 WHERE id = ?3",
            params![props_json(properties)?, Utc::now().to_rfc3339(), id.0 as i64],
        )
        .map_err(|e| Error::StorageError(e.to_string()))?;
        Ok(())
    }

    pub fn set_node_labels(&self, id: NodeId, labels: &[String]) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE nodes SET labels = ?1, updated_at = ?2 WHERE id = ?3",
            params![labels_json(labels), Utc::now().to_rfc3339(), id.0 as i64],
        )
        .map_err(|e| Error::StorageError(e.to_string()))?;
        Ok(())
    }

    pub fn set_relationship_properties(&self, id: RelId, properties: &PropertyMap) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE relationships SET properties = ?1 WHERE id = ?2",
            params![props_json(properties)?, id.0 as i64],
        )
        .map_err(|e| Error::StorageError(e.to_string()))?;
        Ok(())
    }

    pub fn relationship_count_for_node(&self, id: NodeId) -> Result<u64> {
        let conn = self.conn()?;
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM relationships WHERE start_node_id = ?1 OR end_node_id = ?1",
                params![id.0 as i64],
                |r| r.get(0),
            )
            .map_err(|e| Error::StorageError(e.to_string()))?;
        Ok(n as u64)
    }
}

impl crate::view::GraphView for Store {
    fn find_nodes(&self, labels: &[String], props: &PropertyMap) -> Result<Vec<Node>> {
        Store::find_nodes(self, labels, props)
    }

    fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        Store::get_node(self, id)
    }

    fn relationships_from(
        &self,
        node: NodeId,
        direction: PatternDirection,
        types: &[String],
    ) -> Result<Vec<Relationship>> {
        self.relationships_incident(node, direction, types)
    }

    fn get_relationship(&self, id: RelId) -> Result<Option<Relationship>> {
        Store::get_relationship(self, id)
    }

    fn create_node(&mut self, labels: Vec<String>, props: PropertyMap) -> Result<Node> {
        let node = Node {
            id: self.next_node_id(),
            element_id: None,
            labels,
            properties: props,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.insert_node(&node)?;
        Ok(node)
    }

    fn create_relationship(
        &mut self,
        src: NodeId,
        dst: NodeId,
        rel_type: String,
        props: PropertyMap,
    ) -> Result<Relationship> {
        let rel = Relationship {
            id: self.next_rel_id(),
            element_id: None,
            src,
            dst,
            rel_type,
            properties: props,
            created_at: Utc::now(),
        };
        self.insert_relationship(&rel)?;
        Ok(rel)
    }

    fn delete_node(&mut self, id: NodeId) -> Result<()> {
        if self.relationship_count_for_node(id)? > 0 {
            return Err(Error::ConstraintViolation(format!(
                "node {id} still has relationships; use DETACH DELETE"
            )));
        }
        self.delete_node_row(id)
    }

    fn detach_delete_node(&mut self, id: NodeId) -> Result<()> {
        for rel in self.relationships_incident(id, PatternDirection::Both, &[])? {
            self.delete_relationship_row(rel.id)?;
        }
        self.delete_node_row(id)
    }

    fn delete_relationship(&mut self, id: RelId) -> Result<()> {
        self.delete_relationship_row(id)
    }

    fn set_node_property(&mut self, id: NodeId, key: &str, value: Value) -> Result<()> {
        let mut node = self
            .get_node(id)?
            .ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        node.properties.insert(key.to_string(), value);
        self.set_node_properties(id, &node.properties)
    }

    fn set_node_properties(&mut self, id: NodeId, props: PropertyMap) -> Result<()> {
        Store::set_node_properties(self, id, &props)
    }

    fn set_relationship_property(&mut self, id: RelId, key: &str, value: Value) -> Result<()> {
        let mut rel = self
            .get_relationship(id)?
            .ok_or_else(|| Error::NotFound(format!("relationship {id}")))?;
        rel.properties.insert(key.to_string(), value);
        self.set_relationship_properties(id, &rel.properties)
    }

    fn add_label(&mut self, id: NodeId, label: &str) -> Result<()> {
        let mut node = self
            .get_node(id)?
            .ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        if !node.labels.iter().any(|l| l == label) {
            node.labels.push(label.to_string());
        }
        self.set_node_labels(id, &node.labels)
    }
}

fn labels_json(labels: &[String]) -> String {
    Json::Array(labels.iter().map(|l| Json::String(l.clone())).collect()).to_string()
}

fn props_json(props: &PropertyMap) -> Result<String> {
    serde_json::to_string(props).map_err(|e| Error::StorageError(e.to_string()))
}

fn node_from_row(row: &rusqlite::Row) -> rusqlite::Result<Node> {
    let id: i64 = row.get(0)?;
    let labels_raw: String = row.get(1)?;
    let props_raw: String = row.get(2)?;
    let created_at: String = row.get(3)?;
    let updated_at: String = row.get(4)?;

    let labels: Vec<String> = serde_json::from_str(&labels_raw).unwrap_or_default();
    let properties: PropertyMap = serde_json::from_str(&props_raw).unwrap_or_default();

    Ok(Node {
        id: NodeId(id as u64),
        element_id: Some(format!("4:{id}")),
        labels,
        properties,
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
    })
}

fn rel_from_row(row: &rusqlite::Row) -> rusqlite::Result<Relationship> {
    let id: i64 = row.get(0)?;
    let rel_type: String = row.get(1)?;
    let start: i64 = row.get(2)?;
    let end: i64 = row.get(3)?;
    let props_raw: String = row.get(4)?;
    let created_at: String = row.get(5)?;

    let properties: PropertyMap = serde_json::from_str(&props_raw).unwrap_or_default();

    Ok(Relationship {
        id: RelId(id as u64),
        element_id: Some(format!("5:{id}")),
        src: NodeId(start as u64),
        dst: NodeId(end as u64),
        rel_type,
        properties,
        created_at: parse_rfc3339(&created_at),
    })
}

fn parse_rfc3339(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_node_opt(r: rusqlite::Result<Node>) -> Result<Option<Node>> {
    match r {
        Ok(n) => Ok(Some(n)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::StorageError(e.to_string())),
    }
}

fn row_to_rel_opt(r: rusqlite::Result<Relationship>) -> Result<Option<Relationship>> {
    match r {
        Ok(rel) => Ok(Some(rel)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::StorageError(e.to_string())),
    }
}

fn collect_rows<T>(rows: rusqlite::MappedRows<impl FnMut(&rusqlite::Row) -> rusqlite::Result<T>>) -> Result<Vec<T>> {
    rows.collect::<rusqlite::Result<Vec<T>>>().map_err(|e| Error::StorageError(e.to_string()))
}

/// Best-effort lookup that swallows "no such table" errors into `None`,
/// used by the schema manager's history query on a not-yet-migrated store.
pub fn optional_query<T>(
    conn: &rusqlite::Connection,
    sql: &str,
    f: impl FnOnce(&rusqlite::Row) -> rusqlite::Result<T>,
) -> rusqlite::Result<Option<T>> {
    conn.query_row(sql, [], f).optional()
}
