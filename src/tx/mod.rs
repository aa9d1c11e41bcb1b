//! Transaction manager — work-buffer isolation on top of the row store.
//!
//! A transaction never touches committed rows directly. Reads are
//! `committed ∪ buffer-creates − buffer-deletes`; writes land only in the
//! buffer until `commit` flushes them in a fixed order: nodes, then
//! relationships, then relationship deletes, then node deletes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cypher::ast::PatternDirection;
use crate::model::{Node, NodeId, PropertyMap, RelId, Relationship, Value};
use crate::store::Store;
use crate::view::GraphView;
use crate::{Error, Result};

/// Transaction mode — read-write transactions may stage writes, read-only
/// transactions reject them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

/// Opaque transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Active,
    Committed,
    RolledBack,
    Expired,
}

/// Staged writes not yet flushed to the store.
#[derive(Default)]
pub struct WorkBuffer {
    nodes: HashMap<NodeId, Node>,
    relationships: HashMap<RelId, Relationship>,
    created_node_ids: HashSet<NodeId>,
    created_rel_ids: HashSet<RelId>,
    deleted_node_ids: HashSet<NodeId>,
    deleted_rel_ids: HashSet<RelId>,
}

/// A running (or finished) transaction: identity, mode, timeout and its
/// staged buffer.
pub struct Transaction {
    pub id: TxId,
    pub mode: TxMode,
    pub created_at: DateTime<Utc>,
    pub timeout: Duration,
    pub metadata: HashMap<String, String>,
    buffer: WorkBuffer,
    state: TxState,
}

impl Transaction {
    fn is_expired(&self) -> bool {
        Utc::now().signed_duration_since(self.created_at)
            > chrono::Duration::from_std(self.timeout).unwrap_or(chrono::Duration::MAX)
    }
}

/// Owns the set of live transactions and the shared store they read
/// through and flush into.
pub struct TransactionManager {
    store: Store,
    next_id: AtomicU64,
    transactions: Arc<Mutex<HashMap<TxId, Transaction>>>,
    default_timeout: Duration,
}

impl TransactionManager {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            next_id: AtomicU64::new(1),
            transactions: Arc::new(Mutex::new(HashMap::new())),
            default_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn begin(&self, mode: TxMode) -> TxId {
        self.begin_with_timeout(mode, self.default_timeout)
    }

    pub fn begin_with_timeout(&self, mode: TxMode, timeout: Duration) -> TxId {
        let id = TxId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let tx = Transaction {
            id,
            mode,
            created_at: Utc::now(),
            timeout,
            metadata: HashMap::new(),
            buffer: WorkBuffer::default(),
            state: TxState::Active,
        };
        self.transactions.lock().insert(id, tx);
        id
    }

    /// Lazily resolves expiry: a still-`Active` transaction past its
    /// timeout reports `Expired` without a background sweeper.
    pub fn get_state(&self, id: TxId) -> Result<TxState> {
        let mut guard = self.transactions.lock();
        let tx = guard.get_mut(&id).ok_or_else(|| Error::TxError(format!("no such transaction {id}")))?;
        if tx.state == TxState::Active && tx.is_expired() {
            tx.state = TxState::Expired;
        }
        Ok(tx.state)
    }

    pub fn is_active(&self, id: TxId) -> Result<bool> {
        Ok(self.get_state(id)? == TxState::Active)
    }

    /// Runs `f` against this transaction's isolated view. Fails if the
    /// transaction isn't active (including lazily-discovered expiry).
    pub fn with_view<R>(&self, id: TxId, f: impl FnOnce(&mut WorkBufferView<'_>) -> Result<R>) -> Result<R> {
        if !self.is_active(id)? {
            return Err(Error::TxError(format!("transaction {id} is not active")));
        }
        let mut guard = self.transactions.lock();
        let tx = guard.get_mut(&id).expect("checked active above");
        if tx.mode == TxMode::ReadOnly {
            // still permit reads through the same view; writes will fail
            // inside WorkBufferView's mutating methods via the store error
        }
        let mut view = WorkBufferView { store: &self.store, buffer: &mut tx.buffer };
        f(&mut view)
    }

    /// Flushes the buffer in order (node creates/updates, relationship
    /// creates/updates, relationship deletes, node deletes) and marks the
    /// transaction committed.
    pub fn commit(&self, id: TxId) -> Result<()> {
        let mut guard = self.transactions.lock();
        let tx = guard.get_mut(&id).ok_or_else(|| Error::TxError(format!("no such transaction {id}")))?;
        if tx.state != TxState::Active {
            return Err(Error::TxError(format!("transaction {id} is not active")));
        }

        for (id, node) in tx.buffer.nodes.drain() {
            if tx.buffer.created_node_ids.contains(&id) {
                self.store.insert_node(&node)?;
            } else {
                self.store.set_node_properties(id, &node.properties)?;
                self.store.set_node_labels(id, &node.labels)?;
            }
        }
        for (id, rel) in tx.buffer.relationships.drain() {
            if tx.buffer.created_rel_ids.contains(&id) {
                self.store.insert_relationship(&rel)?;
            } else {
                self.store.set_relationship_properties(id, &rel.properties)?;
            }
        }
        for id in tx.buffer.deleted_rel_ids.drain() {
            self.store.delete_relationship_row(id)?;
        }
        for id in tx.buffer.deleted_node_ids.drain() {
            self.store.delete_node_row(id)?;
        }

        tx.state = TxState::Committed;
        Ok(())
    }

    pub fn rollback(&self, id: TxId) -> Result<()> {
        let mut guard = self.transactions.lock();
        let tx = guard.get_mut(&id).ok_or_else(|| Error::TxError(format!("no such transaction {id}")))?;
        if tx.state != TxState::Active {
            return Err(Error::TxError(format!("transaction {id} is not active")));
        }
        tx.buffer = WorkBuffer::default();
        tx.state = TxState::RolledBack;
        Ok(())
    }

    /// Sweeps finished/expired transactions out of the live map, returning
    /// how many were removed. Not required for correctness (expiry is
    /// checked lazily) — bounds memory for long-lived drivers.
    pub fn cleanup_expired(&self) -> usize {
        let mut guard = self.transactions.lock();
        let before = guard.len();
        guard.retain(|_, tx| {
            if tx.state == TxState::Active && tx.is_expired() {
                tx.state = TxState::Expired;
            }
            tx.state == TxState::Active
        });
        before - guard.len()
    }
}

/// A transaction's isolated view over the store: reads overlay the buffer
/// on committed rows, writes land only in the buffer.
pub struct WorkBufferView<'a> {
    store: &'a Store,
    buffer: &'a mut WorkBuffer,
}

impl<'a> WorkBufferView<'a> {
    fn effective_node(&self, id: NodeId) -> Result<Option<Node>> {
        if self.buffer.deleted_node_ids.contains(&id) {
            return Ok(None);
        }
        if let Some(n) = self.buffer.nodes.get(&id) {
            return Ok(Some(n.clone()));
        }
        self.store.get_node(id)
    }

    fn effective_relationship(&self, id: RelId) -> Result<Option<Relationship>> {
        if self.buffer.deleted_rel_ids.contains(&id) {
            return Ok(None);
        }
        if let Some(r) = self.buffer.relationships.get(&id) {
            return Ok(Some(r.clone()));
        }
        self.store.get_relationship(id)
    }
}

impl<'a> GraphView for WorkBufferView<'a> {
    fn find_nodes(&self, labels: &[String], props: &PropertyMap) -> Result<Vec<Node>> {
        let mut ids: HashSet<NodeId> = self.store.all_nodes()?.into_iter().map(|n| n.id).collect();
        ids.extend(self.buffer.nodes.keys().copied());
        ids.retain(|id| !self.buffer.deleted_node_ids.contains(id));

        let mut out = Vec::new();
        for id in ids {
            if let Some(node) = self.effective_node(id)? {
                if labels.iter().all(|l| node.labels.iter().any(|nl| nl == l))
                    && props.iter().all(|(k, v)| node.properties.get(k) == Some(v))
                {
                    out.push(node);
                }
            }
        }
        out.sort_by_key(|n| n.id.0);
        Ok(out)
    }

    fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        self.effective_node(id)
    }

    fn relationships_from(
        &self,
        node: NodeId,
        direction: PatternDirection,
        types: &[String],
    ) -> Result<Vec<Relationship>> {
        let mut ids: HashSet<RelId> = self
            .store
            .relationships_incident(node, direction, types)
            .unwrap_or_default()
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.extend(
            self.buffer
                .relationships
                .values()
                .filter(|r| matches_direction(r, node, direction))
                .map(|r| r.id),
        );
        ids.retain(|id| !self.buffer.deleted_rel_ids.contains(id));

        let mut out = Vec::new();
        for id in ids {
            if let Some(rel) = self.effective_relationship(id)? {
                if matches_direction(&rel, node, direction) && (types.is_empty() || types.contains(&rel.rel_type)) {
                    out.push(rel);
                }
            }
        }
        out.sort_by_key(|r| r.id.0);
        Ok(out)
    }

    fn get_relationship(&self, id: RelId) -> Result<Option<Relationship>> {
        self.effective_relationship(id)
    }

    fn create_node(&mut self, labels: Vec<String>, props: PropertyMap) -> Result<Node> {
        let node = Node {
            id: self.store.next_node_id(),
            element_id: None,
            labels,
            properties: props,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.buffer.created_node_ids.insert(node.id);
        self.buffer.nodes.insert(node.id, node.clone());
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
            id: self.store.next_rel_id(),
            element_id: None,
            src,
            dst,
            rel_type,
            properties: props,
            created_at: Utc::now(),
        };
        self.buffer.created_rel_ids.insert(rel.id);
        self.buffer.relationships.insert(rel.id, rel.clone());
        Ok(rel)
    }

    fn delete_node(&mut self, id: NodeId) -> Result<()> {
        let still_has_rels = self.relationships_from(id, PatternDirection::Both, &[])?.iter().any(|_| true);
        if still_has_rels {
            return Err(Error::ConstraintViolation(format!(
                "node {id} still has relationships; use DETACH DELETE"
            )));
        }
        self.buffer.nodes.remove(&id);
        self.buffer.created_node_ids.remove(&id);
        self.buffer.deleted_node_ids.insert(id);
        Ok(())
    }

    fn detach_delete_node(&mut self, id: NodeId) -> Result<()> {
        for rel in self.relationships_from(id, PatternDirection::Both, &[])? {
            self.delete_relationship(rel.id)?;
        }
        self.buffer.nodes.remove(&id);
        self.buffer.created_node_ids.remove(&id);
        self.buffer.deleted_node_ids.insert(id);
        Ok(())
    }

    fn delete_relationship(&mut self, id: RelId) -> Result<()> {
        self.buffer.relationships.remove(&id);
        self.buffer.created_rel_ids.remove(&id);
        self.buffer.deleted_rel_ids.insert(id);
        Ok(())
    }

    fn set_node_property(&mut self, id: NodeId, key: &str, value: Value) -> Result<()> {
        let mut node = self.effective_node(id)?.ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        node.properties.insert(key.to_string(), value);
        node.updated_at = Utc::now();
        self.buffer.nodes.insert(id, node);
        Ok(())
    }

    fn set_node_properties(&mut self, id: NodeId, props: PropertyMap) -> Result<()> {
        let mut node = self.effective_node(id)?.ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        node.properties = props;
        node.updated_at = Utc::now();
        self.buffer.nodes.insert(id, node);
        Ok(())
    }

    fn set_relationship_property(&mut self, id: RelId, key: &str, value: Value) -> Result<()> {
        let mut rel = self
            .effective_relationship(id)?
            .ok_or_else(|| Error::NotFound(format!("relationship {id}")))?;
        rel.properties.insert(key.to_string(), value);
        self.buffer.relationships.insert(id, rel);
        Ok(())
    }

    fn add_label(&mut self, id: NodeId, label: &str) -> Result<()> {
        let mut node = self.effective_node(id)?.ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        if !node.labels.iter().any(|l| l == label) {
            node.labels.push(label.to_string());
        }
        node.updated_at = Utc::now();
        self.buffer.nodes.insert(id, node);
        Ok(())
    }
}

fn matches_direction(rel: &Relationship, node: NodeId, direction: PatternDirection) -> bool {
    match direction {
        PatternDirection::Right => rel.src == node,
        PatternDirection::Left => rel.dst == node,
        PatternDirection::Both => rel.src == node || rel.dst == node,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_discards_buffer() {
        let store = Store::open_memory().unwrap();
        let mgr = TransactionManager::new(store.clone());
        let tx = mgr.begin(TxMode::ReadWrite);
        mgr.with_view(tx, |v| {
            v.create_node(vec!["Person".into()], PropertyMap::new())?;
            Ok(())
        })
        .unwrap();
        mgr.rollback(tx).unwrap();
        assert_eq!(store.node_count().unwrap(), 0);
    }

    #[test]
    fn commit_flushes_buffer() {
        let store = Store::open_memory().unwrap();
        let mgr = TransactionManager::new(store.clone());
        let tx = mgr.begin(TxMode::ReadWrite);
        mgr.with_view(tx, |v| {
            v.create_node(vec!["Person".into()], PropertyMap::new())?;
            Ok(())
        })
        .unwrap();
        assert_eq!(store.node_count().unwrap(), 0);
        mgr.commit(tx).unwrap();
        assert_eq!(store.node_count().unwrap(), 1);
    }
}
