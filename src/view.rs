//! `GraphView` — the read/write surface the execution engine operates
//! against. Implemented once directly by the store (auto-commit) and once
//! by a transaction's work buffer (isolated, buffered) so clause execution
//! never needs to know which mode it's running in.

use crate::cypher::ast::PatternDirection;
use crate::model::{Node, NodeId, PropertyMap, RelId, Relationship, Value};
use crate::Result;

pub trait GraphView {
    fn find_nodes(&self, labels: &[String], props: &PropertyMap) -> Result<Vec<Node>>;
    fn get_node(&self, id: NodeId) -> Result<Option<Node>>;
    fn relationships_from(
        &self,
        node: NodeId,
        direction: PatternDirection,
        types: &[String],
    ) -> Result<Vec<Relationship>>;
    fn get_relationship(&self, id: RelId) -> Result<Option<Relationship>>;

    fn create_node(&mut self, labels: Vec<String>, props: PropertyMap) -> Result<Node>;
    fn create_relationship(
        &mut self,
        src: NodeId,
        dst: NodeId,
        rel_type: String,
        props: PropertyMap,
    ) -> Result<Relationship>;

    fn delete_node(&mut self, id: NodeId) -> Result<()>;
    fn detach_delete_node(&mut self, id: NodeId) -> Result<()>;
    fn delete_relationship(&mut self, id: RelId) -> Result<()>;

    fn set_node_property(&mut self, id: NodeId, key: &str, value: Value) -> Result<()>;
    fn set_node_properties(&mut self, id: NodeId, props: PropertyMap) -> Result<()>;
    fn set_relationship_property(&mut self, id: RelId, key: &str, value: Value) -> Result<()>;
    fn add_label(&mut self, id: NodeId, label: &str) -> Result<()>;
}
