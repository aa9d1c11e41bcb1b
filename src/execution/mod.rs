//! Query execution engine.
//!
//! Interprets a parsed `cypher::ast::Statement` directly against a
//! `GraphView`. There is no intermediate logical-plan/optimizer phase —
//! clause execution walks the AST and reads/writes through the view in one
//! pass, matching the synchronous, per-query execution model this engine
//! was built for.

mod expr;

use std::collections::{HashMap, HashSet};

use crate::cypher::ast::{
    CreateClause, DeleteClause, MatchClause, NodePattern, OrderExpr, Pattern, PatternDirection,
    PatternElement, Query, RelPattern, ReturnClause, SetClause, SetItem, Statement, WithClause,
};
use crate::model::*;
use crate::view::GraphView;
use crate::{Error, Result};

pub use expr::Row;
use expr::{aggregate_rows, eval_expr, is_aggregate_call, not_implemented};

/// Query execution result.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
    pub stats: ExecutionStats,
}

/// A single row in the result set. Preserves column order.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub values: Vec<(String, Value)>,
}

impl ResultRow {
    pub fn get<T: FromValue>(&self, key: &str) -> Result<T> {
        let val = self
            .values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .ok_or_else(|| Error::NotFound(format!("Column '{key}'")))?;
        T::from_value(val)
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.values.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Execution statistics, analogous to Neo4j's `QueryStatistics`.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    pub nodes_created: u64,
    pub nodes_deleted: u64,
    pub relationships_created: u64,
    pub relationships_deleted: u64,
    pub properties_set: u64,
    pub labels_added: u64,
    pub labels_removed: u64,
    pub execution_time_ms: u64,
}

pub trait FromValue: Sized {
    fn from_value(val: &Value) -> Result<Self>;
}

impl FromValue for Node {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Node(n) => Ok(*n.clone()),
            _ => Err(Error::TypeError { expected: "Node".into(), got: val.type_name().into() }),
        }
    }
}

impl FromValue for String {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::String(s) => Ok(s.clone()),
            _ => Err(Error::TypeError { expected: "String".into(), got: val.type_name().into() }),
        }
    }
}

impl FromValue for i64 {
    fn from_value(val: &Value) -> Result<Self> {
        val.as_int().ok_or_else(|| Error::TypeError { expected: "Integer".into(), got: val.type_name().into() })
    }
}

impl FromValue for f64 {
    fn from_value(val: &Value) -> Result<Self> {
        val.as_float().ok_or_else(|| Error::TypeError { expected: "Float".into(), got: val.type_name().into() })
    }
}

impl FromValue for bool {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Bool(b) => Ok(*b),
            _ => Err(Error::TypeError { expected: "Bool".into(), got: val.type_name().into() }),
        }
    }
}

impl FromValue for Value {
    fn from_value(val: &Value) -> Result<Self> {
        Ok(val.clone())
    }
}

impl FromValue for Relationship {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Relationship(r) => Ok(*r.clone()),
            _ => Err(Error::TypeError { expected: "Relationship".into(), got: val.type_name().into() }),
        }
    }
}

impl FromValue for Path {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Path(p) => Ok(*p.clone()),
            _ => Err(Error::TypeError { expected: "Path".into(), got: val.type_name().into() }),
        }
    }
}

impl FromValue for Vec<Value> {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::List(l) => Ok(l.clone()),
            _ => Err(Error::TypeError { expected: "List".into(), got: val.type_name().into() }),
        }
    }
}

impl FromValue for HashMap<String, Value> {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Map(m) => Ok(m.clone()),
            _ => Err(Error::TypeError { expected: "Map".into(), got: val.type_name().into() }),
        }
    }
}

/// Execute a parsed statement against `view`, synchronously.
pub fn execute_statement(view: &mut dyn GraphView, statement: &Statement, params: &PropertyMap) -> Result<QueryResult> {
    let start = std::time::Instant::now();
    let mut stats = ExecutionStats::default();

    let (columns, rows) = match statement {
        Statement::Query(q) => execute_query(view, q, params)?,
        Statement::Create(c) => execute_create(view, c, params, &mut stats)?,
        Statement::Delete(d) => execute_delete(view, d, params, &mut stats)?,
        Statement::Set(s) => execute_set(view, s, params, &mut stats)?,
        Statement::Merge(_) => return Err(not_implemented("MERGE")),
        Statement::Schema(_) => return Err(not_implemented("schema commands (CREATE INDEX/CONSTRAINT)")),
    };

    stats.execution_time_ms = start.elapsed().as_millis() as u64;

    let result_rows = rows
        .into_iter()
        .map(|row| {
            let values = columns.iter().map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null))).collect();
            ResultRow { values }
        })
        .collect();

    Ok(QueryResult { columns, rows: result_rows, stats })
}

// ============================================================================
// Pattern matching
// ============================================================================

/// Runs every MATCH clause in sequence (each clause joins against the rows
/// produced by the previous one), applies WHERE, then WITH clauses.
fn run_matches(
    view: &dyn GraphView,
    matches: &[MatchClause],
    where_clause: &Option<crate::cypher::ast::Expr>,
    params: &PropertyMap,
) -> Result<Vec<Row>> {
    let mut rows = vec![Row::new()];
    for clause in matches {
        rows = execute_match_clause(view, clause, rows, params)?;
    }
    if let Some(expr) = where_clause {
        rows.retain(|row| eval_expr(expr, row, params).map(|v| v.is_truthy()).unwrap_or(false));
    }
    Ok(rows)
}

fn execute_match_clause(view: &dyn GraphView, clause: &MatchClause, rows: Vec<Row>, params: &PropertyMap) -> Result<Vec<Row>> {
    let mut out = Vec::new();
    for row in rows {
        let mut extended = vec![row.clone()];
        for pattern in &clause.patterns {
            extended = match_pattern(view, pattern, extended, params)?;
        }
        if extended.is_empty() && clause.optional {
            out.push(row);
        } else {
            out.extend(extended);
        }
    }
    Ok(out)
}

fn match_pattern(view: &dyn GraphView, pattern: &Pattern, rows: Vec<Row>, params: &PropertyMap) -> Result<Vec<Row>> {
    let mut rows = rows;
    let elements = &pattern.elements;
    let mut i = 0;
    while i < elements.len() {
        match &elements[i] {
            PatternElement::Node(np) => {
                rows = bind_node(view, np, rows, params)?;
                i += 1;
            }
            PatternElement::Relationship(rp) => {
                let prev_alias = match elements.get(i - 1) {
                    Some(PatternElement::Node(n)) => n.alias.clone(),
                    _ => return Err(Error::SemanticError("relationship pattern without preceding node".into())),
                };
                let next_np = match elements.get(i + 1) {
                    Some(PatternElement::Node(n)) => n,
                    _ => return Err(Error::SemanticError("relationship pattern without following node".into())),
                };
                if rp.var_length.is_some() {
                    return Err(not_implemented("variable-length relationship patterns"));
                }
                let prev_alias = prev_alias.ok_or_else(|| Error::SemanticError("anonymous node in traversal".into()))?;
                rows = bind_relationship(view, &prev_alias, rp, next_np, rows, params)?;
                i += 2;
            }
        }
    }
    Ok(rows)
}

fn bind_node(view: &dyn GraphView, np: &NodePattern, rows: Vec<Row>, params: &PropertyMap) -> Result<Vec<Row>> {
    let mut out = Vec::new();
    for row in rows {
        if let Some(alias) = &np.alias {
            if let Some(Value::Node(existing)) = row.get(alias) {
                if node_matches(existing, &np.labels, &np.properties, &row, params)? {
                    out.push(row);
                }
                continue;
            }
        }
        let props = eval_property_map(&np.properties, &row, params)?;
        for node in view.find_nodes(&np.labels, &props)? {
            let mut r = row.clone();
            if let Some(alias) = &np.alias {
                r.insert(alias.clone(), Value::Node(Box::new(node)));
            }
            out.push(r);
        }
    }
    Ok(out)
}

fn node_matches(node: &Node, labels: &[String], props: &HashMap<String, crate::cypher::ast::Expr>, row: &Row, params: &PropertyMap) -> Result<bool> {
    if !labels.iter().all(|l| node.has_label(l)) {
        return Ok(false);
    }
    for (k, expr) in props {
        let want = eval_expr(expr, row, params)?;
        if node.get(k) != Some(&want) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn bind_relationship(
    view: &dyn GraphView,
    prev_alias: &str,
    rp: &RelPattern,
    next_np: &NodePattern,
    rows: Vec<Row>,
    params: &PropertyMap,
) -> Result<Vec<Row>> {
    let mut out = Vec::new();
    for row in rows {
        let prev_node = match row.get(prev_alias) {
            Some(Value::Node(n)) => n.as_ref().clone(),
            _ => continue,
        };
        let rel_props = eval_property_map(&rp.properties, &row, params)?;
        for rel in view.relationships_from(prev_node.id, rp.direction, &rp.rel_types)? {
            if !rel_props.iter().all(|(k, v)| rel.properties.get(k) == Some(v)) {
                continue;
            }
            let other_id = match rp.direction {
                PatternDirection::Right => rel.dst,
                PatternDirection::Left => rel.src,
                PatternDirection::Both => rel.other_node(prev_node.id).unwrap_or(rel.dst),
            };
            let Some(other_node) = view.get_node(other_id)? else { continue };
            if let Some(next_alias) = &next_np.alias {
                if let Some(Value::Node(existing)) = row.get(next_alias) {
                    if existing.id != other_node.id {
                        continue;
                    }
                }
            }
            if !node_matches(&other_node, &next_np.labels, &next_np.properties, &row, params)? {
                continue;
            }
            let mut r = row.clone();
            if let Some(alias) = &rp.alias {
                r.insert(alias.clone(), Value::Relationship(Box::new(rel.clone())));
            }
            if let Some(alias) = &next_np.alias {
                r.insert(alias.clone(), Value::Node(Box::new(other_node)));
            }
            out.push(r);
        }
    }
    Ok(out)
}

fn eval_property_map(props: &HashMap<String, crate::cypher::ast::Expr>, row: &Row, params: &PropertyMap) -> Result<PropertyMap> {
    let mut out = PropertyMap::new();
    for (k, expr) in props {
        out.insert(k.clone(), eval_expr(expr, row, params)?);
    }
    Ok(out)
}

// ============================================================================
// Query (MATCH .. RETURN)
// ============================================================================

fn execute_query(view: &dyn GraphView, q: &Query, params: &PropertyMap) -> Result<(Vec<String>, Vec<Row>)> {
    let mut rows = run_matches(view, &q.matches, &q.where_clause, params)?;

    for with in &q.with_clauses {
        rows = apply_with(&rows, with, params)?;
    }

    project_return(&rows, &q.return_clause, &q.order_by, &q.skip, &q.limit, params)
}

fn apply_with(rows: &[Row], with: &WithClause, params: &PropertyMap) -> Result<Vec<Row>> {
    let has_aggregate = with.items.iter().any(|item| is_aggregate_call(&item.expr));
    let projected = if has_aggregate {
        let (group_by, aggregations) = split_aggregates(&with.items);
        aggregate_rows(rows, &group_by, &aggregations, params)?
    } else {
        rows.iter()
            .map(|row| {
                let mut out = Row::new();
                for item in &with.items {
                    let alias = item_alias(item);
                    out.insert(alias, eval_expr(&item.expr, row, params)?);
                }
                Ok(out)
            })
            .collect::<Result<Vec<_>>>()?
    };
    let mut out = projected;
    if let Some(expr) = &with.where_clause {
        out.retain(|row| eval_expr(expr, row, params).map(|v| v.is_truthy()).unwrap_or(false));
    }
    Ok(out)
}

/// Renders the Cypher source text an unaliased RETURN/WITH item would use
/// as its column name, e.g. `n.name`, `count(n)` — matching the real
/// server's behavior of naming a column after the expression itself rather
/// than a debug dump of the AST.
fn expr_text(expr: &crate::cypher::ast::Expr) -> String {
    use crate::cypher::ast::{Expr, Literal};
    match expr {
        Expr::Literal(Literal::Null) => "null".to_string(),
        Expr::Literal(Literal::Bool(b)) => b.to_string(),
        Expr::Literal(Literal::Int(i)) => i.to_string(),
        Expr::Literal(Literal::Float(f)) => f.to_string(),
        Expr::Literal(Literal::String(s)) => format!("'{s}'"),
        Expr::Variable(name) => name.clone(),
        Expr::Property { expr, key } => format!("{}.{key}", expr_text(expr)),
        Expr::Parameter(name) => format!("${name}"),
        Expr::FunctionCall { name, args, distinct } => {
            let args_text = args.iter().map(expr_text).collect::<Vec<_>>().join(", ");
            if *distinct {
                format!("{name}(distinct {args_text})")
            } else {
                format!("{name}({args_text})")
            }
        }
        Expr::Star => "*".to_string(),
        _ => format!("{expr:?}"),
    }
}

fn item_alias(item: &crate::cypher::ast::ReturnItem) -> String {
    item.alias.clone().unwrap_or_else(|| expr_text(&item.expr))
}

fn split_aggregates(
    items: &[crate::cypher::ast::ReturnItem],
) -> (Vec<(crate::cypher::ast::Expr, String)>, Vec<(crate::cypher::ast::Expr, String)>) {
    let mut group_by = Vec::new();
    let mut aggregations = Vec::new();
    for item in items {
        let alias = item_alias(item);
        if is_aggregate_call(&item.expr) {
            aggregations.push((item.expr.clone(), alias));
        } else {
            group_by.push((item.expr.clone(), alias));
        }
    }
    (group_by, aggregations)
}

fn project_return(
    rows: &[Row],
    ret: &ReturnClause,
    order_by: &Option<Vec<OrderExpr>>,
    skip: &Option<crate::cypher::ast::Expr>,
    limit: &Option<crate::cypher::ast::Expr>,
    params: &PropertyMap,
) -> Result<(Vec<String>, Vec<Row>)> {
    let has_star = ret.items.iter().any(|i| matches!(i.expr, crate::cypher::ast::Expr::Star));
    let has_aggregate = ret.items.iter().any(|i| is_aggregate_call(&i.expr));

    let mut projected: Vec<Row> = if has_star {
        rows.to_vec()
    } else if has_aggregate {
        let (group_by, aggregations) = split_aggregates(&ret.items);
        aggregate_rows(rows, &group_by, &aggregations, params)?
    } else {
        rows.iter()
            .map(|row| {
                let mut out = Row::new();
                for item in &ret.items {
                    out.insert(item_alias(item), eval_expr(&item.expr, row, params)?);
                }
                Ok(out)
            })
            .collect::<Result<Vec<_>>>()?
    };

    let mut columns: Vec<String> = if has_star {
        let mut cols: Vec<String> = rows.first().map(|r| r.keys().cloned().collect()).unwrap_or_default();
        cols.sort();
        cols
    } else {
        ret.items.iter().map(item_alias).collect()
    };
    columns.dedup();

    if ret.distinct {
        let mut seen: Vec<Vec<Value>> = Vec::new();
        projected.retain(|row| {
            let key: Vec<Value> = columns.iter().map(|c| row.get(c).cloned().unwrap_or(Value::Null)).collect();
            if seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        });
    }

    if let Some(order) = order_by {
        // eval_expr can fail (e.g. an unbound variable), and sort_by's closure
        // can't propagate a Result, so sort keys are evaluated up front.
        let mut keyed: Vec<(Vec<Value>, Row)> = Vec::with_capacity(projected.len());
        for row in projected {
            let mut keys = Vec::with_capacity(order.len());
            for o in order {
                keys.push(eval_expr(&o.expr, &row, params)?);
            }
            keyed.push((keys, row));
        }
        keyed.sort_by(|a, b| {
            for (i, o) in order.iter().enumerate() {
                let ord = a.0[i].neo4j_cmp(&b.0[i]).unwrap_or(std::cmp::Ordering::Equal);
                let ord = if o.ascending { ord } else { ord.reverse() };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        projected = keyed.into_iter().map(|(_, row)| row).collect();
    }

    if let Some(skip_expr) = skip {
        let n = eval_expr(skip_expr, &Row::new(), params)?.as_int().unwrap_or(0).max(0) as usize;
        projected = projected.into_iter().skip(n).collect();
    }
    if let Some(limit_expr) = limit {
        let n = eval_expr(limit_expr, &Row::new(), params)?.as_int().unwrap_or(0).max(0) as usize;
        projected.truncate(n);
    }

    Ok((columns, projected))
}

// ============================================================================
// CREATE
// ============================================================================

fn execute_create(view: &mut dyn GraphView, c: &CreateClause, params: &PropertyMap, stats: &mut ExecutionStats) -> Result<(Vec<String>, Vec<Row>)> {
    let mut row = Row::new();
    for pattern in &c.patterns {
        create_pattern(view, pattern, &mut row, params, stats)?;
    }

    match &c.return_clause {
        Some(ret) => project_return(&[row], ret, &None, &None, &None, params),
        None => Ok((Vec::new(), Vec::new())),
    }
}

fn create_pattern(view: &mut dyn GraphView, pattern: &Pattern, row: &mut Row, params: &PropertyMap, stats: &mut ExecutionStats) -> Result<()> {
    let elements = &pattern.elements;
    let mut i = 0;
    let mut prev_alias: Option<String> = None;
    while i < elements.len() {
        match &elements[i] {
            PatternElement::Node(np) => {
                let alias = create_node_element(view, np, row, params, stats)?;
                prev_alias = Some(alias);
                i += 1;
            }
            PatternElement::Relationship(rp) => {
                let next_np = match elements.get(i + 1) {
                    Some(PatternElement::Node(n)) => n,
                    _ => return Err(Error::SemanticError("relationship pattern without following node".into())),
                };
                let src_alias = prev_alias.clone().ok_or_else(|| Error::SemanticError("relationship without source node".into()))?;
                let dst_alias = create_node_element(view, next_np, row, params, stats)?;

                let src_id = match row.get(&src_alias) {
                    Some(Value::Node(n)) => n.id,
                    _ => return Err(Error::SemanticError(format!("unbound node alias {src_alias}"))),
                };
                let dst_id = match row.get(&dst_alias) {
                    Some(Value::Node(n)) => n.id,
                    _ => return Err(Error::SemanticError(format!("unbound node alias {dst_alias}"))),
                };
                let rel_type = rp.rel_types.first().cloned().ok_or_else(|| Error::SemanticError("CREATE relationship requires a type".into()))?;
                let props = eval_property_map(&rp.properties, row, params)?;
                let (start, end) = match rp.direction {
                    PatternDirection::Left => (dst_id, src_id),
                    _ => (src_id, dst_id),
                };
                let rel = view.create_relationship(start, end, rel_type, props)?;
                stats.relationships_created += 1;
                if let Some(alias) = &rp.alias {
                    row.insert(alias.clone(), Value::Relationship(Box::new(rel)));
                }
                prev_alias = Some(dst_alias);
                i += 2;
            }
        }
    }
    Ok(())
}

fn create_node_element(view: &mut dyn GraphView, np: &NodePattern, row: &mut Row, params: &PropertyMap, stats: &mut ExecutionStats) -> Result<String> {
    if let Some(alias) = &np.alias {
        if row.contains_key(alias) {
            return Ok(alias.clone());
        }
    }
    let props = eval_property_map(&np.properties, row, params)?;
    let node = view.create_node(np.labels.clone(), props)?;
    stats.nodes_created += 1;
    let alias = np.alias.clone().unwrap_or_else(|| format!("__anon{}", node.id.0));
    row.insert(alias.clone(), Value::Node(Box::new(node)));
    Ok(alias)
}

// ============================================================================
// DELETE
// ============================================================================

fn execute_delete(view: &mut dyn GraphView, d: &DeleteClause, params: &PropertyMap, stats: &mut ExecutionStats) -> Result<(Vec<String>, Vec<Row>)> {
    let rows = run_matches(view, &d.matches, &d.where_clause, params)?;

    let mut node_ids = HashSet::new();
    let mut rel_ids = HashSet::new();
    for row in &rows {
        for var in &d.variables {
            match row.get(var) {
                Some(Value::Node(n)) => {
                    node_ids.insert(n.id);
                }
                Some(Value::Relationship(r)) => {
                    rel_ids.insert(r.id);
                }
                _ => {}
            }
        }
    }

    for id in rel_ids {
        view.delete_relationship(id)?;
        stats.relationships_deleted += 1;
    }
    for id in node_ids {
        if d.detach {
            view.detach_delete_node(id)?;
        } else {
            view.delete_node(id)?;
        }
        stats.nodes_deleted += 1;
    }

    Ok((Vec::new(), Vec::new()))
}

// ============================================================================
// SET
// ============================================================================

fn execute_set(view: &mut dyn GraphView, s: &SetClause, params: &PropertyMap, stats: &mut ExecutionStats) -> Result<(Vec<String>, Vec<Row>)> {
    let rows = run_matches(view, &s.matches, &s.where_clause, params)?;

    for row in &rows {
        for item in &s.items {
            apply_set_item(view, item, row, params, stats)?;
        }
    }

    match &s.return_clause {
        Some(ret) => project_return(&rows, ret, &None, &None, &None, params),
        None => Ok((Vec::new(), Vec::new())),
    }
}

fn apply_set_item(view: &mut dyn GraphView, item: &SetItem, row: &Row, params: &PropertyMap, stats: &mut ExecutionStats) -> Result<()> {
    match item {
        SetItem::Property { variable, key, value } => {
            let val = eval_expr(value, row, params)?;
            match row.get(variable) {
                Some(Value::Node(n)) => view.set_node_property(n.id, key, val)?,
                Some(Value::Relationship(r)) => view.set_relationship_property(r.id, key, val)?,
                _ => return Err(Error::SemanticError(format!("unbound variable: {variable}"))),
            }
            stats.properties_set += 1;
        }
        SetItem::AllProperties { variable, value } => {
            let val = eval_expr(value, row, params)?;
            let Value::Map(map) = val else {
                return Err(Error::TypeError { expected: "Map".into(), got: "other".into() });
            };
            match row.get(variable) {
                Some(Value::Node(n)) => view.set_node_properties(n.id, map)?,
                _ => return Err(Error::SemanticError(format!("unbound variable: {variable}"))),
            }
            stats.properties_set += 1;
        }
        SetItem::MergeProperties { variable, value } => {
            let val = eval_expr(value, row, params)?;
            let Value::Map(map) = val else {
                return Err(Error::TypeError { expected: "Map".into(), got: "other".into() });
            };
            match row.get(variable) {
                Some(Value::Node(n)) => {
                    for (k, v) in map {
                        view.set_node_property(n.id, &k, v)?;
                    }
                }
                _ => return Err(Error::SemanticError(format!("unbound variable: {variable}"))),
            }
            stats.properties_set += 1;
        }
        SetItem::Label { variable, label } => {
            match row.get(variable) {
                Some(Value::Node(n)) => view.add_label(n.id, label)?,
                _ => return Err(Error::SemanticError(format!("unbound variable: {variable}"))),
            }
            stats.labels_added += 1;
        }
    }
    Ok(())
}
