//! Expression evaluation and aggregation — evaluates `cypher::ast::Expr`
//! against a single row binding (variable -> Value) plus query parameters.

use std::collections::HashMap;

use crate::cypher::ast::{BinaryOp, Expr, Literal, StringOp, UnaryOp};
use crate::model::{PropertyMap, Value};
use crate::{Error, Result};

pub type Row = HashMap<String, Value>;

pub fn eval_expr(expr: &Expr, row: &Row, params: &PropertyMap) -> Result<Value> {
    match expr {
        Expr::Literal(lit) => Ok(match lit {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::String(s.clone()),
        }),

        Expr::Variable(name) => row
            .get(name)
            .cloned()
            .ok_or_else(|| Error::SemanticError(format!("Unbound variable: {name}"))),

        Expr::Parameter(name) => params
            .get(name)
            .cloned()
            .ok_or_else(|| Error::SemanticError(format!("Missing parameter: ${name}"))),

        Expr::Property { expr: inner, key } => {
            let val = eval_expr(inner, row, params)?;
            match val {
                Value::Node(n) => Ok(n.get(key).cloned().unwrap_or(Value::Null)),
                Value::Relationship(r) => Ok(r.properties.get(key).cloned().unwrap_or(Value::Null)),
                Value::Map(m) => Ok(m.get(key).cloned().unwrap_or(Value::Null)),
                Value::Null => Ok(Value::Null),
                _ => Err(Error::TypeError {
                    expected: "Node, Relationship, or Map".into(),
                    got: val.type_name().into(),
                }),
            }
        }

        Expr::FunctionCall { name, args, distinct: _ } => eval_function(name, args, row, params),

        Expr::BinaryOp { left, op, right } => {
            let lv = eval_expr(left, row, params)?;
            match op {
                BinaryOp::And => {
                    if !lv.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                    let rv = eval_expr(right, row, params)?;
                    return Ok(Value::Bool(rv.is_truthy()));
                }
                BinaryOp::Or => {
                    if lv.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                    let rv = eval_expr(right, row, params)?;
                    return Ok(Value::Bool(rv.is_truthy()));
                }
                _ => {}
            }
            let rv = eval_expr(right, row, params)?;
            eval_binary_op(&lv, *op, &rv)
        }

        Expr::UnaryOp { op, expr: inner } => {
            let val = eval_expr(inner, row, params)?;
            match op {
                UnaryOp::Not => match val {
                    Value::Null => Ok(Value::Null),
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    _ => Ok(Value::Bool(!val.is_truthy())),
                },
                UnaryOp::Negate => match val {
                    Value::Int(i) => Ok(Value::Int(-i)),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    Value::Null => Ok(Value::Null),
                    _ => Err(Error::TypeError { expected: "Numeric".into(), got: val.type_name().into() }),
                },
            }
        }

        Expr::List(items) => {
            let vals: Vec<Value> = items.iter().map(|e| eval_expr(e, row, params)).collect::<Result<_>>()?;
            Ok(Value::List(vals))
        }

        Expr::MapLiteral(entries) => {
            let mut map = HashMap::new();
            for (k, v) in entries {
                map.insert(k.clone(), eval_expr(v, row, params)?);
            }
            Ok(Value::Map(map))
        }

        Expr::IsNull { expr: inner, negated } => {
            let val = eval_expr(inner, row, params)?;
            let is_null = val.is_null();
            Ok(Value::Bool(if *negated { !is_null } else { is_null }))
        }

        Expr::In { expr: item, list } => {
            let item_val = eval_expr(item, row, params)?;
            let list_val = eval_expr(list, row, params)?;
            match list_val {
                Value::Null => Ok(Value::Null),
                Value::List(items) => {
                    if item_val.is_null() {
                        Ok(Value::Null)
                    } else {
                        Ok(Value::Bool(items.iter().any(|v| *v == item_val)))
                    }
                }
                _ => Err(Error::TypeError { expected: "List".into(), got: list_val.type_name().into() }),
            }
        }

        Expr::HasLabel { expr: inner, label } => {
            let val = eval_expr(inner, row, params)?;
            match val {
                Value::Node(n) => Ok(Value::Bool(n.has_label(label))),
                Value::Null => Ok(Value::Null),
                _ => Err(Error::TypeError { expected: "Node".into(), got: val.type_name().into() }),
            }
        }

        Expr::StringOp { left, op, right } => {
            let lv = eval_expr(left, row, params)?;
            let rv = eval_expr(right, row, params)?;
            match (&lv, &rv) {
                (Value::String(a), Value::String(b)) => {
                    let result = match op {
                        StringOp::StartsWith => a.starts_with(b.as_str()),
                        StringOp::EndsWith => a.ends_with(b.as_str()),
                        StringOp::Contains => a.contains(b.as_str()),
                    };
                    Ok(Value::Bool(result))
                }
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                _ => Err(Error::TypeError {
                    expected: "String".into(),
                    got: format!("{}, {}", lv.type_name(), rv.type_name()),
                }),
            }
        }

        Expr::Star => Ok(Value::Null),

        Expr::Case { operand, whens, else_expr } => {
            if let Some(op) = operand {
                let op_val = eval_expr(op, row, params)?;
                for (when_expr, then_expr) in whens {
                    let when_val = eval_expr(when_expr, row, params)?;
                    if op_val == when_val {
                        return eval_expr(then_expr, row, params);
                    }
                }
            } else {
                for (when_expr, then_expr) in whens {
                    let when_val = eval_expr(when_expr, row, params)?;
                    if when_val.is_truthy() {
                        return eval_expr(then_expr, row, params);
                    }
                }
            }
            if let Some(else_e) = else_expr {
                eval_expr(else_e, row, params)
            } else {
                Ok(Value::Null)
            }
        }

        Expr::Exists(_) => Err(not_implemented("EXISTS subqueries")),
    }
}

pub fn not_implemented(what: &str) -> Error {
    Error::ExecutionError(format!("Neo.ClientError.Statement.NotImplemented: {what} are not supported"))
}

fn eval_binary_op(left: &Value, op: BinaryOp, right: &Value) -> Result<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    match op {
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::Neq => Ok(Value::Bool(left != right)),
        BinaryOp::Lt => Ok(Value::Bool(left.neo4j_cmp(right) == Some(std::cmp::Ordering::Less))),
        BinaryOp::Lte => Ok(Value::Bool(matches!(
            left.neo4j_cmp(right),
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
        ))),
        BinaryOp::Gt => Ok(Value::Bool(left.neo4j_cmp(right) == Some(std::cmp::Ordering::Greater))),
        BinaryOp::Gte => Ok(Value::Bool(matches!(
            left.neo4j_cmp(right),
            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        ))),

        BinaryOp::Add => eval_add(left, right),
        BinaryOp::Sub => eval_arith(left, right, |a, b| a - b, |a, b| a - b),
        BinaryOp::Mul => eval_arith(left, right, |a, b| a * b, |a, b| a * b),
        BinaryOp::Div => match right {
            Value::Int(0) => Err(Error::ExecutionError("Division by zero".into())),
            Value::Float(f) if *f == 0.0 => Err(Error::ExecutionError("Division by zero".into())),
            _ => eval_arith(left, right, |a, b| a / b, |a, b| a / b),
        },
        BinaryOp::Mod => eval_arith(left, right, |a, b| a % b, |a, b| a % b),
        BinaryOp::Pow => {
            let l = left.as_float().ok_or_else(|| Error::TypeError { expected: "Numeric".into(), got: left.type_name().into() })?;
            let r = right.as_float().ok_or_else(|| Error::TypeError { expected: "Numeric".into(), got: right.type_name().into() })?;
            Ok(Value::Float(l.powf(r)))
        }

        BinaryOp::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
        BinaryOp::Xor => Ok(Value::Bool(left.is_truthy() ^ right.is_truthy())),

        BinaryOp::RegexMatch => Err(not_implemented("regular expression matches")),
    }
}

fn eval_add(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::List(a), Value::List(b)) => {
            let mut result = a.clone();
            result.extend(b.clone());
            Ok(Value::List(result))
        }
        _ => Err(Error::TypeError { expected: "compatible types for +".into(), got: format!("{}, {}", left.type_name(), right.type_name()) }),
    }
}

fn eval_arith(left: &Value, right: &Value, int_op: fn(i64, i64) -> i64, float_op: fn(f64, f64) -> f64) -> Result<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(*a, *b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(*a as f64, *b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(*a, *b as f64))),
        _ => Err(Error::TypeError { expected: "Numeric".into(), got: format!("{}, {}", left.type_name(), right.type_name()) }),
    }
}

/// True for calls this engine treats as set-aggregates (computed across the
/// whole group, never per row) rather than scalar functions.
pub fn is_aggregate_call(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::FunctionCall { name, .. } if matches!(name.to_uppercase().as_str(), "COUNT" | "SUM" | "AVG" | "MIN" | "MAX" | "COLLECT")
    )
}

fn eval_function(name: &str, args: &[Expr], row: &Row, params: &PropertyMap) -> Result<Value> {
    let upper = name.to_uppercase();
    match upper.as_str() {
        "ID" => {
            let val = eval_expr(args.first().ok_or_else(|| Error::ExecutionError("id() requires 1 argument".into()))?, row, params)?;
            match val {
                Value::Node(n) => Ok(Value::Int(n.id.0 as i64)),
                Value::Relationship(r) => Ok(Value::Int(r.id.0 as i64)),
                _ => Err(Error::TypeError { expected: "Node or Relationship".into(), got: val.type_name().into() }),
            }
        }
        "LABELS" => {
            let val = eval_expr(&args[0], row, params)?;
            match val {
                Value::Node(n) => Ok(Value::List(n.labels.iter().map(|l| Value::String(l.clone())).collect())),
                _ => Err(Error::TypeError { expected: "Node".into(), got: val.type_name().into() }),
            }
        }
        "TYPE" => {
            let val = eval_expr(&args[0], row, params)?;
            match val {
                Value::Relationship(r) => Ok(Value::String(r.rel_type.clone())),
                _ => Err(Error::TypeError { expected: "Relationship".into(), got: val.type_name().into() }),
            }
        }
        "PROPERTIES" => {
            let val = eval_expr(&args[0], row, params)?;
            match val {
                Value::Node(n) => Ok(Value::Map(n.properties.clone())),
                Value::Relationship(r) => Ok(Value::Map(r.properties.clone())),
                _ => Err(Error::TypeError { expected: "Node or Relationship".into(), got: val.type_name().into() }),
            }
        }
        "KEYS" => {
            let val = eval_expr(&args[0], row, params)?;
            match val {
                Value::Node(n) => Ok(Value::List(n.properties.keys().map(|k| Value::String(k.clone())).collect())),
                Value::Relationship(r) => Ok(Value::List(r.properties.keys().map(|k| Value::String(k.clone())).collect())),
                Value::Map(m) => Ok(Value::List(m.keys().map(|k| Value::String(k.clone())).collect())),
                _ => Err(Error::TypeError { expected: "Node, Relationship, or Map".into(), got: val.type_name().into() }),
            }
        }
        "TOINTEGER" | "TOINT" => {
            let val = eval_expr(&args[0], row, params)?;
            match val {
                Value::Int(_) => Ok(val),
                Value::Float(f) => Ok(Value::Int(f as i64)),
                Value::String(s) => s.parse::<i64>().map(Value::Int).map_err(|_| Error::TypeError { expected: "parseable integer".into(), got: s }),
                Value::Null => Ok(Value::Null),
                _ => Err(Error::TypeError { expected: "convertible to Integer".into(), got: val.type_name().into() }),
            }
        }
        "TOFLOAT" => {
            let val = eval_expr(&args[0], row, params)?;
            match val {
                Value::Float(_) => Ok(val),
                Value::Int(i) => Ok(Value::Float(i as f64)),
                Value::String(s) => s.parse::<f64>().map(Value::Float).map_err(|_| Error::TypeError { expected: "parseable float".into(), got: s }),
                Value::Null => Ok(Value::Null),
                _ => Err(Error::TypeError { expected: "convertible to Float".into(), got: val.type_name().into() }),
            }
        }
        "TOSTRING" => {
            let val = eval_expr(&args[0], row, params)?;
            Ok(Value::String(format!("{val}")))
        }
        "TOBOOLEAN" => {
            let val = eval_expr(&args[0], row, params)?;
            match val {
                Value::Bool(_) => Ok(val),
                Value::String(s) => match s.to_lowercase().as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Ok(Value::Null),
                },
                Value::Null => Ok(Value::Null),
                _ => Err(Error::TypeError { expected: "convertible to Boolean".into(), got: val.type_name().into() }),
            }
        }
        "SIZE" | "LENGTH" => {
            let val = eval_expr(&args[0], row, params)?;
            match val {
                Value::String(s) => Ok(Value::Int(s.len() as i64)),
                Value::List(l) => Ok(Value::Int(l.len() as i64)),
                Value::Path(p) => Ok(Value::Int(p.len() as i64)),
                Value::Null => Ok(Value::Null),
                _ => Err(Error::TypeError { expected: "String, List, or Path".into(), got: val.type_name().into() }),
            }
        }
        "HEAD" => {
            let val = eval_expr(&args[0], row, params)?;
            match val {
                Value::List(l) => Ok(l.into_iter().next().unwrap_or(Value::Null)),
                Value::Null => Ok(Value::Null),
                _ => Err(Error::TypeError { expected: "List".into(), got: val.type_name().into() }),
            }
        }
        "LAST" => {
            let val = eval_expr(&args[0], row, params)?;
            match val {
                Value::List(l) => Ok(l.into_iter().last().unwrap_or(Value::Null)),
                Value::Null => Ok(Value::Null),
                _ => Err(Error::TypeError { expected: "List".into(), got: val.type_name().into() }),
            }
        }
        "TAIL" => {
            let val = eval_expr(&args[0], row, params)?;
            match val {
                Value::List(mut l) => {
                    if !l.is_empty() {
                        l.remove(0);
                    }
                    Ok(Value::List(l))
                }
                Value::Null => Ok(Value::Null),
                _ => Err(Error::TypeError { expected: "List".into(), got: val.type_name().into() }),
            }
        }
        "RANGE" => {
            let start = eval_expr(&args[0], row, params)?.as_int().ok_or_else(|| Error::TypeError { expected: "Integer".into(), got: "non-integer".into() })?;
            let end = eval_expr(&args[1], row, params)?.as_int().ok_or_else(|| Error::TypeError { expected: "Integer".into(), got: "non-integer".into() })?;
            let step = if args.len() > 2 {
                eval_expr(&args[2], row, params)?.as_int().ok_or_else(|| Error::TypeError { expected: "Integer".into(), got: "non-integer".into() })?
            } else {
                1
            };
            let mut list = Vec::new();
            let mut i = start;
            while (step > 0 && i <= end) || (step < 0 && i >= end) {
                list.push(Value::Int(i));
                i += step;
            }
            Ok(Value::List(list))
        }
        "COALESCE" => {
            for arg in args {
                let val = eval_expr(arg, row, params)?;
                if !val.is_null() {
                    return Ok(val);
                }
            }
            Ok(Value::Null)
        }
        "NODES" => {
            let val = eval_expr(&args[0], row, params)?;
            match val {
                Value::Path(p) => Ok(Value::List(p.nodes.into_iter().map(|n| Value::Node(Box::new(n))).collect())),
                _ => Err(Error::TypeError { expected: "Path".into(), got: val.type_name().into() }),
            }
        }
        "RELATIONSHIPS" | "RELS" => {
            let val = eval_expr(&args[0], row, params)?;
            match val {
                Value::Path(p) => Ok(Value::List(p.relationships.into_iter().map(|r| Value::Relationship(Box::new(r))).collect())),
                _ => Err(Error::TypeError { expected: "Path".into(), got: val.type_name().into() }),
            }
        }
        // Scalar fallback for an aggregate name seen outside a grouped
        // context (e.g. inside a nested expression) — evaluates the
        // first argument rather than aggregating. Real aggregation runs
        // through `aggregate_rows`/`compute_aggregate` below.
        "COUNT" | "SUM" | "AVG" | "MIN" | "MAX" | "COLLECT" => {
            if args.is_empty() {
                Ok(Value::Int(1))
            } else {
                eval_expr(&args[0], row, params)
            }
        }
        _ => Err(Error::ExecutionError(format!("Unknown function: {name}"))),
    }
}

pub fn aggregate_rows(
    rows: &[Row],
    group_by: &[(Expr, String)],
    aggregations: &[(Expr, String)],
    params: &PropertyMap,
) -> Result<Vec<Row>> {
    let mut groups: Vec<(Vec<Value>, Vec<&Row>)> = Vec::new();

    for row in rows {
        let key: Vec<Value> = group_by.iter().map(|(expr, _)| eval_expr(expr, row, params).unwrap_or(Value::Null)).collect();
        if let Some(group) = groups.iter_mut().find(|(k, _)| *k == key) {
            group.1.push(row);
        } else {
            groups.push((key, vec![row]));
        }
    }

    if groups.is_empty() && group_by.is_empty() {
        let mut result_row = HashMap::new();
        for (expr, alias) in aggregations {
            let val = compute_aggregate(expr, &[], params)?;
            result_row.insert(alias.clone(), val);
        }
        return Ok(vec![result_row]);
    }

    let mut result = Vec::new();
    for (key_vals, group_rows) in &groups {
        let mut row = HashMap::new();
        for (i, (_, alias)) in group_by.iter().enumerate() {
            row.insert(alias.clone(), key_vals[i].clone());
        }
        for (expr, alias) in aggregations {
            let val = compute_aggregate(expr, group_rows, params)?;
            row.insert(alias.clone(), val);
        }
        result.push(row);
    }
    Ok(result)
}

fn compute_aggregate(expr: &Expr, rows: &[&Row], params: &PropertyMap) -> Result<Value> {
    match expr {
        Expr::FunctionCall { name, args, distinct } => {
            let upper = name.to_uppercase();
            let vals: Vec<Value> = if args.is_empty() {
                vec![]
            } else {
                let mut v = Vec::new();
                for row in rows {
                    let val = eval_expr(&args[0], row, params)?;
                    if !val.is_null() {
                        v.push(val);
                    }
                }
                if *distinct {
                    let mut deduped = Vec::new();
                    for val in v {
                        if !deduped.contains(&val) {
                            deduped.push(val);
                        }
                    }
                    deduped
                } else {
                    v
                }
            };

            match upper.as_str() {
                "COUNT" => {
                    if args.is_empty() {
                        Ok(Value::Int(rows.len() as i64))
                    } else {
                        Ok(Value::Int(vals.len() as i64))
                    }
                }
                "SUM" => {
                    let mut sum_i: i64 = 0;
                    let mut sum_f: f64 = 0.0;
                    let mut has_float = false;
                    for val in &vals {
                        match val {
                            Value::Int(i) => sum_i += i,
                            Value::Float(f) => {
                                has_float = true;
                                sum_f += f;
                            }
                            _ => {}
                        }
                    }
                    if has_float {
                        Ok(Value::Float(sum_i as f64 + sum_f))
                    } else {
                        Ok(Value::Int(sum_i))
                    }
                }
                "AVG" => {
                    if vals.is_empty() {
                        return Ok(Value::Null);
                    }
                    let mut sum: f64 = 0.0;
                    for val in &vals {
                        sum += val.as_float().unwrap_or(0.0);
                    }
                    Ok(Value::Float(sum / vals.len() as f64))
                }
                "MIN" => Ok(vals
                    .into_iter()
                    .reduce(|a, b| if a.neo4j_cmp(&b) == Some(std::cmp::Ordering::Less) { a } else { b })
                    .unwrap_or(Value::Null)),
                "MAX" => Ok(vals
                    .into_iter()
                    .reduce(|a, b| if a.neo4j_cmp(&b) == Some(std::cmp::Ordering::Greater) { a } else { b })
                    .unwrap_or(Value::Null)),
                "COLLECT" => Ok(Value::List(vals)),
                _ => Err(Error::ExecutionError(format!("Unknown aggregate: {name}"))),
            }
        }
        other => {
            if let Some(row) = rows.first() {
                eval_expr(other, row, params)
            } else {
                Ok(Value::Null)
            }
        }
    }
}
