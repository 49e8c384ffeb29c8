use serde_json::{Map, Value, json};

use super::spec::Query;
use super::types::{LogicOp, Order};
use crate::errors::QueryError;

/// Renders the canonical value tree: the sole wire and archival
/// representation of a query. Pure and deterministic; identical content
/// always yields a structurally identical tree.
#[must_use]
pub fn to_tree(query: &Query) -> Value {
    let mut root = Map::new();
    root.insert("className".into(), json!(query.class_name()));
    let where_v = where_tree(query);
    if !where_v.is_empty() {
        root.insert("where".into(), Value::Object(where_v));
    }
    if !query.include.is_empty() {
        root.insert("include".into(), json!(joined(query.include.iter())));
    }
    if !query.select.is_empty() {
        root.insert("keys".into(), json!(joined(query.select.iter())));
    }
    if !query.order.is_empty() {
        let parts: Vec<String> = query
            .order
            .iter()
            .map(|(path, o)| match o {
                Order::Ascending => path.clone(),
                Order::Descending => format!("-{path}"),
            })
            .collect();
        root.insert("order".into(), json!(parts.join(",")));
    }
    if let Some(limit) = query.limit {
        root.insert("limit".into(), json!(limit));
    }
    if let Some(skip) = query.skip {
        root.insert("skip".into(), json!(skip));
    }
    Value::Object(root)
}

/// Rebuilds a query from its canonical tree. `deserialize(serialize(q))`
/// re-serializes to an identical tree; copying is this round trip.
pub fn from_tree(tree: &Value) -> Result<Query, QueryError> {
    let root = tree
        .as_object()
        .ok_or_else(|| QueryError::InvalidArgument("query tree must be an object".into()))?;
    let class_name = root
        .get("className")
        .and_then(Value::as_str)
        .ok_or_else(|| QueryError::InvalidArgument("query tree missing className".into()))?;
    let mut query = Query::new(class_name);

    if let Some(where_v) = root.get("where") {
        parse_where(&mut query, where_v)?;
    }
    if let Some(include) = root.get("include").and_then(Value::as_str) {
        for path in include.split(',').filter(|p| !p.is_empty()) {
            query.include.insert(path.to_string());
        }
    }
    if let Some(keys) = root.get("keys").and_then(Value::as_str) {
        for path in keys.split(',').filter(|p| !p.is_empty()) {
            query.select.insert(path.to_string());
        }
    }
    if let Some(order) = root.get("order").and_then(Value::as_str) {
        for part in order.split(',').filter(|p| !p.is_empty()) {
            match part.strip_prefix('-') {
                Some(path) => query.order.push((path.to_string(), Order::Descending)),
                None => query.order.push((part.to_string(), Order::Ascending)),
            }
        }
    }
    query.limit = parse_bound(root.get("limit"), "limit")?;
    query.skip = parse_bound(root.get("skip"), "skip")?;
    Ok(query)
}

/// Archival copy: serialize, then rebuild. The result shares nothing with
/// the original.
pub fn copy_via_tree(query: &Query) -> Result<Query, QueryError> {
    from_tree(&to_tree(query))
}

/// Comma-joins a field list; the inverse of the `split(',')` in `from_tree`.
fn joined<'a>(paths: impl Iterator<Item = &'a String>) -> String {
    paths.cloned().collect::<Vec<_>>().join(",")
}

fn where_tree(query: &Query) -> Map<String, Value> {
    let mut out = Map::new();
    for (path, ops) in &query.where_clause.fields {
        out.insert(path.clone(), field_tree(ops));
    }
    if let Some(op) = query.logic {
        let children: Vec<Value> =
            query.combinators.iter().map(|c| Value::Object(where_tree(c))).collect();
        out.insert(op.key().into(), Value::Array(children));
    }
    out
}

/// A field with only an equality constraint serializes as the bare value;
/// an explicit `$eq` entry appears only when other operators coexist on the
/// same field.
fn field_tree(ops: &std::collections::BTreeMap<String, Value>) -> Value {
    if ops.len() == 1
        && let Some(v) = ops.get("$eq")
    {
        return v.clone();
    }
    let mut out = Map::new();
    for (k, v) in ops {
        out.insert(k.clone(), v.clone());
    }
    Value::Object(out)
}

fn parse_where(query: &mut Query, where_v: &Value) -> Result<(), QueryError> {
    let map = where_v
        .as_object()
        .ok_or_else(|| QueryError::InvalidArgument("where must be an object".into()))?;
    for (key, entry) in map {
        if key == "$and" || key == "$or" {
            let op = if key == "$and" { LogicOp::And } else { LogicOp::Or };
            if query.logic.is_some() {
                return Err(QueryError::InvalidArgument(
                    "query tree mixes $and and $or under one parent".into(),
                ));
            }
            let children = entry.as_array().ok_or_else(|| {
                QueryError::InvalidArgument(format!("{key} must hold an array"))
            })?;
            query.logic = Some(op);
            for child_where in children {
                let mut child = Query::new(query.class_name());
                parse_where(&mut child, child_where)?;
                query.combinators.push(child);
            }
            continue;
        }
        match operator_map(entry) {
            Some(ops) => {
                for (op_key, operand) in ops {
                    query.where_clause.set(key, op_key, operand.clone());
                }
            }
            None => query.where_clause.set(key, "$eq", entry.clone()),
        }
    }
    Ok(())
}

/// An operand object whose keys all start with `$` is an operator map;
/// anything else (including `__type` leaves) is a direct equality value.
fn operator_map(entry: &Value) -> Option<&Map<String, Value>> {
    let map = entry.as_object()?;
    if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) { Some(map) } else { None }
}

fn parse_bound(value: Option<&Value>, name: &str) -> Result<Option<usize>, QueryError> {
    match value {
        None => Ok(None),
        Some(v) => {
            let n = v.as_u64().ok_or_else(|| {
                QueryError::InvalidArgument(format!("{name} must be a non-negative integer: {v}"))
            })?;
            Ok(Some(usize::try_from(n).map_err(|_| {
                QueryError::InvalidArgument(format!("{name} out of range: {n}"))
            })?))
        }
    }
}
