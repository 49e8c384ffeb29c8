use serde_json::{Value, json};

use super::constraint::Constraint;
use super::serialize;
use super::spec::Query;
use super::types::{MAX_SUBQUERY_RESULTS, OBJECT_ID_FIELD};
use crate::codec::Decoder;
use crate::errors::QueryError;
use crate::transport::{Transport, Verb};
use crate::value::ConstraintValue;

/// Executor tuning knobs.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Limit injected into unbounded sub-queries used with `$notInQuery` and
    /// `$dontSelect`. Past this, "not in" checks are only approximate.
    pub subquery_cap: usize,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self { subquery_cap: MAX_SUBQUERY_RESULTS }
    }
}

/// Sends the query and decodes every returned row, preserving the backend's
/// order. An empty match is a success with an empty vector.
pub fn find<T: Transport, D: Decoder>(
    transport: &T,
    decoder: &D,
    query: &Query,
    opts: &ExecOptions,
) -> Result<Vec<D::Object>, QueryError> {
    let body = request_body(query, opts);
    let response = transport.request(query.class_name(), Verb::Find, &body)?;
    let rows = decode_rows(decoder, query.class_name(), &response)?;
    log::debug!("find collection={} matched={}", query.class_name(), rows.len());
    Ok(rows)
}

/// Fetches the object with the given identifier: the query plus an
/// `objectId` equality constraint and limit 1, on a deep copy. Fails with
/// [`QueryError::NotFound`] when nothing matches.
pub fn get<T: Transport, D: Decoder>(
    transport: &T,
    decoder: &D,
    query: &Query,
    object_id: &str,
    opts: &ExecOptions,
) -> Result<D::Object, QueryError> {
    let mut probe = query.clone();
    probe.where_key(OBJECT_ID_FIELD, Constraint::EqualTo(ConstraintValue::from(object_id)))?;
    probe.set_limit(1);
    let body = request_body(&probe, opts);
    let response = transport.request(query.class_name(), Verb::Get, &body)?;
    decode_rows(decoder, query.class_name(), &response)?
        .into_iter()
        .next()
        .ok_or(QueryError::NotFound)
}

/// Like `find` limited to one row. The limit override lives only in the
/// request snapshot; the caller's query keeps whatever limit it had.
pub fn get_first<T: Transport, D: Decoder>(
    transport: &T,
    decoder: &D,
    query: &Query,
    opts: &ExecOptions,
) -> Result<D::Object, QueryError> {
    let mut body = request_body(query, opts);
    if let Some(root) = body.as_object_mut() {
        root.insert("limit".into(), json!(1));
    }
    let response = transport.request(query.class_name(), Verb::Find, &body)?;
    decode_rows(decoder, query.class_name(), &response)?
        .into_iter()
        .next()
        .ok_or(QueryError::NotFound)
}

/// Requests a count-only response; no row bodies are transferred.
pub fn count<T: Transport>(
    transport: &T,
    query: &Query,
    opts: &ExecOptions,
) -> Result<u64, QueryError> {
    let mut body = request_body(query, opts);
    if let Some(root) = body.as_object_mut() {
        root.insert("count".into(), json!(1));
        root.insert("limit".into(), json!(0));
    }
    let response = transport.request(query.class_name(), Verb::Count, &body)?;
    check_remote_error(&response)?;
    response
        .get("count")
        .and_then(Value::as_u64)
        .ok_or_else(|| QueryError::Transport("count missing from response".into()))
}

/// The serialization snapshot sent on the wire. Taken at call time, so
/// later mutation of the query cannot affect an in-flight request.
fn request_body(query: &Query, opts: &ExecOptions) -> Value {
    let mut tree = serialize::to_tree(query);
    if let Some(where_v) = tree.get_mut("where") {
        cap_unbounded_subqueries(where_v, opts.subquery_cap);
    }
    tree
}

fn decode_rows<D: Decoder>(
    decoder: &D,
    class_name: &str,
    response: &Value,
) -> Result<Vec<D::Object>, QueryError> {
    check_remote_error(response)?;
    let rows = match response.get("results") {
        None => return Ok(Vec::new()),
        Some(v) => v
            .as_array()
            .ok_or_else(|| QueryError::Transport("results must be an array".into()))?,
    };
    rows.iter()
        .map(|row| {
            let fields = row
                .as_object()
                .ok_or_else(|| QueryError::Transport("result row must be an object".into()))?;
            decoder.decode(class_name, fields)
        })
        .collect()
}

fn check_remote_error(response: &Value) -> Result<(), QueryError> {
    if let Some(code) = response.get("code").and_then(Value::as_i64) {
        let message =
            response.get("error").and_then(Value::as_str).unwrap_or("unknown error").to_string();
        log::warn!("remote error code={code} message={message}");
        return Err(QueryError::Remote { code: code as i32, message });
    }
    Ok(())
}

/// Walks a where tree and stamps the configured cap onto `$notInQuery` and
/// `$dontSelect` sub-queries that carry no explicit limit.
fn cap_unbounded_subqueries(where_v: &mut Value, cap: usize) {
    let Some(map) = where_v.as_object_mut() else { return };
    for (key, entry) in map.iter_mut() {
        if key == "$and" || key == "$or" {
            if let Some(children) = entry.as_array_mut() {
                for child in children {
                    cap_unbounded_subqueries(child, cap);
                }
            }
            continue;
        }
        let Some(ops) = entry.as_object_mut() else { continue };
        for (op_key, operand) in ops.iter_mut() {
            match op_key.as_str() {
                "$notInQuery" => ensure_limit(operand, cap),
                "$dontSelect" => {
                    if let Some(sub) = operand.get_mut("query") {
                        ensure_limit(sub, cap);
                    }
                }
                _ => {}
            }
        }
    }
}

fn ensure_limit(subtree: &mut Value, cap: usize) {
    if let Some(map) = subtree.as_object_mut()
        && !map.contains_key("limit")
    {
        map.insert("limit".into(), json!(cap));
    }
}
