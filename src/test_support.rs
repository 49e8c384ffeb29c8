//! Hermetic test double for the transport seam: an in-memory store that
//! interprets the canonical wire trees the executor produces. Tests seed it
//! with documents and relation edges, run real queries against it, and
//! assert on both results and the recorded request bodies.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value, json};

use crate::errors::QueryError;
use crate::query::OBJECT_ID_FIELD;
use crate::transport::{Transport, Verb};
use crate::value::Pointer;

/// One captured transport call.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub collection: String,
    pub verb: Verb,
    pub body: Value,
}

#[derive(Debug, Clone)]
struct RelationEdge {
    owner: Pointer,
    key: String,
    target: Pointer,
}

#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<BTreeMap<String, Vec<Map<String, Value>>>>,
    relations: RwLock<Vec<RelationEdge>>,
    requests: Mutex<Vec<RecordedRequest>>,
    fail_next: Mutex<Option<(i32, String)>>,
    next_id: AtomicU64,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a document, assigning an identifier when the caller supplied
    /// none. Returns the identifier.
    pub fn insert(&self, collection: &str, mut fields: Map<String, Value>) -> String {
        let id = match fields.get(OBJECT_ID_FIELD).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let n = self.next_id.fetch_add(1, AtomicOrdering::Relaxed);
                let id = format!("id{n:06}");
                fields.insert(OBJECT_ID_FIELD.into(), json!(id));
                id
            }
        };
        self.collections.write().entry(collection.to_string()).or_default().push(fields);
        id
    }

    /// Records a relation edge: `owner` is related to `target` through the
    /// relation field `key`.
    pub fn add_relation(&self, owner: &Pointer, key: &str, target: &Pointer) {
        self.relations.write().push(RelationEdge {
            owner: owner.clone(),
            key: key.to_string(),
            target: target.clone(),
        });
    }

    /// Makes the next request report this application-level error body.
    pub fn fail_next(&self, code: i32, message: &str) {
        *self.fail_next.lock() = Some((code, message.to_string()));
    }

    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    #[must_use]
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.lock().last().cloned()
    }

    fn execute_find(&self, collection: &str, body: &Value) -> Vec<Map<String, Value>> {
        let docs = self.collections.read().get(collection).cloned().unwrap_or_default();
        let mut matched: Vec<Map<String, Value>> = docs
            .into_iter()
            .filter(|d| self.matches_where(body.get("where"), d, collection))
            .collect();

        if let Some(order) = body.get("order").and_then(Value::as_str) {
            let keys = parse_order(order);
            matched.sort_by(|a, b| compare_docs(a, b, &keys));
        } else if let Some((path, point)) = near_sphere_target(body.get("where")) {
            matched.sort_by(|a, b| {
                let da = doc_distance_km(a, &path, point);
                let db = doc_distance_km(b, &path, point);
                da.partial_cmp(&db).unwrap_or(Ordering::Equal)
            });
        }

        let skip = body.get("skip").and_then(Value::as_u64).unwrap_or(0) as usize;
        let limit = body.get("limit").and_then(Value::as_u64).map_or(usize::MAX, |n| n as usize);
        let end = skip.saturating_add(limit).min(matched.len());
        let mut matched =
            if skip >= matched.len() { Vec::new() } else { matched[skip..end].to_vec() };

        if let Some(keys) = body.get("keys").and_then(Value::as_str) {
            let retained: Vec<&str> = keys.split(',').filter(|k| !k.is_empty()).collect();
            for doc in &mut matched {
                let mut out = Map::new();
                // The identifier is always retained under a projection.
                for (k, v) in doc.iter() {
                    if k == OBJECT_ID_FIELD || retained.contains(&k.as_str()) {
                        out.insert(k.clone(), v.clone());
                    }
                }
                *doc = out;
            }
        }

        if let Some(include) = body.get("include").and_then(Value::as_str) {
            for path in include.split(',').filter(|p| !p.is_empty()) {
                for doc in &mut matched {
                    self.resolve_include(doc, path);
                }
            }
        }

        matched
    }

    fn resolve_include(&self, doc: &mut Map<String, Value>, path: &str) {
        let Some((class, id)) = doc.get(path).and_then(pointer_leaf) else { return };
        let store = self.collections.read();
        let Some(target) = store
            .get(&class)
            .and_then(|docs| docs.iter().find(|d| field_str(d, OBJECT_ID_FIELD) == Some(id.as_str())))
        else {
            return;
        };
        let mut embedded = Map::new();
        embedded.insert("__type".into(), json!("Object"));
        embedded.insert("className".into(), json!(class));
        for (k, v) in target {
            embedded.insert(k.clone(), v.clone());
        }
        doc.insert(path.to_string(), Value::Object(embedded));
    }

    fn matches_where(&self, where_v: Option<&Value>, doc: &Map<String, Value>, collection: &str) -> bool {
        let Some(map) = where_v.and_then(Value::as_object) else { return true };
        map.iter().all(|(key, entry)| match key.as_str() {
            "$and" => entry
                .as_array()
                .is_some_and(|cs| cs.iter().all(|c| self.matches_where(Some(c), doc, collection))),
            "$or" => entry
                .as_array()
                .is_some_and(|cs| cs.iter().any(|c| self.matches_where(Some(c), doc, collection))),
            path => self.match_field(doc, path, entry, collection),
        })
    }

    fn match_field(
        &self,
        doc: &Map<String, Value>,
        path: &str,
        entry: &Value,
        collection: &str,
    ) -> bool {
        let actual = get_path(doc, path);
        let Some(ops) = operator_map(entry) else {
            return eq_matches(actual, entry);
        };
        ops.iter().all(|(op, operand)| match op.as_str() {
            "$eq" => eq_matches(actual, operand),
            "$ne" => !eq_matches(actual, operand),
            "$lt" => cmp_matches(actual, operand, Ordering::is_lt),
            "$lte" => cmp_matches(actual, operand, Ordering::is_le),
            "$gt" => cmp_matches(actual, operand, Ordering::is_gt),
            "$gte" => cmp_matches(actual, operand, Ordering::is_ge),
            "$in" => in_matches(actual, operand),
            "$nin" => !in_matches(actual, operand),
            "$all" => operand.as_array().is_some_and(|vs| {
                !vs.is_empty() && vs.iter().all(|v| eq_matches(actual, v))
            }),
            "$size" => match (actual.and_then(Value::as_array), operand.as_u64()) {
                (Some(items), Some(n)) => items.len() as u64 == n,
                _ => false,
            },
            "$exists" => operand.as_bool().is_some_and(|want| actual.is_some() == want),
            "$regex" => regex_matches(actual, operand, ops.get("$options")),
            "$options" => true,
            "$inQuery" => self.in_query_matches(actual, operand),
            "$notInQuery" => !self.in_query_matches(actual, operand),
            "$select" => self.select_matches(actual, operand),
            "$dontSelect" => !self.select_matches(actual, operand),
            "$within" => within_matches(actual, operand),
            "$nearSphere" => near_matches(actual, operand, ops),
            "$minDistanceInKilometers" | "$maxDistanceInKilometers" => true,
            "$relatedTo" => self.related_matches(doc, operand, collection),
            _ => false,
        })
    }

    fn in_query_matches(&self, actual: Option<&Value>, subtree: &Value) -> bool {
        let Some((class, id)) = actual.and_then(pointer_leaf) else { return false };
        let Some(sub_class) = subtree.get("className").and_then(Value::as_str) else {
            return false;
        };
        if sub_class != class {
            return false;
        }
        self.execute_find(sub_class, subtree)
            .iter()
            .any(|d| field_str(d, OBJECT_ID_FIELD) == Some(id.as_str()))
    }

    fn select_matches(&self, actual: Option<&Value>, operand: &Value) -> bool {
        let Some(actual) = actual else { return false };
        let Some(subtree) = operand.get("query") else { return false };
        let Some(key) = operand.get("key").and_then(Value::as_str) else { return false };
        let Some(sub_class) = subtree.get("className").and_then(Value::as_str) else {
            return false;
        };
        self.execute_find(sub_class, subtree)
            .iter()
            .filter_map(|d| get_path(d, key).cloned())
            .any(|v| eq_matches(Some(actual), &v))
    }

    fn related_matches(&self, doc: &Map<String, Value>, operand: &Value, collection: &str) -> bool {
        let Some((owner_class, owner_id)) = operand.get("object").and_then(pointer_leaf) else {
            return false;
        };
        let Some(key) = operand.get("key").and_then(Value::as_str) else { return false };
        let Some(doc_id) = field_str(doc, OBJECT_ID_FIELD) else { return false };
        self.relations.read().iter().any(|edge| {
            edge.owner.class_name == owner_class
                && edge.owner.object_id == owner_id
                && edge.key == key
                && edge.target.class_name == collection
                && edge.target.object_id == doc_id
        })
    }
}

impl Transport for MemoryBackend {
    fn request(&self, collection: &str, verb: Verb, body: &Value) -> Result<Value, QueryError> {
        self.requests.lock().push(RecordedRequest {
            collection: collection.to_string(),
            verb,
            body: body.clone(),
        });
        if let Some((code, message)) = self.fail_next.lock().take() {
            return Ok(json!({"code": code, "error": message}));
        }
        if verb == Verb::Count {
            let docs = self.collections.read().get(collection).cloned().unwrap_or_default();
            let n = docs
                .iter()
                .filter(|d| self.matches_where(body.get("where"), d, collection))
                .count();
            return Ok(json!({"count": n}));
        }
        Ok(json!({"results": self.execute_find(collection, body)}))
    }
}

// --- canonical value helpers ---

fn operator_map(entry: &Value) -> Option<&Map<String, Value>> {
    let map = entry.as_object()?;
    if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) { Some(map) } else { None }
}

fn field_str<'a>(doc: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    doc.get(field).and_then(Value::as_str)
}

fn get_path<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut cur = doc;
    let mut iter = path.split('.').peekable();
    while let Some(seg) = iter.next() {
        if iter.peek().is_none() {
            return cur.get(seg);
        }
        match cur.get(seg) {
            Some(Value::Object(next)) => cur = next,
            _ => return None,
        }
    }
    None
}

/// Direct equality: equal to the value itself, or to any element when the
/// field holds an array. A missing field only equals an explicit null.
fn eq_matches(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(a) => {
            a == expected || a.as_array().is_some_and(|items| items.iter().any(|v| v == expected))
        }
    }
}

fn in_matches(actual: Option<&Value>, operand: &Value) -> bool {
    operand.as_array().is_some_and(|vs| vs.iter().any(|v| eq_matches(actual, v)))
}

fn cmp_matches(actual: Option<&Value>, expected: &Value, pred: fn(Ordering) -> bool) -> bool {
    let Some(a) = actual else { return false };
    if let Some(items) = a.as_array() {
        return items.iter().any(|v| compare_values(v, expected).is_some_and(pred));
    }
    compare_values(a, expected).is_some_and(pred)
}

/// Ordering between canonical scalars. Date leaves compare by their iso
/// string, which is safe because the canonical format is fixed-width UTC.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return Some(x.total_cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        return Some(x.cmp(y));
    }
    if let (Some(x), Some(y)) = (a.as_bool(), b.as_bool()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (date_iso(a), date_iso(b)) {
        return Some(x.cmp(y));
    }
    None
}

fn date_iso(v: &Value) -> Option<&str> {
    let map = v.as_object()?;
    if map.get("__type").and_then(Value::as_str) == Some("Date") {
        map.get("iso").and_then(Value::as_str)
    } else {
        None
    }
}

fn pointer_leaf(v: &Value) -> Option<(String, String)> {
    let map = v.as_object()?;
    if map.get("__type").and_then(Value::as_str) != Some("Pointer") {
        return None;
    }
    Some((
        map.get("className")?.as_str()?.to_string(),
        map.get("objectId")?.as_str()?.to_string(),
    ))
}

fn geo_leaf(v: &Value) -> Option<(f64, f64)> {
    let map = v.as_object()?;
    if map.get("__type").and_then(Value::as_str) != Some("GeoPoint") {
        return None;
    }
    Some((map.get("latitude")?.as_f64()?, map.get("longitude")?.as_f64()?))
}

fn regex_matches(actual: Option<&Value>, pattern: &Value, options: Option<&Value>) -> bool {
    let (Some(s), Some(p)) = (actual.and_then(Value::as_str), pattern.as_str()) else {
        return false;
    };
    let case_insensitive =
        options.and_then(Value::as_str).is_some_and(|o| o.contains('i'));
    let mut builder = regex::RegexBuilder::new(p);
    builder.case_insensitive(case_insensitive);
    match builder.build() {
        Ok(re) => re.is_match(s),
        Err(_) => false,
    }
}

fn within_matches(actual: Option<&Value>, operand: &Value) -> bool {
    let Some((lat, lon)) = actual.and_then(geo_leaf) else { return false };
    let Some(corners) = operand.get("$box").and_then(Value::as_array) else { return false };
    let (Some(sw), Some(ne)) = (corners.first().and_then(geo_leaf), corners.get(1).and_then(geo_leaf))
    else {
        return false;
    };
    lat >= sw.0 && lat <= ne.0 && lon >= sw.1 && lon <= ne.1
}

fn near_matches(actual: Option<&Value>, operand: &Value, ops: &Map<String, Value>) -> bool {
    let Some((lat, lon)) = actual.and_then(geo_leaf) else { return false };
    let Some(center) = geo_leaf(operand) else { return false };
    let dist = haversine_km(lat, lon, center.0, center.1);
    if let Some(min) = ops.get("$minDistanceInKilometers").and_then(Value::as_f64)
        && dist < min
    {
        return false;
    }
    if let Some(max) = ops.get("$maxDistanceInKilometers").and_then(Value::as_f64)
        && dist > max
    {
        return false;
    }
    true
}

fn near_sphere_target(where_v: Option<&Value>) -> Option<(String, (f64, f64))> {
    let map = where_v?.as_object()?;
    for (path, entry) in map {
        if let Some(ops) = operator_map(entry)
            && let Some(point) = ops.get("$nearSphere").and_then(geo_leaf)
        {
            return Some((path.clone(), point));
        }
    }
    None
}

fn doc_distance_km(doc: &Map<String, Value>, path: &str, center: (f64, f64)) -> f64 {
    match get_path(doc, path).and_then(geo_leaf) {
        Some((lat, lon)) => haversine_km(lat, lon, center.0, center.1),
        None => f64::INFINITY,
    }
}

fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

fn parse_order(order: &str) -> Vec<(String, bool)> {
    order
        .split(',')
        .filter(|p| !p.is_empty())
        .map(|p| match p.strip_prefix('-') {
            Some(path) => (path.to_string(), true),
            None => (p.to_string(), false),
        })
        .collect()
}

fn compare_docs(a: &Map<String, Value>, b: &Map<String, Value>, keys: &[(String, bool)]) -> Ordering {
    for (path, descending) in keys {
        let va = get_path(a, path);
        let vb = get_path(b, path);
        let ord = match (va, vb) {
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if *descending { ord.reverse() } else { ord };
        }
    }
    Ordering::Equal
}
