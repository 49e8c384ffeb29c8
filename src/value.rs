use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};

use crate::errors::QueryError;

/// A geographic coordinate. Latitude and longitude are validated on
/// construction; out-of-range values never enter a constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, QueryError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(QueryError::InvalidArgument(format!("latitude out of range: {latitude}")));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(QueryError::InvalidArgument(format!(
                "longitude out of range: {longitude}"
            )));
        }
        Ok(Self { latitude, longitude })
    }

    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub(crate) fn canonical(&self) -> Value {
        json!({"__type": "GeoPoint", "latitude": self.latitude, "longitude": self.longitude})
    }
}

/// A geo distance expressed in kilometers, used by near-sphere range bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distance {
    kilometers: f64,
}

impl Distance {
    pub fn from_kilometers(kilometers: f64) -> Result<Self, QueryError> {
        if !kilometers.is_finite() || kilometers < 0.0 {
            return Err(QueryError::InvalidArgument(format!("invalid distance: {kilometers}")));
        }
        Ok(Self { kilometers })
    }

    #[must_use]
    pub fn kilometers(&self) -> f64 {
        self.kilometers
    }
}

/// A canonical reference to a stored object: class name plus identifier.
/// Distinct from an embedded full object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    pub class_name: String,
    pub object_id: String,
}

impl Pointer {
    pub fn new(class_name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self { class_name: class_name.into(), object_id: object_id.into() }
    }

    #[must_use]
    pub fn canonical(&self) -> Value {
        json!({
            "__type": "Pointer",
            "className": self.class_name,
            "objectId": self.object_id,
        })
    }
}

/// Any value legal inside a constraint operand.
#[derive(Debug, Clone)]
pub enum ConstraintValue {
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
    DateTime(DateTime<Utc>),
    GeoPoint(GeoPoint),
    Array(Vec<ConstraintValue>),
    Object(std::collections::BTreeMap<String, ConstraintValue>),
    Pointer(Pointer),
    Query(Box<crate::query::Query>),
}

/// `Query` deliberately has no `PartialEq` (identity-based equality); the
/// `Query` variant therefore compares via [`Query::content_equals`], the
/// explicit content-comparison path.
///
/// [`Query::content_equals`]: crate::query::Query::content_equals
impl PartialEq for ConstraintValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Null, Self::Null) => true,
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            (Self::GeoPoint(a), Self::GeoPoint(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Pointer(a), Self::Pointer(b)) => a == b,
            (Self::Query(a), Self::Query(b)) => a.content_equals(b),
            _ => false,
        }
    }
}

impl ConstraintValue {
    /// Renders the canonical value-tree leaf used on the wire and in archives.
    /// Pure; construction already validated the payload.
    #[must_use]
    pub fn canonical(&self) -> Value {
        match self {
            Self::Number(n) => json!(n),
            Self::String(s) => Value::String(s.clone()),
            Self::Boolean(b) => Value::Bool(*b),
            Self::Null => Value::Null,
            Self::DateTime(dt) => json!({
                "__type": "Date",
                "iso": dt.to_rfc3339_opts(SecondsFormat::Millis, true),
            }),
            Self::GeoPoint(p) => p.canonical(),
            Self::Array(items) => Value::Array(items.iter().map(Self::canonical).collect()),
            Self::Object(fields) => {
                let mut out = Map::new();
                for (k, v) in fields {
                    out.insert(k.clone(), v.canonical());
                }
                Value::Object(out)
            }
            Self::Pointer(p) => p.canonical(),
            Self::Query(q) => crate::query::serialize::to_tree(q),
        }
    }

    /// Reconstructs a typed value from a canonical leaf, recognizing the
    /// `__type: Date | GeoPoint | Pointer` wrappers. Objects with an unknown
    /// or absent `__type` decode as plain nested objects.
    pub fn from_canonical(value: &Value) -> Result<Self, QueryError> {
        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean(*b),
            Value::Number(n) => Self::Number(
                n.as_f64()
                    .ok_or_else(|| QueryError::InvalidArgument(format!("bad number: {n}")))?,
            ),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => {
                Self::Array(items.iter().map(Self::from_canonical).collect::<Result<_, _>>()?)
            }
            Value::Object(map) => match map.get("__type").and_then(Value::as_str) {
                Some("Date") => {
                    let iso = map.get("iso").and_then(Value::as_str).ok_or_else(|| {
                        QueryError::InvalidArgument("Date leaf missing iso".into())
                    })?;
                    let dt = DateTime::parse_from_rfc3339(iso)
                        .map_err(|e| QueryError::InvalidArgument(format!("bad Date iso: {e}")))?;
                    Self::DateTime(dt.with_timezone(&Utc))
                }
                Some("GeoPoint") => {
                    let lat = map.get("latitude").and_then(Value::as_f64).ok_or_else(|| {
                        QueryError::InvalidArgument("GeoPoint leaf missing latitude".into())
                    })?;
                    let lon = map.get("longitude").and_then(Value::as_f64).ok_or_else(|| {
                        QueryError::InvalidArgument("GeoPoint leaf missing longitude".into())
                    })?;
                    Self::GeoPoint(GeoPoint::new(lat, lon)?)
                }
                Some("Pointer") => {
                    let class_name =
                        map.get("className").and_then(Value::as_str).ok_or_else(|| {
                            QueryError::InvalidArgument("Pointer leaf missing className".into())
                        })?;
                    let object_id =
                        map.get("objectId").and_then(Value::as_str).ok_or_else(|| {
                            QueryError::InvalidArgument("Pointer leaf missing objectId".into())
                        })?;
                    Self::Pointer(Pointer::new(class_name, object_id))
                }
                _ => {
                    let mut fields = std::collections::BTreeMap::new();
                    for (k, v) in map {
                        if k == "__type" {
                            continue;
                        }
                        fields.insert(k.clone(), Self::from_canonical(v)?);
                    }
                    Self::Object(fields)
                }
            },
        })
    }

    /// The string payload, when this value is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<f64> for ConstraintValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for ConstraintValue {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<&str> for ConstraintValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for ConstraintValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<bool> for ConstraintValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<DateTime<Utc>> for ConstraintValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl From<GeoPoint> for ConstraintValue {
    fn from(v: GeoPoint) -> Self {
        Self::GeoPoint(v)
    }
}

impl From<Pointer> for ConstraintValue {
    fn from(v: Pointer) -> Self {
        Self::Pointer(v)
    }
}

impl From<Vec<ConstraintValue>> for ConstraintValue {
    fn from(v: Vec<ConstraintValue>) -> Self {
        Self::Array(v)
    }
}

impl From<crate::query::Query> for ConstraintValue {
    fn from(v: crate::query::Query) -> Self {
        Self::Query(Box::new(v))
    }
}
