use serde_json::{Value, json};

use super::spec::Query;
use crate::errors::QueryError;
use crate::value::{ConstraintValue, Distance, GeoPoint, Pointer};

/// One condition on a field path. A closed union: each operator carries its
/// own typed payload, so invalid operator/operand pairings cannot be built.
/// Immutable once constructed; applying the same operator to a field again
/// replaces the previous operand.
#[derive(Debug, Clone)]
pub enum Constraint {
    EqualTo(ConstraintValue),
    NotEqualTo(ConstraintValue),
    LessThan(ConstraintValue),
    LessThanOrEqualTo(ConstraintValue),
    GreaterThan(ConstraintValue),
    GreaterThanOrEqualTo(ConstraintValue),
    ContainedIn(Vec<ConstraintValue>),
    NotContainedIn(Vec<ConstraintValue>),
    ContainedAllIn(Vec<ConstraintValue>),
    EqualToSize(usize),
    Existed,
    NotExisted,
    /// Adds the field path to the `keys` projection.
    Selected,
    /// Adds the field path to the eager-fetch `include` list.
    Included,
    LocatedNear { point: GeoPoint, minimal: Option<Distance>, maximal: Option<Distance> },
    LocatedWithin { southwest: GeoPoint, northeast: GeoPoint },
    MatchedQuery(Query),
    NotMatchedQuery(Query),
    MatchedQueryAndKey { query: Query, key: String },
    NotMatchedQueryAndKey { query: Query, key: String },
    MatchedRegularExpression { pattern: String, option: Option<String> },
    MatchedSubstring(String),
    PrefixedBy(String),
    SuffixedBy(String),
    RelatedTo(Pointer),
    /// Appends the field path to the sort order.
    Ascending,
    /// Appends the field path to the sort order, reversed.
    Descending,
}

impl Constraint {
    /// Operator keys this constraint owns on its field. Cleared before the
    /// new entries land, so re-applying a multi-key constraint leaves no
    /// stale sibling keys behind.
    pub(crate) fn owned_keys(&self) -> &'static [&'static str] {
        match self {
            Self::LocatedNear { .. } => {
                &["$nearSphere", "$minDistanceInKilometers", "$maxDistanceInKilometers"]
            }
            Self::MatchedRegularExpression { .. }
            | Self::MatchedSubstring(_)
            | Self::PrefixedBy(_)
            | Self::SuffixedBy(_) => &["$regex", "$options"],
            _ => &[],
        }
    }

    /// Renders the canonical `(operator key, operand)` entries for the where
    /// clause. `path` is the field path the constraint is being applied to;
    /// only `RelatedTo` embeds it in its operand.
    ///
    /// Routing variants (`Selected`, `Included`, `Ascending`, `Descending`)
    /// never reach this point.
    pub(crate) fn entries(self, path: &str) -> Result<Vec<(&'static str, Value)>, QueryError> {
        Ok(match self {
            Self::EqualTo(v) => vec![("$eq", v.canonical())],
            Self::NotEqualTo(v) => vec![("$ne", v.canonical())],
            Self::LessThan(v) => vec![("$lt", v.canonical())],
            Self::LessThanOrEqualTo(v) => vec![("$lte", v.canonical())],
            Self::GreaterThan(v) => vec![("$gt", v.canonical())],
            Self::GreaterThanOrEqualTo(v) => vec![("$gte", v.canonical())],
            Self::ContainedIn(vs) => vec![("$in", canonical_array(&vs))],
            Self::NotContainedIn(vs) => vec![("$nin", canonical_array(&vs))],
            Self::ContainedAllIn(vs) => vec![("$all", canonical_array(&vs))],
            Self::EqualToSize(n) => vec![("$size", json!(n))],
            Self::Existed => vec![("$exists", json!(true))],
            Self::NotExisted => vec![("$exists", json!(false))],
            Self::LocatedNear { point, minimal, maximal } => {
                let mut out = vec![("$nearSphere", point.canonical())];
                if let Some(min) = minimal {
                    out.push(("$minDistanceInKilometers", json!(min.kilometers())));
                }
                if let Some(max) = maximal {
                    out.push(("$maxDistanceInKilometers", json!(max.kilometers())));
                }
                out
            }
            Self::LocatedWithin { southwest, northeast } => {
                vec![(
                    "$within",
                    json!({"$box": [southwest.canonical(), northeast.canonical()]}),
                )]
            }
            Self::MatchedQuery(q) => vec![("$inQuery", super::serialize::to_tree(&q))],
            Self::NotMatchedQuery(q) => vec![("$notInQuery", super::serialize::to_tree(&q))],
            Self::MatchedQueryAndKey { query, key } => {
                vec![("$select", json!({"query": super::serialize::to_tree(&query), "key": key}))]
            }
            Self::NotMatchedQueryAndKey { query, key } => {
                vec![(
                    "$dontSelect",
                    json!({"query": super::serialize::to_tree(&query), "key": key}),
                )]
            }
            Self::MatchedRegularExpression { pattern, option } => {
                let mut out = vec![("$regex", json!(pattern))];
                if let Some(o) = option {
                    out.push(("$options", json!(o)));
                }
                out
            }
            Self::MatchedSubstring(s) => {
                vec![("$regex", json!(format!(".*{}.*", regex::escape(&s))))]
            }
            Self::PrefixedBy(s) => vec![("$regex", json!(format!("^{}", regex::escape(&s))))],
            Self::SuffixedBy(s) => vec![("$regex", json!(format!("{}$", regex::escape(&s))))],
            Self::RelatedTo(owner) => {
                vec![("$relatedTo", json!({"object": owner.canonical(), "key": path}))]
            }
            Self::Selected | Self::Included | Self::Ascending | Self::Descending => {
                return Err(QueryError::InvalidArgument(
                    "projection and ordering constraints carry no where operand".into(),
                ));
            }
        })
    }
}

fn canonical_array(values: &[ConstraintValue]) -> Value {
    Value::Array(values.iter().map(ConstraintValue::canonical).collect())
}
