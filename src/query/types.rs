use serde::{Deserialize, Serialize};

/// Default cap applied to unbounded sub-queries used with `$notInQuery` and
/// `$dontSelect`. Beyond this the remote store truncates the sub-query result
/// set and the "not in" check is only approximate.
pub const MAX_SUBQUERY_RESULTS: usize = 1000;

/// The reserved identifier field on every stored object.
pub const OBJECT_ID_FIELD: &str = "objectId";

/// Operator keys that may never appear as user field names.
pub const RESERVED_KEYS: [&str; 19] = [
    "$inQuery",
    "$notInQuery",
    "$select",
    "$dontSelect",
    "$relatedTo",
    "$nearSphere",
    "$within",
    "$regex",
    "$options",
    "$exists",
    "$in",
    "$nin",
    "$all",
    "$ne",
    "$size",
    "$lt",
    "$lte",
    "$gt",
    "$gte",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Ascending,
    Descending,
}

/// How sibling queries under one compound parent combine. A parent never
/// mixes both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicOp {
    And,
    Or,
}

impl LogicOp {
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::And => "$and",
            Self::Or => "$or",
        }
    }
}
