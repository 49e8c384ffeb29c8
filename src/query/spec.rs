use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::constraint::Constraint;
use super::types::{LogicOp, Order, RESERVED_KEYS};
use crate::errors::QueryError;

/// Mapping from field path to that field's accumulated operators, keyed by
/// canonical operator key. Multiple operators on one field AND together;
/// re-applying an operator replaces its operand.
#[derive(Debug, Clone, Default)]
pub struct WhereClause {
    pub(crate) fields: BTreeMap<String, BTreeMap<String, Value>>,
}

impl WhereClause {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The operator map for a field path, if any constraint targets it.
    #[must_use]
    pub fn operators(&self, path: &str) -> Option<&BTreeMap<String, Value>> {
        self.fields.get(path)
    }

    pub(crate) fn set(&mut self, path: &str, key: &str, operand: Value) {
        self.fields.entry(path.to_string()).or_default().insert(key.to_string(), operand);
    }

    pub(crate) fn clear_keys(&mut self, path: &str, keys: &[&str]) {
        if let Some(ops) = self.fields.get_mut(path) {
            for k in keys {
                ops.remove(*k);
            }
        }
    }
}

/// A query against one named collection: where clause, projections, sort
/// order, pagination, and logical composition with sibling queries.
///
/// Built by fluent in-place mutation; the executor only ever reads it, and
/// every execution serializes a snapshot taken at call time. `Clone` is a
/// deep copy sharing no mutable substructure, nested sub-queries included.
/// There is deliberately no `PartialEq`; content comparison is explicit via
/// [`Query::content_equals`].
#[derive(Debug, Clone)]
pub struct Query {
    class_name: String,
    pub(crate) where_clause: WhereClause,
    pub(crate) include: BTreeSet<String>,
    pub(crate) select: BTreeSet<String>,
    pub(crate) order: Vec<(String, Order)>,
    pub(crate) limit: Option<usize>,
    pub(crate) skip: Option<usize>,
    pub(crate) logic: Option<LogicOp>,
    pub(crate) combinators: Vec<Query>,
}

impl Query {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            where_clause: WhereClause::default(),
            include: BTreeSet::new(),
            select: BTreeSet::new(),
            order: Vec::new(),
            limit: None,
            skip: None,
            logic: None,
            combinators: Vec::new(),
        }
    }

    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    #[must_use]
    pub fn where_clause(&self) -> &WhereClause {
        &self.where_clause
    }

    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    #[must_use]
    pub fn skip(&self) -> Option<usize> {
        self.skip
    }

    #[must_use]
    pub fn order(&self) -> &[(String, Order)] {
        &self.order
    }

    /// Whether this query's match set depends on combined sibling queries.
    #[must_use]
    pub fn is_compound(&self) -> bool {
        !self.combinators.is_empty()
    }

    /// Applies a constraint to a field path. Violations (reserved or empty
    /// field name) surface here, at the introducing call, never later at
    /// serialization or execution time.
    pub fn where_key(
        &mut self,
        path: &str,
        constraint: Constraint,
    ) -> Result<&mut Self, QueryError> {
        if path.is_empty() {
            return Err(QueryError::InvalidArgument("empty field path".into()));
        }
        if RESERVED_KEYS.contains(&path) {
            return Err(QueryError::ReservedFieldName(path.to_string()));
        }
        match constraint {
            Constraint::Selected => {
                self.select.insert(path.to_string());
            }
            Constraint::Included => {
                self.include.insert(path.to_string());
            }
            Constraint::Ascending => self.push_order(path, Order::Ascending),
            Constraint::Descending => self.push_order(path, Order::Descending),
            other => {
                self.where_clause.clear_keys(path, other.owned_keys());
                for (key, operand) in other.entries(path)? {
                    self.where_clause.set(path, key, operand);
                }
            }
        }
        Ok(self)
    }

    pub fn set_limit(&mut self, limit: usize) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn set_skip(&mut self, skip: usize) -> &mut Self {
        self.skip = Some(skip);
        self
    }

    /// Combines with another query of the same class: both must match.
    pub fn and(&self, other: &Query) -> Result<Query, QueryError> {
        self.combine(other, LogicOp::And)
    }

    /// Combines with another query of the same class: either may match.
    pub fn or(&self, other: &Query) -> Result<Query, QueryError> {
        self.combine(other, LogicOp::Or)
    }

    fn combine(&self, other: &Query, op: LogicOp) -> Result<Query, QueryError> {
        if self.class_name != other.class_name {
            return Err(QueryError::IncompatibleQuery(format!(
                "cannot combine queries on {} and {}",
                self.class_name, other.class_name
            )));
        }
        if let Some(existing) = self.logic
            && existing != op
        {
            return Err(QueryError::IncompatibleQuery(format!(
                "all combinators under one query must share {}, got {}",
                existing.key(),
                op.key()
            )));
        }
        let mut combined;
        if self.logic == Some(op) {
            combined = self.clone();
        } else {
            combined = Query::new(&self.class_name);
            combined.logic = Some(op);
            combined.combinators.push(self.clone());
        }
        combined.combinators.push(other.clone());
        Ok(combined)
    }

    /// Structural equality via canonical trees. Two independently built
    /// queries with identical content compare equal here even though they
    /// are distinct instances.
    #[must_use]
    pub fn content_equals(&self, other: &Query) -> bool {
        super::serialize::to_tree(self) == super::serialize::to_tree(other)
    }

    fn push_order(&mut self, path: &str, order: Order) {
        self.order.retain(|(p, _)| p != path);
        self.order.push((path.to_string(), order));
    }
}
