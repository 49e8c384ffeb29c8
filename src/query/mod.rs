// Submodules for separation of concerns
mod constraint;
mod exec;
pub mod serialize;
mod spec;
mod types;

// Public API re-exports
pub use constraint::Constraint;
pub use exec::{ExecOptions, count, find, get, get_first};
pub use spec::{Query, WhereClause};
pub use types::{LogicOp, MAX_SUBQUERY_RESULTS, OBJECT_ID_FIELD, Order, RESERVED_KEYS};
