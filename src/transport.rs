use serde_json::Value;

use crate::errors::QueryError;

/// The request kind carried to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Find,
    Get,
    Count,
}

impl Verb {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::Get => "get",
            Self::Count => "count",
        }
    }
}

/// Single request/response seam to the remote store. Implementations own
/// retry, timeout, and authentication policy; the query core issues exactly
/// one call per operation and never retries.
pub trait Transport {
    fn request(&self, collection: &str, verb: Verb, body: &Value) -> Result<Value, QueryError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn request(&self, collection: &str, verb: Verb, body: &Value) -> Result<Value, QueryError> {
        (**self).request(collection, verb, body)
    }
}
