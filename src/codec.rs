use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::errors::QueryError;
use crate::query::OBJECT_ID_FIELD;
use crate::value::{ConstraintValue, Pointer};

/// Turns a raw result row into a typed object. The row is the canonical
/// field mapping returned by the remote store; implementations must
/// recognize the `__type: Date | GeoPoint | Pointer` leaf shapes.
pub trait Decoder {
    type Object;

    fn decode(&self, class_name: &str, raw: &Map<String, Value>) -> Result<Self::Object, QueryError>;
}

/// Reference decoder producing [`RemoteObject`]s with typed fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValueDecoder;

/// A decoded row: class name plus typed fields. Fields outside a `keys`
/// projection are absent, not defaulted.
#[derive(Debug, Clone)]
pub struct RemoteObject {
    class_name: String,
    fields: BTreeMap<String, ConstraintValue>,
}

impl RemoteObject {
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The assigned identifier, if the row carried one.
    #[must_use]
    pub fn object_id(&self) -> Option<&str> {
        self.fields.get(OBJECT_ID_FIELD).and_then(ConstraintValue::as_str)
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&ConstraintValue> {
        self.fields.get(field)
    }

    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, ConstraintValue> {
        &self.fields
    }

    /// Encodes this object as a pointer for use inside a constraint operand.
    /// Fails when no identifier has been assigned yet.
    pub fn pointer(&self) -> Result<Pointer, QueryError> {
        let object_id = self.object_id().ok_or(QueryError::UnsavedObjectReference)?;
        Ok(Pointer::new(&self.class_name, object_id))
    }
}

impl Decoder for ValueDecoder {
    type Object = RemoteObject;

    fn decode(
        &self,
        class_name: &str,
        raw: &Map<String, Value>,
    ) -> Result<RemoteObject, QueryError> {
        let mut fields = BTreeMap::new();
        for (k, v) in raw {
            fields.insert(k.clone(), ConstraintValue::from_canonical(v)?);
        }
        Ok(RemoteObject { class_name: class_name.to_string(), fields })
    }
}
