//! Boxed runtime values.
//!
//! Every value crossing a dispatch routine travels in this boxed form. Value
//! types (`Int32`, `Boolean`, ...) are carried inline; reference types are
//! shared [`Object`]s compared by identity.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::model::TypeId;

/// Shared handle to a heap object.
pub type ObjectRef = Arc<Object>;

/// A heap object: its runtime type plus a table of instance field values.
#[derive(Debug)]
pub struct Object {
    type_id: TypeId,
    type_name: String,
    fields: Mutex<BTreeMap<String, Value>>,
}

impl Object {
    pub fn new(type_id: TypeId, type_name: impl Into<String>) -> Self {
        Self {
            type_id,
            type_name: type_name.into(),
            fields: Mutex::new(BTreeMap::new()),
        }
    }

    /// Runtime type of this object.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Full name of the runtime type, kept for diagnostics.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Read an instance field. `None` if the object has no such slot.
    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields.lock().get(name).cloned()
    }

    /// Write an instance field, creating the slot if needed.
    pub fn set_field(&self, name: &str, value: Value) {
        self.fields.lock().insert(name.to_string(), value);
    }

    /// Whether the object carries a slot for `name`.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.lock().contains_key(name)
    }
}

/// A boxed runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Str(Arc<str>),
    Object(ObjectRef),
}

impl Value {
    /// Wrap a fresh object.
    pub fn object(object: Object) -> Self {
        Value::Object(Arc::new(object))
    }

    /// Build a string value.
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// The default value a slot of type `ty` starts with.
    pub fn default_for(ty: TypeId) -> Self {
        match ty {
            TypeId::BOOLEAN => Value::Bool(false),
            TypeId::INT32 => Value::Int32(0),
            TypeId::INT64 => Value::Int64(0),
            TypeId::DOUBLE => Value::Double(0.0),
            _ => Value::Null,
        }
    }

    /// Runtime type of the value; `None` for null.
    pub fn runtime_type(&self) -> Option<TypeId> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(TypeId::BOOLEAN),
            Value::Int32(_) => Some(TypeId::INT32),
            Value::Int64(_) => Some(TypeId::INT64),
            Value::Double(_) => Some(TypeId::DOUBLE),
            Value::Str(_) => Some(TypeId::STRING),
            Value::Object(obj) => Some(obj.type_id()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::Int32(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Short description of the runtime type for diagnostics.
    pub fn type_label(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "System.Boolean".to_string(),
            Value::Int32(_) => "System.Int32".to_string(),
            Value::Int64(_) => "System.Int64".to_string(),
            Value::Double(_) => "System.Double".to_string(),
            Value::Str(_) => "System.String".to_string(),
            Value::Object(obj) => obj.type_name().to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Object(obj) => write!(f, "<{}>", obj.type_name()),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::string(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objects_compare_by_identity() {
        let a = Value::object(Object::new(TypeId(10), "Demo.A"));
        let b = Value::object(Object::new(TypeId(10), "Demo.A"));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_defaults_follow_type() {
        assert_eq!(Value::default_for(TypeId::INT32), Value::Int32(0));
        assert_eq!(Value::default_for(TypeId::BOOLEAN), Value::Bool(false));
        assert_eq!(Value::default_for(TypeId::STRING), Value::Null);
        assert_eq!(Value::default_for(TypeId(42)), Value::Null);
    }

    #[test]
    fn test_object_fields() {
        let obj = Object::new(TypeId(11), "Demo.B");
        assert!(!obj.has_field("count"));
        obj.set_field("count", Value::Int32(3));
        assert_eq!(obj.field("count"), Some(Value::Int32(3)));
        assert_eq!(obj.field("missing"), None);
    }
}
