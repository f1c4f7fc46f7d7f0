//! Opaque value handles stored by every container.
//!
//! Scalar leaves are immutable and never interpreted by the storage engine.
//! Container variants carry their own commit state, which `commit` reaches
//! recursively.

use crate::object::{AttributeList, ObjectValue};
use crate::types::{ArrayValue, TupleValue};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A value held by a container.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Explicit absence of a value.
    #[default]
    Nothing,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point. Compared and hashed by bit pattern.
    Float(f64),
    /// Immutable string.
    Str(Arc<str>),
    /// Immutable byte blob.
    Bytes(Arc<[u8]>),
    /// Keyed object container. Boxed because inline keyed storage holds values.
    Object(Box<ObjectValue>),
    /// Keyed attribute list.
    Attributes(Box<AttributeList>),
    /// Tuple with optional slot names.
    Tuple(TupleValue),
    /// Resizable array.
    Array(ArrayValue),
}

impl Value {
    /// Name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nothing => "Nothing",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Str(_) => "Str",
            Value::Bytes(_) => "Bytes",
            Value::Object(_) => "Object",
            Value::Attributes(_) => "Attributes",
            Value::Tuple(_) => "Tuple",
            Value::Array(_) => "Array",
        }
    }

    /// Check for `Nothing`.
    #[inline]
    pub fn is_nothing(&self) -> bool {
        matches!(self, Value::Nothing)
    }

    /// Check for a container variant.
    #[inline]
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Value::Object(_) | Value::Attributes(_) | Value::Tuple(_) | Value::Array(_)
        )
    }

    /// Get as bool.
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer.
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as float.
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as string slice.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get as byte slice.
    #[inline]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get as object container.
    #[inline]
    pub fn as_object(&self) -> Option<&ObjectValue> {
        match self {
            Value::Object(o) => Some(&**o),
            _ => None,
        }
    }

    /// Get as attribute list.
    #[inline]
    pub fn as_attributes(&self) -> Option<&AttributeList> {
        match self {
            Value::Attributes(a) => Some(&**a),
            _ => None,
        }
    }

    /// Get as tuple.
    #[inline]
    pub fn as_tuple(&self) -> Option<&TupleValue> {
        match self {
            Value::Tuple(t) => Some(t),
            _ => None,
        }
    }

    /// Get as array.
    #[inline]
    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Freeze this value and everything reachable from it.
    ///
    /// Scalars are always immutable; this only affects containers.
    pub fn commit(&self) {
        match self {
            Value::Object(o) => o.commit(),
            Value::Attributes(a) => a.commit(),
            Value::Tuple(t) => t.commit(),
            Value::Array(a) => a.commit(),
            _ => {}
        }
    }

    /// Check whether the value can no longer be mutated in place.
    pub fn is_committed(&self) -> bool {
        match self {
            Value::Object(o) => o.is_committed(),
            Value::Attributes(a) => a.is_committed(),
            Value::Tuple(t) => t.is_committed(),
            Value::Array(a) => a.is_committed(),
            _ => true,
        }
    }
}

// =============================================================================
// Equality and Hashing
// =============================================================================

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nothing, Value::Nothing) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Attributes(a), Value::Attributes(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Nothing => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Object(o) => o.hash(state),
            Value::Attributes(a) => a.hash(state),
            Value::Tuple(t) => t.hash(state),
            Value::Array(a) => a.hash(state),
        }
    }
}

// =============================================================================
// Notation
// =============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nothing => f.write_str("nothing"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{:?}", &**s),
            Value::Bytes(bytes) => {
                f.write_str("bytes(\"")?;
                for byte in bytes.iter() {
                    write!(f, "{byte:02x}")?;
                }
                f.write_str("\")")
            }
            Value::Object(o) => write!(f, "{o}"),
            Value::Attributes(a) => write!(f, "{a}"),
            Value::Tuple(t) => write!(f, "{t}"),
            Value::Array(a) => write!(f, "{a}"),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(Arc::from(b))
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(Arc::from(b))
    }
}

impl From<ObjectValue> for Value {
    fn from(o: ObjectValue) -> Self {
        Value::Object(Box::new(o))
    }
}

impl From<AttributeList> for Value {
    fn from(a: AttributeList) -> Self {
        Value::Attributes(Box::new(a))
    }
}

impl From<TupleValue> for Value {
    fn from(t: TupleValue) -> Self {
        Value::Tuple(t)
    }
}

impl From<ArrayValue> for Value {
    fn from(a: ArrayValue) -> Self {
        Value::Array(a)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    /// `None` becomes `Nothing`.
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Nothing, Into::into)
    }
}
