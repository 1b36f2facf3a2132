//! JavaScript values
//!
//! Heap references are reference counted, so cloning a [`Value`] is cheap
//! and never copies object contents.
//!
//! Besides the language values there is one internal sentinel,
//! [`Value::Empty`], which marks an unoccupied slot (an array hole or a
//! binding that has not been initialized). It must never escape to
//! language code: every read path either skips it or maps it to
//! `undefined`.

use std::sync::Arc;

use crate::object::{JsObject, ObjectKind, ObjectRef};
use crate::string::JsString;

/// Reserved index value: 2^32 - 1 is neither a valid array index nor an
/// accepted array length
pub const INVALID_ARRAY_INDEX: u32 = u32::MAX;

/// A JavaScript value
#[derive(Clone, Default)]
pub enum Value {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Boolean(bool),
    /// IEEE 754 double
    Number(f64),
    /// String (interned)
    String(Arc<JsString>),
    /// Heap object
    Object(ObjectRef),
    /// Unoccupied slot sentinel
    Empty,
}

impl Value {
    /// Create undefined value
    #[inline]
    pub const fn undefined() -> Self {
        Self::Undefined
    }

    /// Create null value
    #[inline]
    pub const fn null() -> Self {
        Self::Null
    }

    /// Create the unoccupied slot sentinel
    #[inline]
    pub const fn empty() -> Self {
        Self::Empty
    }

    /// Create boolean value
    #[inline]
    pub const fn boolean(b: bool) -> Self {
        Self::Boolean(b)
    }

    /// Create 32-bit integer value
    #[inline]
    pub fn int32(n: i32) -> Self {
        Self::Number(f64::from(n))
    }

    /// Create number (f64) value
    #[inline]
    pub const fn number(n: f64) -> Self {
        Self::Number(n)
    }

    /// Create an interned string value
    pub fn string(s: &str) -> Self {
        Self::String(JsString::intern(s))
    }

    /// Create string value from an existing string
    pub fn from_js_string(s: Arc<JsString>) -> Self {
        Self::String(s)
    }

    /// Create object value
    pub fn object(obj: ObjectRef) -> Self {
        Self::Object(obj)
    }

    /// Check if undefined
    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Check if null
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if null or undefined
    #[inline]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Check if this is the unoccupied slot sentinel
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Check if boolean
    #[inline]
    pub fn is_boolean(&self) -> bool {
        matches!(self, Self::Boolean(_))
    }

    /// Check if number
    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    /// Check if string
    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// Check if object (any heap object, including functions and arrays)
    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Check if callable
    pub fn is_callable(&self) -> bool {
        self.as_object().is_some_and(|o| o.is_function())
    }

    /// Check if array object
    pub fn is_array(&self) -> bool {
        self.as_object().is_some_and(|o| o.is_array())
    }

    /// Get as boolean
    #[inline]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as number
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as 32-bit integer if the number is integral and in range
    pub fn as_int32(&self) -> Option<i32> {
        let n = self.as_number()?;
        if n.fract() == 0.0 && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) {
            Some(n as i32)
        } else {
            None
        }
    }

    /// Get as string
    #[inline]
    pub fn as_string(&self) -> Option<&Arc<JsString>> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as object
    #[inline]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// `typeof` result
    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined | Self::Empty => "undefined",
            Self::Null => "object",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Object(o) if o.is_function() => "function",
            Self::Object(_) => "object",
        }
    }

    /// ToBoolean
    pub fn to_boolean(&self) -> bool {
        match self {
            Self::Undefined | Self::Null | Self::Empty => false,
            Self::Boolean(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::Object(_) => true,
        }
    }

    /// ToNumber for primitives; objects unwrap primitive wrappers, other
    /// objects convert to NaN
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined | Self::Empty => f64::NAN,
            Self::Null => 0.0,
            Self::Boolean(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) => {
                let trimmed = s.as_str().trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Self::Object(o) => match o.kind() {
                ObjectKind::PrimitiveWrapper(inner) => inner.to_number(),
                _ => f64::NAN,
            },
        }
    }

    /// ToUint32
    pub fn to_uint32(&self) -> u32 {
        let n = self.to_number();
        if !n.is_finite() {
            return 0;
        }
        let n = n.trunc().rem_euclid(4_294_967_296.0);
        n as u32
    }

    /// Pointer identity for heap values
    pub fn same_object(&self, other: &JsObject) -> bool {
        self.as_object().is_some_and(|o| std::ptr::eq(Arc::as_ptr(o), other))
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{:?}", s.as_str()),
            Self::Object(o) => write!(f, "{:?}", o),
            Self::Empty => write!(f, "<empty>"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined)
            | (Self::Null, Self::Null)
            | (Self::Empty, Self::Empty) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::int32(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Self::Object(obj)
    }
}
