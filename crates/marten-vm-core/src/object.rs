//! JavaScript objects
//!
//! Every object owns a generic keyed property store: an insertion-ordered
//! map from [`PropertyKey`] to [`PropertyDescriptor`]. Exotic behaviour is
//! selected by [`ObjectKind`]; array objects route indexed keys and
//! `length` through their own storage (see [`crate::array`]) and fall back
//! to the generic store once they leave fast mode.

use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::FxBuildHasher;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::array::ArrayData;
use crate::error::VmResult;
use crate::function::FunctionData;
use crate::string::{JsString, well_known};
use crate::value::{INVALID_ARRAY_INDEX, Value};

/// Shared reference to a heap object
pub type ObjectRef = Arc<JsObject>;

/// Property key
///
/// Canonical numeric strings below 2^32 - 1 are always represented as
/// [`PropertyKey::Index`], so `"3"` and `3` name the same property.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String property key
    String(Arc<JsString>),
    /// Array index (for arrays and other integer-keyed properties)
    Index(u32),
}

impl PropertyKey {
    /// Create a property key from a string, canonicalizing array indices
    pub fn string(s: &str) -> Self {
        Self::from_js_string(JsString::intern(s))
    }

    /// Create from an interned string, canonicalizing array indices
    pub fn from_js_string(s: Arc<JsString>) -> Self {
        match s.to_array_index() {
            Some(index) => Self::Index(index),
            None => Self::String(s),
        }
    }

    /// Create an index property key
    ///
    /// 2^32 - 1 is not an array index; it becomes the string key
    /// `"4294967295"`.
    pub fn index(i: u32) -> Self {
        if i == INVALID_ARRAY_INDEX {
            let mut buf = itoa::Buffer::new();
            Self::String(JsString::intern(buf.format(i)))
        } else {
            Self::Index(i)
        }
    }

    /// The `length` key
    pub fn length() -> Self {
        Self::String(well_known::LENGTH.clone())
    }

    /// Array index view of the key
    #[inline]
    pub fn as_array_index(&self) -> Option<u32> {
        match self {
            Self::Index(i) => Some(*i),
            Self::String(_) => None,
        }
    }

    /// Check if this is the `length` key
    pub fn is_length(&self) -> bool {
        matches!(self, Self::String(s) if **s == **well_known::LENGTH)
    }

    /// String form of the key
    pub fn to_js_string(&self) -> Arc<JsString> {
        match self {
            Self::String(s) => s.clone(),
            Self::Index(i) => {
                let mut buf = itoa::Buffer::new();
                JsString::intern(buf.format(*i))
            }
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        Self::index(i)
    }
}

impl std::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Index(i) => write!(f, "{}", i),
        }
    }
}

/// Property attributes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PropertyAttributes {
    /// Property is writable
    pub writable: bool,
    /// Property is enumerable
    pub enumerable: bool,
    /// Property is configurable
    pub configurable: bool,
}

impl PropertyAttributes {
    /// Default data property attributes
    pub const fn data() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Non-writable, non-enumerable, non-configurable
    pub const fn frozen() -> Self {
        Self {
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }

    /// Writable and configurable but not enumerable (built-in slots)
    pub const fn hidden() -> Self {
        Self {
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }

    /// Read-only, non-enumerable, configurable (`name`, `length` of functions)
    pub const fn read_only() -> Self {
        Self {
            writable: false,
            enumerable: false,
            configurable: true,
        }
    }

    /// Check for the default `{writable, enumerable, configurable}` triple
    #[inline]
    pub fn is_default(&self) -> bool {
        *self == Self::data()
    }
}

/// Attributes a caller asks for when storing a value
///
/// `Unspecified` keeps whatever attributes the slot already has; it is what
/// a plain assignment uses on an existing property.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeIntent {
    /// No attribute change requested
    Unspecified,
    /// Exactly these attributes
    Exact(PropertyAttributes),
}

impl AttributeIntent {
    /// Exact default data attributes
    pub const fn default_data() -> Self {
        Self::Exact(PropertyAttributes::data())
    }

    /// Check for an exact default triple
    #[inline]
    pub fn is_default_data(&self) -> bool {
        matches!(self, Self::Exact(attrs) if attrs.is_default())
    }

    /// Whether an occupied dense slot can absorb a store with this intent
    #[inline]
    pub fn fits_occupied_slot(&self) -> bool {
        matches!(self, Self::Unspecified) || self.is_default_data()
    }
}

/// Property descriptor
#[derive(Clone, Debug)]
pub enum PropertyDescriptor {
    /// Data property
    Data {
        /// The value
        value: Value,
        /// Attributes
        attributes: PropertyAttributes,
    },
    /// Accessor property
    Accessor {
        /// Getter function
        get: Option<Value>,
        /// Setter function
        set: Option<Value>,
        /// Attributes (`writable` is ignored)
        attributes: PropertyAttributes,
    },
}

impl PropertyDescriptor {
    /// Create a data property
    pub fn data(value: Value) -> Self {
        Self::Data {
            value,
            attributes: PropertyAttributes::data(),
        }
    }

    /// Create a data property with specific attributes
    pub fn data_with_attrs(value: Value, attributes: PropertyAttributes) -> Self {
        Self::Data { value, attributes }
    }

    /// Create an accessor property
    pub fn accessor(get: Option<Value>, set: Option<Value>, attributes: PropertyAttributes) -> Self {
        Self::Accessor {
            get,
            set,
            attributes,
        }
    }

    /// Get the value (for data properties)
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Data { value, .. } => Some(value),
            Self::Accessor { .. } => None,
        }
    }

    /// Attributes of either kind of property
    pub fn attributes(&self) -> PropertyAttributes {
        match self {
            Self::Data { attributes, .. } | Self::Accessor { attributes, .. } => *attributes,
        }
    }

    /// Check if writable
    pub fn is_writable(&self) -> bool {
        match self {
            Self::Data { attributes, .. } => attributes.writable,
            Self::Accessor { .. } => false,
        }
    }

    /// Check if enumerable
    pub fn is_enumerable(&self) -> bool {
        self.attributes().enumerable
    }

    /// Check if configurable
    pub fn is_configurable(&self) -> bool {
        self.attributes().configurable
    }

    /// Check if this is an accessor property
    pub fn is_accessor(&self) -> bool {
        matches!(self, Self::Accessor { .. })
    }
}

/// Exotic behaviour and internal slots of an object
pub enum ObjectKind {
    /// Plain object
    Ordinary,
    /// Array object with dual-mode element storage
    Array(RwLock<ArrayData>),
    /// Function object
    Function(FunctionData),
    /// Wrapper around a primitive (created when boxing a receiver)
    PrimitiveWrapper(Value),
    /// Arguments object
    Arguments,
}

impl std::fmt::Debug for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ordinary => write!(f, "Ordinary"),
            Self::Array(data) => write!(f, "Array({:?})", data.read()),
            Self::Function(func) => write!(f, "Function({:?})", func),
            Self::PrimitiveWrapper(v) => write!(f, "PrimitiveWrapper({:?})", v),
            Self::Arguments => write!(f, "Arguments"),
        }
    }
}

pub(crate) type PropertyMap = IndexMap<PropertyKey, PropertyDescriptor, FxBuildHasher>;

/// A JavaScript object
///
/// Thread-safe with interior mutability. For arrays the element lock is
/// always taken before the property lock.
pub struct JsObject {
    /// Generic keyed property storage
    properties: RwLock<PropertyMap>,
    /// Prototype (None for Object.prototype)
    prototype: Option<ObjectRef>,
    /// Exotic kind
    kind: ObjectKind,
    /// Is extensible
    extensible: AtomicBool,
}

impl JsObject {
    /// Create a new empty ordinary object
    pub fn new(prototype: Option<ObjectRef>) -> Self {
        Self::with_kind(ObjectKind::Ordinary, prototype)
    }

    /// Create an object of the given kind
    pub fn with_kind(kind: ObjectKind, prototype: Option<ObjectRef>) -> Self {
        Self {
            properties: RwLock::new(PropertyMap::default()),
            prototype,
            kind,
            extensible: AtomicBool::new(true),
        }
    }

    /// Object kind
    #[inline]
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// Check if object is an array
    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self.kind, ObjectKind::Array(_))
    }

    /// Check if object is callable
    #[inline]
    pub fn is_function(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }

    /// Function internals, if this is a function object
    pub fn as_function(&self) -> Option<&FunctionData> {
        match &self.kind {
            ObjectKind::Function(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn array_data(&self) -> Option<&RwLock<ArrayData>> {
        match &self.kind {
            ObjectKind::Array(data) => Some(data),
            _ => None,
        }
    }

    /// Get prototype
    pub fn prototype(&self) -> Option<&ObjectRef> {
        self.prototype.as_ref()
    }

    /// Check if new properties may be added
    pub fn is_extensible(&self) -> bool {
        self.extensible.load(Ordering::Acquire)
    }

    /// Forbid adding new properties
    ///
    /// Arrays leave fast mode first; the dense path never checks
    /// extensibility.
    pub fn prevent_extensions(&self) {
        self.convert_into_non_fast_mode();
        self.extensible.store(false, Ordering::Release);
    }

    /// `[[GetOwnProperty]]`
    pub fn get_own_property(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        if self.is_array() {
            return self.array_get_own_property(key);
        }
        self.ordinary_get_own_property(key)
    }

    /// `[[DefineOwnProperty]]` with attribute-exact semantics
    ///
    /// Returns `Ok(false)` when the definition is rejected; errors are
    /// reserved for range violations on array `length`.
    pub fn define_own_property(&self, key: PropertyKey, desc: PropertyDescriptor) -> VmResult<bool> {
        if self.is_array() {
            return self.array_define_own_property(key, desc);
        }
        Ok(self.ordinary_define_own_property(key, desc))
    }

    /// `[[Delete]]`
    pub fn delete(&self, key: &PropertyKey) -> bool {
        if self.is_array() {
            return self.array_delete(key);
        }
        self.ordinary_delete(key)
    }

    /// `[[OwnPropertyKeys]]`: indices ascending, then strings in insertion order
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        if self.is_array() {
            return self.array_own_keys();
        }
        self.ordinary_own_keys()
    }

    /// Get a data property value through the prototype chain
    ///
    /// Accessor properties read as `undefined`; invoking getters needs a
    /// call frame and is left to the interpreter.
    pub fn get(&self, key: &PropertyKey) -> Option<Value> {
        let mut current: Option<&JsObject> = Some(self);
        while let Some(obj) = current {
            if let Some(desc) = obj.get_own_property(key) {
                return Some(desc.value().cloned().unwrap_or_default());
            }
            current = obj.prototype.as_deref();
        }
        None
    }

    /// Plain assignment to an own data property
    ///
    /// Creates a default data property when absent. Accessors and
    /// non-writable properties reject the store.
    pub fn set(&self, key: PropertyKey, value: Value) -> VmResult<bool> {
        if self.is_array() {
            return self.array_set(key, value);
        }
        Ok(self.ordinary_set(key, value))
    }

    /// Check if object has own property
    pub fn has_own(&self, key: &PropertyKey) -> bool {
        self.get_own_property(key).is_some()
    }

    /// Check if object has property (including prototype chain)
    pub fn has(&self, key: &PropertyKey) -> bool {
        let mut current: Option<&JsObject> = Some(self);
        while let Some(obj) = current {
            if obj.has_own(key) {
                return true;
            }
            current = obj.prototype.as_deref();
        }
        false
    }

    pub(crate) fn properties(&self) -> &RwLock<PropertyMap> {
        &self.properties
    }

    pub(crate) fn ordinary_get_own_property(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        self.properties.read().get(key).cloned()
    }

    pub(crate) fn ordinary_define_own_property(&self, key: PropertyKey, desc: PropertyDescriptor) -> bool {
        let mut props = self.properties.write();
        Self::validate_and_apply(&mut props, key, desc, self.is_extensible())
    }

    /// ValidateAndApplyPropertyDescriptor for fully populated descriptors
    pub(crate) fn validate_and_apply(
        props: &mut PropertyMap,
        key: PropertyKey,
        desc: PropertyDescriptor,
        extensible: bool,
    ) -> bool {
        let Some(current) = props.get_mut(&key) else {
            if !extensible {
                return false;
            }
            props.insert(key, desc);
            return true;
        };

        if !current.is_configurable() {
            if desc.is_configurable() || desc.is_enumerable() != current.is_enumerable() {
                return false;
            }
            match (&*current, &desc) {
                (
                    PropertyDescriptor::Data {
                        value: old,
                        attributes: old_attrs,
                    },
                    PropertyDescriptor::Data {
                        value: new,
                        attributes: new_attrs,
                    },
                ) => {
                    if !old_attrs.writable && (new_attrs.writable || old != new) {
                        return false;
                    }
                }
                (
                    PropertyDescriptor::Accessor {
                        get: old_get,
                        set: old_set,
                        ..
                    },
                    PropertyDescriptor::Accessor {
                        get: new_get,
                        set: new_set,
                        ..
                    },
                ) => {
                    if old_get != new_get || old_set != new_set {
                        return false;
                    }
                }
                _ => return false,
            }
        }

        *current = desc;
        true
    }

    pub(crate) fn ordinary_set(&self, key: PropertyKey, value: Value) -> bool {
        let mut props = self.properties.write();
        match props.get_mut(&key) {
            Some(PropertyDescriptor::Data {
                value: slot,
                attributes,
            }) => {
                if !attributes.writable {
                    return false;
                }
                *slot = value;
                true
            }
            Some(PropertyDescriptor::Accessor { .. }) => false,
            None => {
                if !self.is_extensible() {
                    return false;
                }
                props.insert(key, PropertyDescriptor::data(value));
                true
            }
        }
    }

    pub(crate) fn ordinary_delete(&self, key: &PropertyKey) -> bool {
        let mut props = self.properties.write();
        match props.get(key) {
            Some(desc) if !desc.is_configurable() => false,
            Some(_) => {
                props.shift_remove(key);
                true
            }
            None => true,
        }
    }

    pub(crate) fn ordinary_own_keys(&self) -> Vec<PropertyKey> {
        let props = self.properties.read();
        let mut indices: Vec<u32> = props.keys().filter_map(PropertyKey::as_array_index).collect();
        indices.sort_unstable();

        let mut keys: Vec<PropertyKey> = Vec::with_capacity(props.len());
        keys.extend(indices.into_iter().map(PropertyKey::Index));
        keys.extend(
            props
                .keys()
                .filter(|k| matches!(k, PropertyKey::String(_)))
                .cloned(),
        );
        keys
    }
}

impl std::fmt::Debug for JsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let props = self.properties.read();
        let kind = match &self.kind {
            ObjectKind::Ordinary => "Ordinary",
            ObjectKind::Array(_) => "Array",
            ObjectKind::Function(_) => "Function",
            ObjectKind::PrimitiveWrapper(_) => "PrimitiveWrapper",
            ObjectKind::Arguments => "Arguments",
        };
        f.debug_struct("JsObject")
            .field("kind", &kind)
            .field("properties", &props.len())
            .finish()
    }
}
