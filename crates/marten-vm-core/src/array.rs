//! Array objects with dual-mode element storage
//!
//! An array starts in fast mode: elements live in a dense vector whose
//! size always equals `length`, with [`Value::Empty`] marking holes. Any
//! operation the dense vector cannot represent (non-default attributes,
//! accessors, huge sparse growth, a frozen `length`) converts the array to
//! dictionary mode, where elements are ordinary keyed properties. The
//! conversion is one-way.

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{VmError, VmResult};
use crate::object::{
    AttributeIntent, JsObject, ObjectKind, ObjectRef, PropertyAttributes, PropertyDescriptor,
    PropertyKey,
};
use crate::value::{INVALID_ARRAY_INDEX, Value};

/// Lengths above this may leave fast mode when grown sparsely
pub const NON_FAST_MODE_MIN_SIZE: u32 = 65536 * 2;

/// Growth gap above which a large array leaves fast mode
pub const NON_FAST_MODE_START_MIN_GAP: u32 = 1024;

/// Element storage
#[derive(Debug)]
pub enum ArrayStorage {
    /// Dense vector, one slot per index below `length`
    Fast(Vec<Value>),
    /// Elements are stored in the object's keyed property map
    Dictionary,
}

impl ArrayStorage {
    /// Take the dense vector out, leaving dictionary mode behind
    fn take_dense(&mut self) -> Option<Vec<Value>> {
        match std::mem::replace(self, Self::Dictionary) {
            Self::Fast(values) => Some(values),
            Self::Dictionary => None,
        }
    }
}

/// Storage mode reported by length changes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArrayMode {
    /// Still backed by the dense vector
    Fast,
    /// Backed by keyed properties
    Dictionary,
}

/// Outcome of a fast-path store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FastSet {
    /// The value was written to the dense vector
    Stored,
    /// The fast path does not apply; use the generic property path
    Declined,
}

/// Internal array state
#[derive(Debug)]
pub struct ArrayData {
    length: u32,
    length_writable: bool,
    storage: ArrayStorage,
}

impl ArrayData {
    pub(crate) fn new() -> Self {
        Self {
            length: 0,
            length_writable: true,
            storage: ArrayStorage::Fast(Vec::new()),
        }
    }

    /// Current `length`
    #[inline]
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Check for fast mode
    #[inline]
    pub fn is_fast(&self) -> bool {
        matches!(self.storage, ArrayStorage::Fast(_))
    }

    /// Dense elements, if still in fast mode
    pub fn dense_values(&self) -> Option<&[Value]> {
        match &self.storage {
            ArrayStorage::Fast(values) => Some(values),
            ArrayStorage::Dictionary => None,
        }
    }

    fn fast_get(&self, index: u32) -> Option<PropertyDescriptor> {
        let ArrayStorage::Fast(values) = &self.storage else {
            return None;
        };
        match values.get(index as usize) {
            Some(value) if !value.is_empty() => Some(PropertyDescriptor::data(value.clone())),
            _ => None,
        }
    }

    fn is_occupied(&self, index: u32) -> bool {
        self.fast_get(index).is_some()
    }

    fn length_descriptor(&self) -> PropertyDescriptor {
        PropertyDescriptor::data_with_attrs(
            Value::from(self.length),
            PropertyAttributes {
                writable: self.length_writable,
                enumerable: false,
                configurable: false,
            },
        )
    }
}

fn invalid_length() -> VmError {
    VmError::range_error("Invalid array length")
}

/// Validate a value assigned to `length`
fn to_array_length(value: &Value) -> VmResult<u32> {
    let number = value.to_number();
    let length = value.to_uint32();
    if f64::from(length) != number {
        return Err(invalid_length());
    }
    Ok(length)
}

impl JsObject {
    /// Create a new empty array in fast mode
    pub fn new_array(prototype: Option<ObjectRef>) -> Self {
        Self::with_kind(ObjectKind::Array(RwLock::new(ArrayData::new())), prototype)
    }

    /// Check for an array still in fast mode
    pub fn is_fast_mode_array(&self) -> bool {
        self.array_data().is_some_and(|data| data.read().is_fast())
    }

    /// Array `length` (0 for non-arrays)
    pub fn array_length(&self) -> u32 {
        self.array_data().map_or(0, |data| data.read().length)
    }

    /// Size of the dense vector, if in fast mode
    pub fn dense_len(&self) -> Option<usize> {
        let data = self.array_data()?.read();
        data.dense_values().map(<[Value]>::len)
    }

    /// Fast-path element read
    ///
    /// Finds only occupied dense slots, reported with default data
    /// attributes. Holes, out-of-range indices and dictionary-mode arrays
    /// report nothing.
    pub fn array_fast_get(&self, index: u32) -> Option<PropertyDescriptor> {
        self.array_data()?.read().fast_get(index)
    }

    /// Fast-path element store
    ///
    /// An occupied slot accepts [`AttributeIntent::Unspecified`] or the
    /// exact default triple. An empty or out-of-range slot accepts only the
    /// exact default triple. Any other intent converts the array to
    /// dictionary mode and declines.
    pub fn array_fast_set(&self, index: u32, value: Value, intent: AttributeIntent) -> VmResult<FastSet> {
        let Some(lock) = self.array_data() else {
            return Ok(FastSet::Declined);
        };
        let mut data = lock.write();
        self.fast_set_locked(&mut data, index, value, intent)
    }

    /// Set the array length
    ///
    /// `from_constructor` is set by the array constructor bootstrap and
    /// keeps large preallocated arrays dense.
    pub fn set_array_length(&self, new_length: u32, from_constructor: bool) -> VmResult<ArrayMode> {
        let Some(lock) = self.array_data() else {
            return Err(VmError::type_error("not an array"));
        };
        let mut data = lock.write();
        self.set_length_locked(&mut data, new_length, from_constructor)
    }

    /// Move every element into keyed storage; irreversible
    pub fn convert_into_non_fast_mode(&self) {
        if let Some(lock) = self.array_data() {
            let mut data = lock.write();
            self.convert_locked(&mut data);
        }
    }

    /// Native getter for `length`
    pub fn array_length_value(&self) -> Value {
        Value::from(self.array_length())
    }

    /// Native setter for `length`
    ///
    /// Fails with a RangeError unless the value is an exact uint32 other
    /// than 2^32 - 1. Returns `Ok(false)` when the length is read-only or a
    /// non-configurable element blocked the shrink.
    pub fn set_array_length_from_value(&self, value: &Value) -> VmResult<bool> {
        let Some(lock) = self.array_data() else {
            return Err(VmError::type_error("not an array"));
        };
        let new_length = to_array_length(value)?;
        let mut data = lock.write();
        if !data.length_writable {
            return Ok(new_length == data.length);
        }
        self.set_length_locked(&mut data, new_length, false)?;
        Ok(data.length == new_length)
    }

    fn fast_set_locked(
        &self,
        data: &mut ArrayData,
        index: u32,
        value: Value,
        intent: AttributeIntent,
    ) -> VmResult<FastSet> {
        if !data.is_fast() || index == INVALID_ARRAY_INDEX {
            return Ok(FastSet::Declined);
        }

        let accepted = if data.is_occupied(index) {
            intent.fits_occupied_slot()
        } else {
            intent.is_default_data()
        };
        if !accepted {
            self.convert_locked(data);
            return Ok(FastSet::Declined);
        }

        if index >= data.length && self.set_length_locked(data, index + 1, false)? == ArrayMode::Dictionary {
            return Ok(FastSet::Declined);
        }

        match &mut data.storage {
            ArrayStorage::Fast(values) => {
                values[index as usize] = value;
                Ok(FastSet::Stored)
            }
            ArrayStorage::Dictionary => Ok(FastSet::Declined),
        }
    }

    fn set_length_locked(&self, data: &mut ArrayData, new_length: u32, from_constructor: bool) -> VmResult<ArrayMode> {
        if new_length == INVALID_ARRAY_INDEX {
            return Err(invalid_length());
        }

        if data.is_fast()
            && new_length > NON_FAST_MODE_MIN_SIZE
            && new_length > data.length
            && new_length - data.length > NON_FAST_MODE_START_MIN_GAP
            && !from_constructor
        {
            self.convert_locked(data);
        }

        match &mut data.storage {
            ArrayStorage::Fast(values) => {
                values.resize(new_length as usize, Value::Empty);
                data.length = new_length;
                Ok(ArrayMode::Fast)
            }
            ArrayStorage::Dictionary => {
                data.length = if new_length < data.length {
                    self.truncate_dictionary_elements(new_length)
                } else {
                    new_length
                };
                Ok(ArrayMode::Dictionary)
            }
        }
    }

    /// Delete keyed elements at or above `new_length`, highest first
    ///
    /// Returns the resulting length, which stays above `new_length` when a
    /// non-configurable element cannot be removed.
    fn truncate_dictionary_elements(&self, new_length: u32) -> u32 {
        let mut props = self.properties().write();
        let mut doomed: Vec<u32> = props
            .keys()
            .filter_map(PropertyKey::as_array_index)
            .filter(|&i| i >= new_length)
            .collect();
        doomed.sort_unstable_by(|a, b| b.cmp(a));

        for index in doomed {
            let key = PropertyKey::Index(index);
            if props.get(&key).is_some_and(|desc| !desc.is_configurable()) {
                return index + 1;
            }
            props.shift_remove(&key);
        }
        new_length
    }

    fn convert_locked(&self, data: &mut ArrayData) {
        let Some(values) = data.storage.take_dense() else {
            return;
        };

        let mut props = self.properties().write();
        let mut moved = 0usize;
        for (index, value) in values.into_iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            props.insert(PropertyKey::Index(index as u32), PropertyDescriptor::data(value));
            moved += 1;
        }
        debug!(length = data.length, moved, "array converted to dictionary mode");
    }

    pub(crate) fn array_get_own_property(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        let lock = self.array_data()?;
        if key.is_length() {
            return Some(lock.read().length_descriptor());
        }
        if let Some(index) = key.as_array_index() {
            let data = lock.read();
            if data.is_fast() {
                return data.fast_get(index);
            }
        }
        self.ordinary_get_own_property(key)
    }

    pub(crate) fn array_define_own_property(&self, key: PropertyKey, desc: PropertyDescriptor) -> VmResult<bool> {
        let Some(lock) = self.array_data() else {
            return Ok(self.ordinary_define_own_property(key, desc));
        };
        if key.is_length() {
            return self.define_array_length(lock, desc);
        }
        let Some(index) = key.as_array_index() else {
            return Ok(self.ordinary_define_own_property(key, desc));
        };

        let mut data = lock.write();
        if data.is_fast() {
            match &desc {
                PropertyDescriptor::Data { value, attributes } => {
                    let intent = AttributeIntent::Exact(*attributes);
                    if self.fast_set_locked(&mut data, index, value.clone(), intent)? == FastSet::Stored {
                        return Ok(true);
                    }
                }
                PropertyDescriptor::Accessor { .. } => self.convert_locked(&mut data),
            }
        }

        self.define_dictionary_element(&mut data, index, key, desc)
    }

    fn define_dictionary_element(
        &self,
        data: &mut ArrayData,
        index: u32,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> VmResult<bool> {
        let grows = index >= data.length;
        if grows {
            if !data.length_writable {
                return Ok(false);
            }
            if index + 1 == INVALID_ARRAY_INDEX {
                return Err(invalid_length());
            }
        }

        let defined = {
            let mut props = self.properties().write();
            Self::validate_and_apply(&mut props, key, desc, self.is_extensible())
        };
        if defined && grows {
            data.length = index + 1;
        }
        Ok(defined)
    }

    fn define_array_length(&self, lock: &RwLock<ArrayData>, desc: PropertyDescriptor) -> VmResult<bool> {
        let PropertyDescriptor::Data { value, attributes } = desc else {
            return Ok(false);
        };
        let new_length = to_array_length(&value)?;
        if attributes.enumerable || attributes.configurable {
            return Ok(false);
        }

        let mut data = lock.write();
        if !data.length_writable {
            return Ok(new_length == data.length && !attributes.writable);
        }
        self.set_length_locked(&mut data, new_length, false)?;
        let complete = data.length == new_length;
        if !attributes.writable {
            self.convert_locked(&mut data);
            data.length_writable = false;
        }
        Ok(complete)
    }

    pub(crate) fn array_set(&self, key: PropertyKey, value: Value) -> VmResult<bool> {
        let Some(lock) = self.array_data() else {
            return Ok(self.ordinary_set(key, value));
        };
        if key.is_length() {
            return self.set_array_length_from_value(&value);
        }
        let Some(index) = key.as_array_index() else {
            return Ok(self.ordinary_set(key, value));
        };

        let mut data = lock.write();
        if data.is_fast() {
            let intent = if data.is_occupied(index) {
                AttributeIntent::Unspecified
            } else {
                AttributeIntent::default_data()
            };
            if self.fast_set_locked(&mut data, index, value.clone(), intent)? == FastSet::Stored {
                return Ok(true);
            }
        }

        {
            let mut props = self.properties().write();
            match props.get_mut(&key) {
                Some(PropertyDescriptor::Data {
                    value: slot,
                    attributes,
                }) => {
                    if !attributes.writable {
                        return Ok(false);
                    }
                    *slot = value;
                    return Ok(true);
                }
                Some(PropertyDescriptor::Accessor { .. }) => return Ok(false),
                None => {}
            }
        }

        self.define_dictionary_element(&mut data, index, key, PropertyDescriptor::data(value))
    }

    pub(crate) fn array_delete(&self, key: &PropertyKey) -> bool {
        let Some(lock) = self.array_data() else {
            return self.ordinary_delete(key);
        };
        if key.is_length() {
            return false;
        }
        if let Some(index) = key.as_array_index() {
            let mut data = lock.write();
            if let ArrayStorage::Fast(values) = &mut data.storage {
                if let Some(slot) = values.get_mut(index as usize) {
                    *slot = Value::Empty;
                }
                return true;
            }
        }
        self.ordinary_delete(key)
    }

    pub(crate) fn array_own_keys(&self) -> Vec<PropertyKey> {
        let Some(lock) = self.array_data() else {
            return self.ordinary_own_keys();
        };
        let data = lock.read();
        let ordinary = self.ordinary_own_keys();

        let mut keys = Vec::with_capacity(ordinary.len() + 1);
        if let Some(values) = data.dense_values() {
            keys.extend(
                values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| !v.is_empty())
                    .map(|(i, _)| PropertyKey::Index(i as u32)),
            );
        }
        let split = ordinary
            .iter()
            .position(|k| k.as_array_index().is_none())
            .unwrap_or(ordinary.len());
        let (indices, strings) = ordinary.split_at(split);
        keys.extend_from_slice(indices);
        keys.push(PropertyKey::length());
        keys.extend_from_slice(strings);
        keys
    }
}
