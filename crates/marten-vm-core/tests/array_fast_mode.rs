//! Array storage mode tests
//!
//! Fast/dictionary transitions seen through the public object API, plus
//! property tests checking the dense storage against a simple model.

mod common;

use common::{Scripts, runtime};
use marten_vm_core::array::{ArrayMode, FastSet};
use marten_vm_core::object::{AttributeIntent, PropertyAttributes, PropertyDescriptor, PropertyKey};
use marten_vm_core::{JsObject, VmError, Value};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn array() -> JsObject {
    JsObject::new_array(None)
}

#[test]
fn test_append_to_empty_array() {
    let arr = array();
    assert_eq!(arr.array_length(), 0);
    assert!(arr.is_fast_mode_array());

    let stored = arr
        .array_fast_set(0, Value::int32(10), AttributeIntent::default_data())
        .unwrap();
    assert_eq!(stored, FastSet::Stored);
    assert_eq!(arr.array_length(), 1);
    let desc = arr.array_fast_get(0).expect("element 0");
    assert_eq!(desc.value(), Some(&Value::int32(10)));
    assert!(desc.attributes().is_default());
}

#[test]
fn test_frozen_element_leaves_fast_mode() {
    let arr = array();
    arr.set_array_length(5, false).unwrap();

    let outcome = arr
        .array_fast_set(5, Value::string("x"), AttributeIntent::Exact(PropertyAttributes::frozen()))
        .unwrap();
    assert_eq!(outcome, FastSet::Declined);
    assert!(!arr.is_fast_mode_array());
    assert!(arr.array_fast_get(5).is_none());

    // The generic path still defines it
    let defined = arr
        .define_own_property(
            PropertyKey::index(5),
            PropertyDescriptor::data_with_attrs(Value::string("x"), PropertyAttributes::frozen()),
        )
        .unwrap();
    assert!(defined);
    assert_eq!(arr.array_length(), 6);
    assert_eq!(arr.get(&PropertyKey::index(5)), Some(Value::string("x")));
    assert!(arr.array_fast_get(5).is_none());
}

#[test]
fn test_sparse_growth_leaves_fast_mode() {
    let arr = array();
    arr.set_array_length(10, false).unwrap();
    assert_eq!(arr.set_array_length(200_000, false).unwrap(), ArrayMode::Dictionary);
    assert_eq!(arr.array_length(), 200_000);
    assert!(arr.dense_len().is_none());
}

#[test]
fn test_writing_far_index_leaves_fast_mode() {
    let arr = array();
    arr.set(PropertyKey::index(0), Value::int32(1)).unwrap();
    arr.set(PropertyKey::index(1_000_000), Value::int32(2)).unwrap();

    assert!(!arr.is_fast_mode_array());
    assert_eq!(arr.array_length(), 1_000_001);
    assert_eq!(arr.get(&PropertyKey::index(0)), Some(Value::int32(1)));
    assert_eq!(arr.get(&PropertyKey::index(1_000_000)), Some(Value::int32(2)));
    assert_eq!(arr.get(&PropertyKey::index(5)), None);
}

#[test]
fn test_accessor_element_leaves_fast_mode() {
    let arr = array();
    arr.set(PropertyKey::index(0), Value::int32(1)).unwrap();
    arr.define_own_property(
        PropertyKey::index(1),
        PropertyDescriptor::accessor(None, None, PropertyAttributes::data()),
    )
    .unwrap();
    assert!(!arr.is_fast_mode_array());
    assert_eq!(arr.array_length(), 2);
}

#[test]
fn test_largest_index_is_rejected() {
    let arr = array();
    let err = arr
        .set(PropertyKey::index(u32::MAX - 1), Value::int32(1))
        .unwrap_err();
    assert!(matches!(err, VmError::RangeError(_)));

    // 2^32 - 1 is not an index at all
    assert!(arr.set(PropertyKey::index(u32::MAX), Value::int32(1)).unwrap());
    assert_eq!(arr.array_length(), 0);
    assert_eq!(arr.get(&PropertyKey::string("4294967295")), Some(Value::int32(1)));
}

#[test]
fn test_readonly_length_blocks_growth() {
    let arr = array();
    arr.set(PropertyKey::index(0), Value::int32(1)).unwrap();
    let frozen_length = arr
        .define_own_property(
            PropertyKey::length(),
            PropertyDescriptor::data_with_attrs(
                Value::int32(1),
                PropertyAttributes {
                    writable: false,
                    enumerable: false,
                    configurable: false,
                },
            ),
        )
        .unwrap();
    assert!(frozen_length);
    assert!(!arr.is_fast_mode_array());

    assert!(!arr.set(PropertyKey::index(1), Value::int32(2)).unwrap());
    assert_eq!(arr.array_length(), 1);
    assert!(!arr.set(PropertyKey::length(), Value::int32(0)).unwrap());
    assert_eq!(arr.get(&PropertyKey::index(0)), Some(Value::int32(1)));
}

#[test]
fn test_own_keys_order() {
    let arr = array();
    arr.set(PropertyKey::string("tag"), Value::boolean(true)).unwrap();
    arr.set(PropertyKey::index(1), Value::int32(1)).unwrap();
    arr.set(PropertyKey::index(0), Value::int32(0)).unwrap();

    let keys: Vec<String> = arr.own_keys().iter().map(ToString::to_string).collect();
    assert_eq!(keys, vec!["0", "1", "length", "tag"]);

    arr.convert_into_non_fast_mode();
    let keys: Vec<String> = arr.own_keys().iter().map(ToString::to_string).collect();
    assert_eq!(keys, vec!["0", "1", "length", "tag"]);
}

#[test]
fn test_context_tracks_arrays_in_both_modes() {
    let scripts = Scripts::new();
    let rt = runtime(&scripts);
    let ctx = rt.create_context();

    let fast = ctx.create_array_from(&[Value::int32(1)]).unwrap();
    let slow = ctx.create_array();
    slow.convert_into_non_fast_mode();

    let mut modes = Vec::new();
    ctx.iterate_arrays(|arr| modes.push(arr.is_fast_mode_array()));
    assert_eq!(modes, vec![true, false]);
    drop((fast, slow));

    let mut count = 0;
    ctx.iterate_arrays(|_| count += 1);
    assert_eq!(count, 0);
}

#[derive(Debug, Clone)]
enum Op {
    Set(u32, i32),
    Define(u32, i32, bool),
    SetLength(u32),
    Delete(u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u32..256, any::<i32>()).prop_map(|(i, v)| Op::Set(i, v)),
        1 => (0u32..256, any::<i32>(), any::<bool>()).prop_map(|(i, v, w)| Op::Define(i, v, w)),
        2 => (0u32..300).prop_map(Op::SetLength),
        1 => (0u32..256).prop_map(Op::Delete),
    ]
}

/// Reference model: element values by index plus the length
#[derive(Default)]
struct Model {
    elements: BTreeMap<u32, (i32, bool)>,
    length: u32,
}

impl Model {
    fn apply(&mut self, op: &Op) {
        match *op {
            Op::Set(index, value) => match self.elements.get_mut(&index) {
                Some((_, false)) => {}
                Some(slot) => slot.0 = value,
                None => {
                    self.elements.insert(index, (value, true));
                    self.length = self.length.max(index + 1);
                }
            },
            Op::Define(index, value, writable) => {
                // Every element stays configurable, so redefinition wins
                self.elements.insert(index, (value, writable));
                self.length = self.length.max(index + 1);
            }
            Op::SetLength(length) => {
                self.elements.retain(|&index, _| index < length);
                self.length = length;
            }
            Op::Delete(index) => {
                self.elements.remove(&index);
            }
        }
    }
}

fn run(arr: &JsObject, op: &Op) {
    match *op {
        Op::Set(index, value) => {
            arr.set(PropertyKey::index(index), Value::int32(value)).unwrap();
        }
        Op::Define(index, value, writable) => {
            let attributes = PropertyAttributes {
                writable,
                enumerable: true,
                configurable: true,
            };
            arr.define_own_property(
                PropertyKey::index(index),
                PropertyDescriptor::data_with_attrs(Value::int32(value), attributes),
            )
            .unwrap();
        }
        Op::SetLength(length) => {
            arr.set(PropertyKey::length(), Value::number(f64::from(length))).unwrap();
        }
        Op::Delete(index) => {
            arr.delete(&PropertyKey::index(index));
        }
    }
}

proptest! {
    #[test]
    fn prop_fast_mode_keeps_dense_vector_at_length(ops in prop::collection::vec(op(), 0..64)) {
        let arr = array();
        for op in &ops {
            run(&arr, op);
            if let Some(len) = arr.dense_len() {
                prop_assert_eq!(len, arr.array_length() as usize);
            }
        }
    }

    #[test]
    fn prop_elements_match_model(ops in prop::collection::vec(op(), 0..64)) {
        let arr = array();
        let mut model = Model::default();
        for op in &ops {
            run(&arr, op);
            model.apply(op);
        }

        prop_assert_eq!(arr.array_length(), model.length);
        for index in 0..300u32 {
            let expected = model.elements.get(&index).map(|(v, _)| Value::int32(*v));
            prop_assert_eq!(arr.get(&PropertyKey::index(index)), expected);
        }
    }

    #[test]
    fn prop_dictionary_mode_is_permanent(ops in prop::collection::vec(op(), 1..64)) {
        let arr = array();
        let mut left_fast_mode = false;
        for op in &ops {
            run(&arr, op);
            if left_fast_mode {
                prop_assert!(!arr.is_fast_mode_array());
            }
            left_fast_mode |= !arr.is_fast_mode_array();
        }
    }

    #[test]
    fn prop_default_writes_stay_fast(values in prop::collection::vec(any::<i32>(), 0..128)) {
        let arr = array();
        for (index, value) in values.iter().enumerate() {
            arr.set(PropertyKey::index(index as u32), Value::int32(*value)).unwrap();
        }
        prop_assert!(arr.is_fast_mode_array());
        prop_assert_eq!(arr.dense_len(), Some(values.len()));
    }
}
