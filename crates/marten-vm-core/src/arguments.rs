//! The `arguments` object
//!
//! Materialized only for functions whose descriptor says the body observes
//! it. The object is a snapshot: later writes to parameters are not
//! reflected.

use marten_vm_bytecode::{BindingLocation, FunctionInfo};
use std::sync::Arc;
use tracing::trace;

use crate::call::binding_frame;
use crate::context::VmContext;
use crate::error::VmResult;
use crate::frame::{CallFrame, RegisterFile};
use crate::object::{JsObject, ObjectKind, ObjectRef, PropertyAttributes, PropertyDescriptor, PropertyKey};
use crate::string::well_known;
use crate::value::Value;

/// Build an arguments object
///
/// Elements are default data properties, `length` is non-enumerable. In
/// non-strict code `callee` is the function itself; strict code gets the
/// shared thrower accessor instead.
pub fn create_arguments_object(context: &VmContext, callee: &ObjectRef, args: &[Value], is_strict: bool) -> ObjectRef {
    let intrinsics = context.intrinsics();
    let arguments = Arc::new(JsObject::with_kind(
        ObjectKind::Arguments,
        Some(intrinsics.object_prototype.clone()),
    ));

    let mut props = arguments.properties().write();
    for (index, arg) in args.iter().enumerate() {
        props.insert(PropertyKey::index(index as u32), PropertyDescriptor::data(arg.clone()));
    }
    props.insert(
        PropertyKey::length(),
        PropertyDescriptor::data_with_attrs(Value::number(args.len() as f64), PropertyAttributes::hidden()),
    );

    let callee_key = PropertyKey::String(well_known::CALLEE.clone());
    let callee_desc = if is_strict {
        let thrower = Value::object(intrinsics.thrower.clone());
        PropertyDescriptor::accessor(Some(thrower.clone()), Some(thrower), PropertyAttributes::frozen())
    } else {
        PropertyDescriptor::data_with_attrs(Value::object(callee.clone()), PropertyAttributes::hidden())
    };
    props.insert(callee_key, callee_desc);

    drop(props);
    arguments
}

/// Create the arguments object for the current call and bind it
///
/// Dictionary frames get an `arguments` binding (created if absent).
/// Other frames write to the slot the identifier table resolves
/// `arguments` to.
pub(crate) fn materialize(
    frame: &CallFrame<'_>,
    info: &FunctionInfo,
    registers: &mut RegisterFile,
    callee: &ObjectRef,
    args: &[Value],
) -> VmResult<()> {
    let arguments = Value::object(create_arguments_object(frame.context(), callee, args, info.is_strict()));
    let bindings = binding_frame(frame)?;

    if bindings.is_dictionary() {
        let name = well_known::ARGUMENTS.clone();
        if !bindings.has_binding(&name) {
            bindings.create_binding(name.clone())?;
        }
        return bindings.set_binding(&name, arguments);
    }

    match info.arguments_location() {
        Some(BindingLocation::Stack(slot)) => registers.set_local(slot, arguments),
        Some(BindingLocation::Heap(slot)) => bindings.set_heap_slot(slot, arguments),
        Some(BindingLocation::Named) | None => {
            trace!(function = info.display_name(), "arguments object has no static slot");
            Ok(())
        }
    }
}
