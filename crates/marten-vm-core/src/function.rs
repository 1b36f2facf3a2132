//! Function objects

use std::sync::Arc;

use crate::code_block::{CodeBlock, NativeFunctionInfo};
use crate::context::Intrinsics;
use crate::environment::Environment;
use crate::error::VmError;
use crate::object::{JsObject, ObjectKind, ObjectRef, PropertyAttributes, PropertyDescriptor, PropertyKey};
use crate::string::well_known;
use crate::value::Value;

/// Internal slots of a function object
pub struct FunctionData {
    code_block: Arc<CodeBlock>,
    outer: Option<Arc<Environment>>,
}

impl FunctionData {
    pub(crate) fn new(code_block: Arc<CodeBlock>, outer: Option<Arc<Environment>>) -> Self {
        Self { code_block, outer }
    }

    /// Shared descriptor
    #[inline]
    pub fn code_block(&self) -> &Arc<CodeBlock> {
        &self.code_block
    }

    /// Defining environment (the closure link)
    #[inline]
    pub fn outer_environment(&self) -> Option<&Arc<Environment>> {
        self.outer.as_ref()
    }
}

impl std::fmt::Debug for FunctionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionData")
            .field("code_block", &self.code_block)
            .field("has_outer", &self.outer.is_some())
            .finish()
    }
}

/// Create a function object and its standard own properties
///
/// In order: `prototype` for constructors (with `constructor` pointing
/// back), `name`, `length`, and for strict script functions the poisoned
/// `caller` and `arguments` accessors.
pub(crate) fn create_function_object(
    intrinsics: &Intrinsics,
    code_block: Arc<CodeBlock>,
    outer: Option<Arc<Environment>>,
) -> ObjectRef {
    let kind = ObjectKind::Function(FunctionData::new(code_block.clone(), outer));
    let function = Arc::new(JsObject::with_kind(kind, Some(intrinsics.function_prototype.clone())));
    let mut props = function.properties().write();

    if code_block.is_constructor() {
        let prototype = Arc::new(JsObject::new(Some(intrinsics.object_prototype.clone())));
        prototype.properties().write().insert(
            PropertyKey::String(well_known::CONSTRUCTOR.clone()),
            PropertyDescriptor::data_with_attrs(Value::object(function.clone()), PropertyAttributes::hidden()),
        );
        props.insert(
            PropertyKey::String(well_known::PROTOTYPE.clone()),
            PropertyDescriptor::data_with_attrs(
                Value::object(prototype),
                PropertyAttributes {
                    writable: true,
                    enumerable: false,
                    configurable: false,
                },
            ),
        );
    }

    props.insert(
        PropertyKey::String(well_known::NAME.clone()),
        PropertyDescriptor::data_with_attrs(
            Value::from_js_string(code_block.name().clone()),
            PropertyAttributes::read_only(),
        ),
    );
    props.insert(
        PropertyKey::String(well_known::LENGTH.clone()),
        PropertyDescriptor::data_with_attrs(
            Value::number(code_block.parameter_count() as f64),
            PropertyAttributes::read_only(),
        ),
    );

    if code_block.is_strict() && !code_block.is_native() {
        let thrower = Value::object(intrinsics.thrower.clone());
        let poisoned = PropertyAttributes {
            writable: false,
            enumerable: false,
            configurable: false,
        };
        for name in [&well_known::CALLER, &well_known::ARGUMENTS] {
            props.insert(
                PropertyKey::String((*name).clone()),
                PropertyDescriptor::accessor(Some(thrower.clone()), Some(thrower.clone()), poisoned),
            );
        }
    }

    drop(props);
    function
}

/// The shared accessor that poisons `caller`, `arguments` and strict `callee`
///
/// A frozen native function with no own properties; both getting and
/// setting through it raise a TypeError.
pub(crate) fn create_thrower(function_prototype: &ObjectRef) -> ObjectRef {
    let info = NativeFunctionInfo::new("", 0, |_, _| {
        Err(VmError::type_error(
            "'caller', 'callee', and 'arguments' properties may not be accessed on strict mode functions or the arguments objects for calls to them",
        ))
    });
    let kind = ObjectKind::Function(FunctionData::new(Arc::new(CodeBlock::native(info)), None));
    let thrower = Arc::new(JsObject::with_kind(kind, Some(function_prototype.clone())));
    thrower.prevent_extensions();
    thrower
}
