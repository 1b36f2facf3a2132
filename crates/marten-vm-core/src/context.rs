//! VM execution context
//!
//! The context owns everything one thread of execution shares across
//! calls: the global object and environment, intrinsic prototypes, the
//! compiled code cache, memory accounting, the array registry and the
//! external collaborators.

use marten_vm_bytecode::FunctionInfo;
use std::sync::Arc;

use crate::code_block::{CodeBlock, NativeFunctionInfo};
use crate::code_cache::CompiledCodeCache;
use crate::compiler::{CodeGenerator, FunctionParser};
use crate::environment::Environment;
use crate::error::VmResult;
use crate::exception::ExceptionProcessor;
use crate::frame::CallFrame;
use crate::function;
use crate::gc::ArrayRegistry;
use crate::interpreter::Interpreter;
use crate::memory::MemoryManager;
use crate::object::{JsObject, ObjectKind, ObjectRef, PropertyAttributes, PropertyDescriptor, PropertyKey};
use crate::runtime::RuntimeConfig;
use crate::value::Value;

/// External services a context calls into
#[derive(Clone)]
pub struct Collaborators {
    /// Re-parses function bodies for lazy compilation
    pub parser: Arc<dyn FunctionParser>,
    /// Generates bytecode from syntax trees
    pub code_generator: Arc<dyn CodeGenerator>,
    /// Runs compiled code
    pub interpreter: Arc<dyn Interpreter>,
    /// Handles errors leaving a call
    pub exception_processor: Arc<dyn ExceptionProcessor>,
}

/// Built-in objects every context starts with
pub struct Intrinsics {
    /// `Object.prototype`
    pub object_prototype: ObjectRef,
    /// `Function.prototype`
    pub function_prototype: ObjectRef,
    /// `Array.prototype`
    pub array_prototype: ObjectRef,
    /// `Boolean.prototype`
    pub boolean_prototype: ObjectRef,
    /// `Number.prototype`
    pub number_prototype: ObjectRef,
    /// `String.prototype`
    pub string_prototype: ObjectRef,
    /// Shared poison-pill accessor for strict `caller`/`arguments`/`callee`
    pub thrower: ObjectRef,
}

impl Intrinsics {
    fn new() -> Self {
        let object_prototype = Arc::new(JsObject::new(None));
        let derived = || Arc::new(JsObject::new(Some(object_prototype.clone())));
        let function_prototype = derived();
        let array_prototype = derived();
        let boolean_prototype = derived();
        let number_prototype = derived();
        let string_prototype = derived();
        let thrower = function::create_thrower(&function_prototype);
        Self {
            object_prototype,
            function_prototype,
            array_prototype,
            boolean_prototype,
            number_prototype,
            string_prototype,
            thrower,
        }
    }
}

/// VM execution context
///
/// `Send + Sync`, but calls run on one thread at a time; the cache and
/// registries are internally synchronized.
pub struct VmContext {
    config: RuntimeConfig,
    global: ObjectRef,
    global_environment: Arc<Environment>,
    intrinsics: Intrinsics,
    code_cache: CompiledCodeCache,
    arrays: ArrayRegistry,
    memory: Arc<MemoryManager>,
    collaborators: Collaborators,
}

impl VmContext {
    /// Create a context with a fresh global object
    pub fn new(config: RuntimeConfig, collaborators: Collaborators) -> Self {
        let intrinsics = Intrinsics::new();
        let global = Arc::new(JsObject::new(Some(intrinsics.object_prototype.clone())));
        let global_environment = Arc::new(Environment::global(global.clone()));
        Self {
            code_cache: CompiledCodeCache::new(config.code_cache_limit),
            memory: Arc::new(MemoryManager::new(config.max_heap_size)),
            config,
            global,
            global_environment,
            intrinsics,
            arrays: ArrayRegistry::new(),
            collaborators,
        }
    }

    /// Configuration
    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Global object
    #[inline]
    pub fn global(&self) -> &ObjectRef {
        &self.global
    }

    /// Global environment
    #[inline]
    pub fn global_environment(&self) -> &Arc<Environment> {
        &self.global_environment
    }

    /// Intrinsic objects
    #[inline]
    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    /// Compiled code cache
    #[inline]
    pub fn code_cache(&self) -> &CompiledCodeCache {
        &self.code_cache
    }

    /// Memory accounting
    #[inline]
    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// Parser collaborator
    pub fn parser(&self) -> &dyn FunctionParser {
        self.collaborators.parser.as_ref()
    }

    /// Bytecode generator collaborator
    pub fn code_generator(&self) -> &dyn CodeGenerator {
        self.collaborators.code_generator.as_ref()
    }

    /// Interpreter collaborator
    pub fn interpreter(&self) -> &dyn Interpreter {
        self.collaborators.interpreter.as_ref()
    }

    /// Exception processor collaborator
    pub fn exception_processor(&self) -> &dyn ExceptionProcessor {
        self.collaborators.exception_processor.as_ref()
    }

    /// Bottom frame of the call chain
    pub fn root_frame(&self) -> CallFrame<'_> {
        CallFrame::root(self)
    }

    /// Call `function` from the top level
    pub fn call(&self, function: &Value, this: Value, args: &[Value]) -> VmResult<Value> {
        self.root_frame().call(function, this, args)
    }

    /// Call `function` as a constructor from the top level
    pub fn construct(&self, function: &Value, this: Value, args: &[Value]) -> VmResult<Value> {
        self.root_frame().construct(function, this, args)
    }

    /// Define (or overwrite) a global binding
    pub fn define_global(&self, name: &str, value: Value) -> VmResult<bool> {
        self.global.define_own_property(
            PropertyKey::string(name),
            PropertyDescriptor::data_with_attrs(value, PropertyAttributes::hidden()),
        )
    }

    /// Create an ordinary object inheriting from `Object.prototype`
    pub fn create_object(&self) -> ObjectRef {
        Arc::new(JsObject::new(Some(self.intrinsics.object_prototype.clone())))
    }

    /// Create an empty array
    pub fn create_array(&self) -> ObjectRef {
        let array = Arc::new(JsObject::new_array(Some(self.intrinsics.array_prototype.clone())));
        self.arrays.register(&array);
        array
    }

    /// Create an array the way `new Array(length)` does
    ///
    /// The array stays in fast mode whatever the length.
    pub fn create_array_with_length(&self, length: u32) -> VmResult<ObjectRef> {
        let array = self.create_array();
        array.set_array_length(length, true)?;
        Ok(array)
    }

    /// Create a dense array holding `values`
    pub fn create_array_from(&self, values: &[Value]) -> VmResult<ObjectRef> {
        let array = self.create_array();
        for (index, value) in values.iter().enumerate() {
            array.set(PropertyKey::index(index as u32), value.clone())?;
        }
        Ok(array)
    }

    /// Create a function object for `code_block` closing over `outer`
    pub fn create_function(&self, code_block: Arc<CodeBlock>, outer: Option<Arc<Environment>>) -> ObjectRef {
        function::create_function_object(&self.intrinsics, code_block, outer)
    }

    /// Create a top-level script function
    pub fn create_script_function(&self, info: FunctionInfo) -> ObjectRef {
        self.create_function(
            Arc::new(CodeBlock::script(info)),
            Some(self.global_environment.clone()),
        )
    }

    /// Create a host function
    pub fn create_native_function(&self, info: NativeFunctionInfo) -> ObjectRef {
        self.create_function(Arc::new(CodeBlock::native(info)), None)
    }

    /// Wrap a primitive in its wrapper object
    pub fn box_primitive(&self, value: Value) -> ObjectRef {
        let prototype = match &value {
            Value::Boolean(_) => &self.intrinsics.boolean_prototype,
            Value::Number(_) => &self.intrinsics.number_prototype,
            Value::String(_) => &self.intrinsics.string_prototype,
            _ => &self.intrinsics.object_prototype,
        };
        let length = value.as_string().map(|s| s.utf16_len());
        let wrapper = Arc::new(JsObject::with_kind(
            ObjectKind::PrimitiveWrapper(value),
            Some(prototype.clone()),
        ));
        if let Some(length) = length {
            wrapper.properties().write().insert(
                PropertyKey::length(),
                PropertyDescriptor::data_with_attrs(Value::number(length as f64), PropertyAttributes::frozen()),
            );
        }
        wrapper
    }

    /// Visit every live array created by this context
    pub fn iterate_arrays(&self, callback: impl FnMut(&ObjectRef)) {
        self.arrays.iterate(callback);
    }
}

impl std::fmt::Debug for VmContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmContext")
            .field("config", &self.config)
            .field("code_cache", &self.code_cache)
            .field("memory", &self.memory)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_block::CompiledCode;
    use crate::compiler::SyntaxTree;
    use crate::error::VmError;
    use crate::exception::UnwindingProcessor;
    use crate::frame::RegisterFile;
    use crate::string::well_known;
    use marten_vm_bytecode::ByteCodeBlock;

    struct NoCompiler;

    impl FunctionParser for NoCompiler {
        fn parse_function(&self, _: &FunctionInfo, _: usize) -> VmResult<SyntaxTree> {
            Err(VmError::syntax_error("no parser in this test"))
        }
    }

    impl CodeGenerator for NoCompiler {
        fn generate(&self, _: &FunctionInfo, _: SyntaxTree) -> VmResult<ByteCodeBlock> {
            Err(VmError::internal("no generator in this test"))
        }
    }

    impl Interpreter for NoCompiler {
        fn run(&self, _: &CallFrame<'_>, _: &CompiledCode, _: &mut RegisterFile) -> VmResult<Value> {
            Err(VmError::internal("no interpreter in this test"))
        }
    }

    fn context() -> VmContext {
        VmContext::new(
            RuntimeConfig::default(),
            Collaborators {
                parser: Arc::new(NoCompiler),
                code_generator: Arc::new(NoCompiler),
                interpreter: Arc::new(NoCompiler),
                exception_processor: Arc::new(UnwindingProcessor),
            },
        )
    }

    fn string_key(name: &Arc<crate::string::JsString>) -> PropertyKey {
        PropertyKey::String(name.clone())
    }

    #[test]
    fn test_constructor_function_properties() {
        let ctx = context();
        let info = FunctionInfo::builder()
            .name("Point")
            .is_constructor(true)
            .parameter("x", marten_vm_bytecode::BindingLocation::Stack(2))
            .parameter("y", marten_vm_bytecode::BindingLocation::Stack(3))
            .stack_slot_count(4)
            .build()
            .unwrap();
        let func = ctx.create_script_function(info);

        let keys = func.own_keys();
        assert_eq!(
            keys,
            vec![
                string_key(&well_known::PROTOTYPE),
                string_key(&well_known::NAME),
                string_key(&well_known::LENGTH),
            ]
        );

        let length = func.get_own_property(&string_key(&well_known::LENGTH)).unwrap();
        assert_eq!(length.value(), Some(&Value::number(2.0)));
        assert!(!length.is_writable());
        assert!(!length.is_enumerable());
        assert!(length.is_configurable());

        let proto = func.get_own_property(&string_key(&well_known::PROTOTYPE)).unwrap();
        assert!(proto.is_writable());
        assert!(!proto.is_configurable());
        let proto = proto.value().and_then(Value::as_object).unwrap().clone();
        let ctor = proto.get(&string_key(&well_known::CONSTRUCTOR)).unwrap();
        assert!(ctor.same_object(&func));
    }

    #[test]
    fn test_strict_function_poisons_caller_and_arguments() {
        let ctx = context();
        let info = FunctionInfo::builder().name("s").is_strict(true).build().unwrap();
        let func = ctx.create_script_function(info);

        for name in [&well_known::CALLER, &well_known::ARGUMENTS] {
            let desc = func.get_own_property(&string_key(name)).unwrap();
            assert!(desc.is_accessor());
            assert!(!desc.is_configurable());
            match desc {
                PropertyDescriptor::Accessor { get, set, .. } => {
                    assert!(get.unwrap().same_object(&ctx.intrinsics().thrower));
                    assert!(set.unwrap().same_object(&ctx.intrinsics().thrower));
                }
                PropertyDescriptor::Data { .. } => unreachable!(),
            }
        }

        let thrower = Value::object(ctx.intrinsics().thrower.clone());
        let err = ctx.call(&thrower, Value::undefined(), &[]).unwrap_err();
        assert!(matches!(err, VmError::TypeError(_)));
    }

    #[test]
    fn test_sloppy_and_native_functions_have_no_poisoned_accessors() {
        let ctx = context();
        let sloppy = ctx.create_script_function(FunctionInfo::builder().name("f").build().unwrap());
        assert!(!sloppy.has_own(&string_key(&well_known::CALLER)));

        let native = ctx.create_native_function(
            NativeFunctionInfo::new("n", 1, |_, call| Ok(call.arg(0))).strict(true),
        );
        assert!(!native.has_own(&string_key(&well_known::ARGUMENTS)));
        assert!(!native.has_own(&string_key(&well_known::PROTOTYPE)));
    }

    #[test]
    fn test_thrower_is_frozen() {
        let ctx = context();
        let thrower = &ctx.intrinsics().thrower;
        assert!(!thrower.is_extensible());
        assert!(thrower.own_keys().is_empty());
    }

    #[test]
    fn test_native_call_through_context() {
        let ctx = context();
        let add = ctx.create_native_function(NativeFunctionInfo::new("add", 2, |_, call| {
            Ok(Value::number(call.arg(0).to_number() + call.arg(1).to_number()))
        }));
        let result = ctx
            .call(&Value::object(add), Value::undefined(), &[Value::int32(2), Value::int32(3)])
            .unwrap();
        assert_eq!(result, Value::number(5.0));
    }

    #[test]
    fn test_lazy_compile_failure_propagates() {
        let ctx = context();
        let func = ctx.create_script_function(FunctionInfo::builder().name("f").build().unwrap());
        let err = ctx.call(&Value::object(func), Value::undefined(), &[]).unwrap_err();
        assert!(matches!(err, VmError::SyntaxError(_)));
        assert!(ctx.code_cache().is_empty());
    }

    #[test]
    fn test_box_primitive_prototypes() {
        let ctx = context();
        let boxed = ctx.box_primitive(Value::number(1.0));
        assert!(Arc::ptr_eq(boxed.prototype().unwrap(), &ctx.intrinsics().number_prototype));

        let boxed = ctx.box_primitive(Value::string("abc"));
        assert!(Arc::ptr_eq(boxed.prototype().unwrap(), &ctx.intrinsics().string_prototype));
        assert_eq!(boxed.get(&PropertyKey::length()), Some(Value::number(3.0)));
    }

    #[test]
    fn test_array_factories_and_registry() {
        let ctx = context();
        let large = ctx.create_array_with_length(1_000_000).unwrap();
        assert!(large.is_fast_mode_array());
        assert_eq!(large.array_length(), 1_000_000);

        let dense = ctx.create_array_from(&[Value::int32(1), Value::int32(2)]).unwrap();
        assert_eq!(dense.array_length(), 2);
        assert_eq!(dense.get(&PropertyKey::index(1)), Some(Value::int32(2)));

        let mut seen = 0;
        ctx.iterate_arrays(|_| seen += 1);
        assert_eq!(seen, 2);

        drop(large);
        let mut seen = 0;
        ctx.iterate_arrays(|_| seen += 1);
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_define_global_is_visible_through_global_environment() {
        let ctx = context();
        ctx.define_global("answer", Value::int32(42)).unwrap();
        assert_eq!(ctx.global_environment().lookup("answer"), Some(Value::int32(42)));
    }

    #[test]
    fn test_context_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VmContext>();
    }
}
