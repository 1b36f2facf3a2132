//! Call dispatch
//!
//! [`call_function`] turns a function object, a receiver and an argument
//! list into a completed call: depth check, lazy compilation, binding
//! frame selection, receiver and parameter binding, `arguments`
//! materialization and finally the interpreter or host routine.

use marten_vm_bytecode::{BindingLocation, FunctionInfo, RESERVED_STACK_SLOTS};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::trace;

use crate::arguments;
use crate::code_block::{CodeBlock, CodeKind, NativeCall, NativeFn, ScriptCode};
use crate::compiler;
use crate::context::VmContext;
use crate::environment::{BindingFrame, Environment};
use crate::error::{VmError, VmResult};
use crate::frame::{CallFrame, FrameEnvironment, RegisterFile};
use crate::function::FunctionData;
use crate::object::ObjectRef;
use crate::string::JsString;
use crate::value::Value;

/// Call `function` from `caller`
///
/// Fails with [`VmError::StackOverflow`] before touching anything when the
/// caller is already at the configured depth limit or has consumed
/// `max_stack_size` bytes of native stack.
pub fn call_function(
    caller: &CallFrame<'_>,
    function: &ObjectRef,
    receiver: Value,
    args: &[Value],
    is_construct: bool,
) -> VmResult<Value> {
    let config = caller.context().config();
    if caller.depth() >= config.max_stack_depth || caller.native_stack_used() > config.max_stack_size {
        return Err(VmError::StackOverflow);
    }

    let data = function
        .as_function()
        .ok_or_else(|| VmError::type_error("object is not a function"))?;
    let code_block = data.code_block();
    if is_construct && !code_block.is_constructor() {
        return Err(VmError::type_error(format!(
            "{} is not a constructor",
            display_name(code_block)
        )));
    }

    trace!(
        function = display_name(code_block),
        depth = caller.depth() + 1,
        argc = args.len(),
        "call"
    );
    match code_block.kind() {
        CodeKind::Native(func) => call_native(caller, function, data, func, receiver, args, is_construct),
        CodeKind::Script(script) => call_script(caller, function, data, script, receiver, args),
    }
}

fn call_native(
    caller: &CallFrame<'_>,
    function: &ObjectRef,
    data: &FunctionData,
    func: &NativeFn,
    receiver: Value,
    args: &[Value],
    is_construct: bool,
) -> VmResult<Value> {
    let code_block = data.code_block();
    let environment = Environment::on_stack(function.clone(), data.outer_environment().cloned());
    let frame = CallFrame::push(caller, FrameEnvironment::Borrowed(&environment), code_block.is_strict());

    let padded: SmallVec<[Value; 8]>;
    let argv = if args.len() < code_block.parameter_count() {
        let missing = code_block.parameter_count() - args.len();
        padded = args
            .iter()
            .cloned()
            .chain(std::iter::repeat_n(Value::Undefined, missing))
            .collect();
        &padded[..]
    } else {
        args
    };

    let call = NativeCall {
        this: prepare_receiver(frame.context(), receiver, code_block.is_strict()),
        args: argv,
        argc: args.len(),
        is_construct,
    };
    match func(&frame, call) {
        Ok(value) => Ok(value),
        Err(error) => frame
            .context()
            .exception_processor()
            .process(&frame, error)
            .into_result(),
    }
}

fn call_script(
    caller: &CallFrame<'_>,
    function: &ObjectRef,
    data: &FunctionData,
    script: &ScriptCode,
    receiver: Value,
    args: &[Value],
) -> VmResult<Value> {
    let code_block = data.code_block();
    let compiled = compiler::ensure_compiled(caller, code_block, script)?;
    let context = caller.context();
    let info = script.info();
    let outer = data.outer_environment().cloned();

    let stack_environment;
    let environment = if info.flags.can_allocate_environment_on_stack {
        stack_environment = Environment::on_stack(function.clone(), outer);
        FrameEnvironment::Borrowed(&stack_environment)
    } else if info.flags.can_use_indexed_variable_storage {
        let slots = info.heap_slot_count as usize;
        FrameEnvironment::Shared(Arc::new(Environment::indexed(
            function.clone(),
            outer,
            slots,
            context.memory(),
        )?))
    } else {
        FrameEnvironment::Shared(Arc::new(Environment::dictionary(
            function.clone(),
            outer,
            info,
            context.memory(),
        )?))
    };
    let frame = CallFrame::push(caller, environment, info.is_strict());

    let mut registers = RegisterFile::new(
        compiled.register_count(),
        info.stack_slot_count as usize,
        compiled.literals(),
    );
    registers.set_local(0, prepare_receiver(context, receiver, info.is_strict()))?;
    registers.set_local(1, Value::object(function.clone()))?;

    if info.flags.saves_function_name_on_heap {
        bind_function_name(&frame, code_block, function)?;
    }
    bind_parameters(&frame, info, &mut registers, args)?;
    if info.flags.uses_arguments_object {
        arguments::materialize(&frame, info, &mut registers, function, args)?;
    }

    let result = context.interpreter().run(&frame, &compiled, &mut registers);
    // Scrubbed locals are gone before the exception processor sees the error
    if compiled.should_clear_stack() {
        registers.scrub(context.config().clear_stack_slots);
    }
    match result {
        Ok(value) => Ok(value),
        Err(error) => context
            .exception_processor()
            .process(&frame, error)
            .into_result(),
    }
}

/// Receiver seen by the callee
///
/// Strict code gets the receiver as passed. Non-strict code gets the global
/// object for a nullish receiver and a wrapper object for a primitive.
pub fn prepare_receiver(context: &VmContext, receiver: Value, is_strict: bool) -> Value {
    if is_strict {
        return receiver;
    }
    match receiver {
        Value::Undefined | Value::Null | Value::Empty => Value::object(context.global().clone()),
        Value::Object(_) => receiver,
        primitive => Value::object(context.box_primitive(primitive)),
    }
}

pub(crate) fn binding_frame<'f>(frame: &'f CallFrame<'_>) -> VmResult<&'f BindingFrame> {
    frame
        .binding_frame()
        .ok_or_else(|| VmError::internal("call frame has no binding frame"))
}

fn bind_function_name(frame: &CallFrame<'_>, code_block: &CodeBlock, function: &ObjectRef) -> VmResult<()> {
    let bindings = binding_frame(frame)?;
    let callee = Value::object(function.clone());
    if bindings.is_indexed() {
        return bindings.set_heap_slot(0, callee);
    }
    if bindings.is_dictionary() {
        let name = code_block.name().clone();
        bindings.create_binding(name.clone())?;
        return bindings.set_binding(&name, callee);
    }
    Ok(())
}

fn bind_parameters(
    frame: &CallFrame<'_>,
    info: &FunctionInfo,
    registers: &mut RegisterFile,
    args: &[Value],
) -> VmResult<()> {
    let reserved = RESERVED_STACK_SLOTS as usize;

    if !info.flags.needs_complex_parameter_copy {
        let stack = registers.stack_mut();
        let copied = args
            .len()
            .min(info.parameter_count())
            .min(stack.len().saturating_sub(reserved));
        stack[reserved..reserved + copied].clone_from_slice(&args[..copied]);
        stack[reserved + copied..].fill(Value::Undefined);
        return Ok(());
    }

    registers.stack_mut()[reserved..].fill(Value::Undefined);
    for (index, param) in info.parameters.iter().enumerate() {
        let value = args.get(index).cloned().unwrap_or_default();
        match param.location {
            BindingLocation::Stack(slot) => registers.set_local(slot, value)?,
            BindingLocation::Heap(slot) => binding_frame(frame)?.set_heap_slot(slot, value)?,
            BindingLocation::Named => {
                let bindings = binding_frame(frame)?;
                let name = JsString::intern(&param.name);
                if !bindings.has_binding(&name) {
                    bindings.create_binding(name.clone())?;
                }
                bindings.set_binding(&name, value)?;
            }
        }
    }
    Ok(())
}

fn display_name(code_block: &CodeBlock) -> &str {
    let name = code_block.name().as_str();
    if name.is_empty() { "<anonymous>" } else { name }
}
