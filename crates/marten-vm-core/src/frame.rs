//! Call frame chain and per-activation register file
//!
//! A [`CallFrame`] is a node of the live call stack. Nodes are Rust locals
//! of the dispatcher linked to their caller by reference, so the chain
//! exactly mirrors the native stack and unwinds with it.

use smallvec::SmallVec;
use std::sync::Arc;

use crate::call;
use crate::code_block::CodeBlock;
use crate::context::VmContext;
use crate::environment::{BindingFrame, Environment};
use crate::error::{VmError, VmResult};
use crate::object::ObjectRef;
use crate::value::Value;

/// Register file slots kept inline before spilling to the heap
pub const INLINE_FRAME_SLOTS: usize = 32;

/// Environment of a frame
pub enum FrameEnvironment<'a> {
    /// Call-scoped environment owned by the dispatcher
    Borrowed(&'a Environment),
    /// Heap environment, shareable with closures
    Shared(Arc<Environment>),
}

impl FrameEnvironment<'_> {
    /// The environment
    pub fn get(&self) -> &Environment {
        match self {
            Self::Borrowed(env) => env,
            Self::Shared(env) => env,
        }
    }
}

/// A node of the live call stack
pub struct CallFrame<'a> {
    context: &'a VmContext,
    parent: Option<&'a CallFrame<'a>>,
    environment: FrameEnvironment<'a>,
    is_strict: bool,
    depth: usize,
    stack_base: usize,
}

/// Approximate native stack pointer of the caller
#[inline(always)]
fn stack_address() -> usize {
    let marker = 0u8;
    std::hint::black_box(std::ptr::addr_of!(marker)) as usize
}

impl<'a> CallFrame<'a> {
    /// Outermost frame of a context, running in the global environment
    pub fn root(context: &'a VmContext) -> Self {
        Self {
            context,
            parent: None,
            environment: FrameEnvironment::Shared(context.global_environment().clone()),
            is_strict: false,
            depth: 0,
            stack_base: stack_address(),
        }
    }

    /// Push a frame on top of `parent`
    pub(crate) fn push(parent: &'a CallFrame<'a>, environment: FrameEnvironment<'a>, is_strict: bool) -> Self {
        Self {
            context: parent.context,
            parent: Some(parent),
            environment,
            is_strict,
            depth: parent.depth + 1,
            stack_base: parent.stack_base,
        }
    }

    /// Owning context
    #[inline]
    pub fn context(&self) -> &'a VmContext {
        self.context
    }

    /// Caller frame
    #[inline]
    pub fn parent(&self) -> Option<&'a CallFrame<'a>> {
        self.parent
    }

    /// Number of frames below this one
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Native stack bytes consumed since the root frame was created
    ///
    /// The stack may grow in either direction, so this is the distance
    /// between the root's stack address and the current one.
    #[inline]
    pub fn native_stack_used(&self) -> usize {
        self.stack_base.abs_diff(stack_address())
    }

    /// Strict mode code
    #[inline]
    pub fn is_strict(&self) -> bool {
        self.is_strict
    }

    /// Lexical environment
    #[inline]
    pub fn environment(&self) -> &Environment {
        self.environment.get()
    }

    /// Environment a closure created in this frame captures
    ///
    /// Call-scoped environments cannot be captured; closures link to the
    /// nearest heap environment instead.
    pub fn closure_environment(&self) -> Option<Arc<Environment>> {
        match &self.environment {
            FrameEnvironment::Shared(env) => Some(env.clone()),
            FrameEnvironment::Borrowed(env) => env.outer().cloned(),
        }
    }

    /// Binding frame of the running function (None for the root frame)
    pub fn binding_frame(&self) -> Option<&BindingFrame> {
        self.environment().binding_frame()
    }

    /// Running function (None for the root frame)
    pub fn function(&self) -> Option<&ObjectRef> {
        self.environment().function()
    }

    /// Code block of the running function
    pub fn code_block(&self) -> Option<&Arc<CodeBlock>> {
        self.function()
            .and_then(|f| f.as_function())
            .map(|data| data.code_block())
    }

    /// This frame and all callers, innermost first
    pub fn ancestors(&self) -> impl Iterator<Item = &CallFrame<'a>> {
        std::iter::successors(Some(self), |frame| frame.parent)
    }

    /// Script code blocks with compiled code referenced by the live chain
    pub fn live_code_blocks(&self) -> Vec<Arc<CodeBlock>> {
        let mut live: Vec<Arc<CodeBlock>> = Vec::new();
        for frame in self.ancestors() {
            let Some(block) = frame.code_block() else {
                continue;
            };
            if block.has_compiled_code() && !live.iter().any(|b| Arc::ptr_eq(b, block)) {
                live.push(block.clone());
            }
        }
        live
    }

    /// Remaining nesting budget handed to the parser
    pub fn stack_budget(&self) -> usize {
        self.context
            .config()
            .max_stack_depth
            .saturating_sub(self.depth)
    }

    /// Call `function` from this frame
    pub fn call(&self, function: &Value, this: Value, args: &[Value]) -> VmResult<Value> {
        let function = function
            .as_object()
            .ok_or_else(|| VmError::type_error(format!("{:?} is not a function", function)))?;
        call::call_function(self, function, this, args, false)
    }

    /// Call `function` as a constructor from this frame
    pub fn construct(&self, function: &Value, this: Value, args: &[Value]) -> VmResult<Value> {
        let function = function
            .as_object()
            .ok_or_else(|| VmError::type_error(format!("{:?} is not a constructor", function)))?;
        call::call_function(self, function, this, args, true)
    }
}

impl std::fmt::Debug for CallFrame<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallFrame")
            .field("depth", &self.depth)
            .field("stack_used", &self.native_stack_used())
            .field("strict", &self.is_strict)
            .field("environment", self.environment())
            .finish()
    }
}

/// Working storage of one activation
///
/// A single contiguous buffer: interpreter registers, then stack storage
/// (slot 0 receiver, slot 1 callee, then parameters and locals), then a
/// copy of the literal pool.
pub struct RegisterFile {
    slots: SmallVec<[Value; INLINE_FRAME_SLOTS]>,
    register_count: usize,
    stack_count: usize,
}

impl RegisterFile {
    /// Allocate the buffer; registers and stack storage start `undefined`
    pub fn new(register_count: usize, stack_count: usize, literals: &[Value]) -> Self {
        let mut slots = SmallVec::with_capacity(register_count + stack_count + literals.len());
        slots.resize(register_count + stack_count, Value::undefined());
        slots.extend(literals.iter().cloned());
        tracing::trace!(register_count, stack_count, literals = literals.len(), "register file");
        Self {
            slots,
            register_count,
            stack_count,
        }
    }

    /// Total slots
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether the buffer spilled to the heap
    pub fn spilled(&self) -> bool {
        self.slots.spilled()
    }

    /// Interpreter registers
    pub fn registers(&self) -> &[Value] {
        &self.slots[..self.register_count]
    }

    /// Interpreter registers, mutable
    pub fn registers_mut(&mut self) -> &mut [Value] {
        &mut self.slots[..self.register_count]
    }

    /// Stack storage
    pub fn stack(&self) -> &[Value] {
        &self.slots[self.register_count..self.register_count + self.stack_count]
    }

    /// Stack storage, mutable
    pub fn stack_mut(&mut self) -> &mut [Value] {
        let start = self.register_count;
        &mut self.slots[start..start + self.stack_count]
    }

    /// Literal pool copy
    pub fn literals(&self) -> &[Value] {
        &self.slots[self.register_count + self.stack_count..]
    }

    /// Receiver (stack slot 0)
    pub fn receiver(&self) -> &Value {
        &self.stack()[0]
    }

    /// Callee (stack slot 1)
    pub fn callee(&self) -> &Value {
        &self.stack()[1]
    }

    /// Read a stack slot
    pub fn local(&self, slot: u32) -> VmResult<&Value> {
        self.stack()
            .get(slot as usize)
            .ok_or_else(|| VmError::internal(format!("stack slot {} out of range", slot)))
    }

    /// Write a stack slot
    pub fn set_local(&mut self, slot: u32, value: Value) -> VmResult<()> {
        let slot_ref = self
            .stack_mut()
            .get_mut(slot as usize)
            .ok_or_else(|| VmError::internal(format!("stack slot {} out of range", slot)))?;
        *slot_ref = value;
        Ok(())
    }

    /// Overwrite the first `limit` slots with `undefined`
    ///
    /// Values held only by those slots are released on the spot instead of
    /// when the activation finishes.
    pub fn scrub(&mut self, limit: usize) {
        let end = limit.min(self.slots.len());
        self.slots[..end].fill(Value::undefined());
    }
}

impl std::fmt::Debug for RegisterFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterFile")
            .field("registers", &self.registers())
            .field("stack", &self.stack())
            .field("literals", &self.literals().len())
            .finish()
    }
}
