//! Function descriptors and their compiled code
//!
//! A [`CodeBlock`] is shared by every function object created from the same
//! source function (and by sibling built-ins). Script code blocks hold at
//! most one [`CompiledCode`] at a time; it is produced lazily on the first
//! call and may be discarded by the compiled code cache.

use marten_vm_bytecode::{ByteCodeBlock, Constant, FunctionInfo, SourceMap, SourceMapEntry};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::VmResult;
use crate::frame::CallFrame;
use crate::memory::{Allocation, MemoryManager};
use crate::string::JsString;
use crate::value::Value;

/// Arguments handed to a native routine
#[derive(Debug)]
pub struct NativeCall<'a> {
    /// Prepared receiver
    pub this: Value,
    /// Arguments, padded with `undefined` up to the declared parameter count
    pub args: &'a [Value],
    /// Number of arguments actually passed
    pub argc: usize,
    /// Invoked as a constructor
    pub is_construct: bool,
}

impl NativeCall<'_> {
    /// Argument at `index`, `undefined` when absent
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }
}

/// Native function handler type
pub type NativeFn = Arc<dyn Fn(&CallFrame<'_>, NativeCall<'_>) -> VmResult<Value> + Send + Sync>;

/// Description of a host-implemented function
#[derive(Clone)]
pub struct NativeFunctionInfo {
    /// Function name
    pub name: Box<str>,
    /// Declared parameter count (the `length` property)
    pub param_count: usize,
    /// Can be called with `new`
    pub is_constructor: bool,
    /// Receiver is passed through untouched
    pub is_strict: bool,
    /// The host routine
    pub func: NativeFn,
}

impl NativeFunctionInfo {
    /// Describe a non-constructor, non-strict native function
    pub fn new<F>(name: impl Into<Box<str>>, param_count: usize, func: F) -> Self
    where
        F: Fn(&CallFrame<'_>, NativeCall<'_>) -> VmResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            param_count,
            is_constructor: false,
            is_strict: false,
            func: Arc::new(func),
        }
    }

    /// Mark as constructor
    pub fn constructor(mut self, value: bool) -> Self {
        self.is_constructor = value;
        self
    }

    /// Mark as strict
    pub fn strict(mut self, value: bool) -> Self {
        self.is_strict = value;
        self
    }
}

impl std::fmt::Debug for NativeFunctionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunctionInfo")
            .field("name", &self.name)
            .field("param_count", &self.param_count)
            .field("is_constructor", &self.is_constructor)
            .field("is_strict", &self.is_strict)
            .finish()
    }
}

/// What runs when the function is called
pub enum CodeKind {
    /// Host routine
    Native(NativeFn),
    /// Compiled script function
    Script(ScriptCode),
}

/// Script function descriptor plus its lazily produced code
pub struct ScriptCode {
    info: FunctionInfo,
    compiled: RwLock<Option<Arc<CompiledCode>>>,
}

impl ScriptCode {
    /// Static descriptor
    #[inline]
    pub fn info(&self) -> &FunctionInfo {
        &self.info
    }

    /// Current compiled code, if any
    pub fn compiled(&self) -> Option<Arc<CompiledCode>> {
        self.compiled.read().clone()
    }

    pub(crate) fn install(&self, code: Arc<CompiledCode>) {
        *self.compiled.write() = Some(code);
    }

    pub(crate) fn discard(&self) -> Option<Arc<CompiledCode>> {
        self.compiled.write().take()
    }
}

/// Per-function descriptor
pub struct CodeBlock {
    name: Arc<JsString>,
    is_strict: bool,
    is_constructor: bool,
    parameter_count: usize,
    kind: CodeKind,
}

impl CodeBlock {
    /// Descriptor for a host routine
    pub fn native(info: NativeFunctionInfo) -> Self {
        Self {
            name: JsString::intern(&info.name),
            is_strict: info.is_strict,
            is_constructor: info.is_constructor,
            parameter_count: info.param_count,
            kind: CodeKind::Native(info.func),
        }
    }

    /// Descriptor for a script function, compiled on first call
    pub fn script(info: FunctionInfo) -> Self {
        Self {
            name: JsString::intern(info.name.as_deref().unwrap_or("")),
            is_strict: info.is_strict(),
            is_constructor: info.is_constructor(),
            parameter_count: info.parameter_count(),
            kind: CodeKind::Script(ScriptCode {
                info,
                compiled: RwLock::new(None),
            }),
        }
    }

    /// Function name (empty for anonymous functions)
    #[inline]
    pub fn name(&self) -> &Arc<JsString> {
        &self.name
    }

    /// Strict mode code
    #[inline]
    pub fn is_strict(&self) -> bool {
        self.is_strict
    }

    /// Callable with `new`
    #[inline]
    pub fn is_constructor(&self) -> bool {
        self.is_constructor
    }

    /// Declared parameter count
    #[inline]
    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    /// Native or script
    #[inline]
    pub fn kind(&self) -> &CodeKind {
        &self.kind
    }

    /// Check for a host routine
    pub fn is_native(&self) -> bool {
        matches!(self.kind, CodeKind::Native(_))
    }

    /// Script descriptor, if this is script code
    pub fn as_script(&self) -> Option<&ScriptCode> {
        match &self.kind {
            CodeKind::Script(script) => Some(script),
            CodeKind::Native(_) => None,
        }
    }

    /// Current compiled code (always `None` for natives)
    pub fn compiled(&self) -> Option<Arc<CompiledCode>> {
        self.as_script().and_then(ScriptCode::compiled)
    }

    /// Check whether compiled code is present
    pub fn has_compiled_code(&self) -> bool {
        self.as_script()
            .is_some_and(|script| script.compiled.read().is_some())
    }
}

impl std::fmt::Debug for CodeBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeBlock")
            .field("name", &self.name.as_str())
            .field("native", &self.is_native())
            .field("strict", &self.is_strict)
            .field("compiled", &self.has_compiled_code())
            .finish()
    }
}

/// Executable artifact of a script function
///
/// The source map is kept apart from the block so an eviction pass can
/// drop it while the code is still running.
pub struct CompiledCode {
    block: ByteCodeBlock,
    source_map: RwLock<SourceMap>,
    literals: Vec<Value>,
    booking: Allocation,
}

impl CompiledCode {
    /// Wrap a generated block, booking its footprint
    pub fn new(mut block: ByteCodeBlock, memory: &Arc<MemoryManager>) -> VmResult<Self> {
        let source_map = std::mem::take(&mut block.source_map);
        let booking = Allocation::new(memory, block.footprint() + source_map.footprint())?;
        let literals = block.literals.iter().map(literal_value).collect();
        Ok(Self {
            block,
            source_map: RwLock::new(source_map),
            literals,
            booking,
        })
    }

    /// Encoded instructions
    #[inline]
    pub fn code(&self) -> &[u8] {
        &self.block.code
    }

    /// Generated block (its source map is held separately)
    #[inline]
    pub fn block(&self) -> &ByteCodeBlock {
        &self.block
    }

    /// Register count
    #[inline]
    pub fn register_count(&self) -> usize {
        usize::from(self.block.register_count)
    }

    /// Literal values, in pool order
    #[inline]
    pub fn literals(&self) -> &[Value] {
        &self.literals
    }

    /// Scrub the frame after each activation
    #[inline]
    pub fn should_clear_stack(&self) -> bool {
        self.block.should_clear_stack
    }

    /// Footprint counted against the cache limit
    pub fn footprint(&self) -> usize {
        self.block.footprint() + self.source_map.read().footprint()
    }

    /// Check if debug positions are still available
    pub fn has_debug_info(&self) -> bool {
        !self.source_map.read().is_empty()
    }

    /// Source position of a code offset
    pub fn position(&self, code_offset: u32) -> Option<SourceMapEntry> {
        self.source_map.read().find(code_offset).copied()
    }

    /// Drop debug positions, keeping the code runnable
    pub fn clear_debug_info(&self) {
        let freed = std::mem::take(&mut *self.source_map.write()).footprint();
        self.booking.release(freed);
    }
}

impl std::fmt::Debug for CompiledCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledCode")
            .field("code_len", &self.block.code.len())
            .field("literals", &self.literals.len())
            .field("footprint", &self.footprint())
            .finish()
    }
}

fn literal_value(constant: &Constant) -> Value {
    match constant {
        Constant::Undefined => Value::undefined(),
        Constant::Null => Value::null(),
        Constant::Boolean(b) => Value::boolean(*b),
        Constant::Number(n) => Value::number(*n),
        Constant::String(s) => Value::string(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_with_map() -> ByteCodeBlock {
        let mut map = SourceMap::new();
        map.add(0, 3, 1);
        map.add(4, 4, 5);
        ByteCodeBlock::builder()
            .code(vec![0u8; 16])
            .literal(Constant::number(1.5))
            .unwrap()
            .literal(Constant::string("hi"))
            .unwrap()
            .source_map(map)
            .register_count(4)
            .build()
    }

    #[test]
    fn test_compiled_code_books_footprint() {
        let mm = Arc::new(MemoryManager::test());
        let block = block_with_map();
        let expected = block.footprint();

        let code = CompiledCode::new(block, &mm).unwrap();
        assert_eq!(code.footprint(), expected);
        assert_eq!(mm.allocated(), expected);
        assert_eq!(code.literals(), &[Value::number(1.5), Value::string("hi")]);
        assert_eq!(code.register_count(), 4);

        drop(code);
        assert_eq!(mm.allocated(), 0);
    }

    #[test]
    fn test_clear_debug_info_releases_bytes() {
        let mm = Arc::new(MemoryManager::test());
        let code = CompiledCode::new(block_with_map(), &mm).unwrap();
        assert_eq!(code.position(5).map(|e| e.line), Some(4));

        let before = code.footprint();
        code.clear_debug_info();
        assert!(!code.has_debug_info());
        assert!(code.position(5).is_none());
        assert!(code.footprint() < before);
        assert_eq!(mm.allocated(), code.footprint());
    }

    #[test]
    fn test_native_descriptor() {
        let info = NativeFunctionInfo::new("push", 1, |_, call| Ok(call.arg(0))).constructor(false);
        let block = CodeBlock::native(info);
        assert!(block.is_native());
        assert_eq!(block.name().as_str(), "push");
        assert_eq!(block.parameter_count(), 1);
        assert!(block.compiled().is_none());
    }

    #[test]
    fn test_script_descriptor_starts_uncompiled() {
        let info = FunctionInfo::builder()
            .name("f")
            .is_strict(true)
            .parameter("a", marten_vm_bytecode::BindingLocation::Stack(2))
            .stack_slot_count(3)
            .build()
            .unwrap();
        let block = CodeBlock::script(info);
        assert!(!block.is_native());
        assert!(block.is_strict());
        assert_eq!(block.parameter_count(), 1);
        assert!(!block.has_compiled_code());
    }
}
