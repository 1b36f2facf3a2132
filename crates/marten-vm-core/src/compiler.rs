//! Lazy compilation of script functions
//!
//! Parsing and bytecode generation are external collaborators. The VM only
//! decides when to run them: on the first call of a code block that has
//! no compiled code, after giving the compiled code cache a chance to
//! shrink.

use marten_vm_bytecode::{ByteCodeBlock, FunctionInfo};
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

use crate::code_block::{CodeBlock, CompiledCode, ScriptCode};
use crate::error::{VmError, VmResult};
use crate::frame::CallFrame;

/// Parser output, opaque to the VM
pub struct SyntaxTree(Box<dyn Any + Send>);

impl SyntaxTree {
    /// Wrap a parser-specific tree
    pub fn new<T: Any + Send>(tree: T) -> Self {
        Self(Box::new(tree))
    }

    /// Recover the parser-specific tree
    pub fn downcast<T: Any>(self) -> VmResult<Box<T>> {
        self.0
            .downcast::<T>()
            .map_err(|_| VmError::internal("syntax tree produced by a different parser"))
    }

    /// Borrow the parser-specific tree
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl std::fmt::Debug for SyntaxTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntaxTree").finish_non_exhaustive()
    }
}

/// Re-parses a function body on demand
pub trait FunctionParser: Send + Sync {
    /// Parse the body described by `info`
    ///
    /// `stack_budget` is the nesting depth still available to the caller;
    /// a parser should fail with a syntax or range error rather than
    /// recurse past it.
    fn parse_function(&self, info: &FunctionInfo, stack_budget: usize) -> VmResult<SyntaxTree>;
}

/// Turns a syntax tree into bytecode
pub trait CodeGenerator: Send + Sync {
    /// Generate the code block for `info`; consumes the tree
    fn generate(&self, info: &FunctionInfo, tree: SyntaxTree) -> VmResult<ByteCodeBlock>;
}

/// Compiled code of `code_block`, compiling it first if needed
pub(crate) fn ensure_compiled(
    frame: &CallFrame<'_>,
    code_block: &Arc<CodeBlock>,
    script: &ScriptCode,
) -> VmResult<Arc<CompiledCode>> {
    if let Some(compiled) = script.compiled() {
        return Ok(compiled);
    }

    let context = frame.context();
    let cache = context.code_cache();
    if cache.needs_eviction() {
        let live = frame.live_code_blocks();
        cache.evict(&live);
    }

    let info = script.info();
    let tree = context.parser().parse_function(info, frame.stack_budget())?;
    let block = context.code_generator().generate(info, tree)?;
    let compiled = Arc::new(CompiledCode::new(block, context.memory())?);
    debug!(
        function = info.display_name(),
        footprint = compiled.footprint(),
        "compiled function"
    );

    script.install(compiled.clone());
    cache.register(code_block.clone());
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_tree_downcast() {
        let tree = SyntaxTree::new(vec![1u8, 2, 3]);
        assert_eq!(tree.downcast_ref::<Vec<u8>>(), Some(&vec![1, 2, 3]));
        assert!(tree.downcast_ref::<String>().is_none());

        let inner = tree.downcast::<Vec<u8>>().unwrap();
        assert_eq!(inner.len(), 3);
    }

    #[test]
    fn test_syntax_tree_wrong_type() {
        let tree = SyntaxTree::new(5u32);
        assert!(matches!(tree.downcast::<String>(), Err(VmError::InternalError(_))));
    }
}
