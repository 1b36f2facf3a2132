//! Bytecode interpreter interface
//!
//! The instruction loop is supplied by the embedder. The dispatcher has
//! already prepared everything an activation needs when `run` is called:
//! receiver and callee in stack slots 0 and 1, parameters bound, literals
//! copied and the `arguments` object materialized if the body uses it.

use crate::code_block::CompiledCode;
use crate::error::VmResult;
use crate::frame::{CallFrame, RegisterFile};
use crate::value::Value;

/// Executes compiled code
pub trait Interpreter: Send + Sync {
    /// Run `code` to completion in `frame`, returning the completion value
    ///
    /// Nested calls go through [`CallFrame::call`] on `frame`.
    fn run(&self, frame: &CallFrame<'_>, code: &CompiledCode, registers: &mut RegisterFile) -> VmResult<Value>;
}
