//! Exception processing at call boundaries

use crate::error::{StackFrame, VmError, VmResult};
use crate::frame::CallFrame;
use crate::value::Value;

/// Decision of an exception processor
#[derive(Debug)]
pub enum ExceptionAction {
    /// Handled; the call completes with this value
    Resume(Value),
    /// Keep unwinding with this error
    Propagate(VmError),
}

impl ExceptionAction {
    /// Convert to the call result
    pub fn into_result(self) -> VmResult<Value> {
        match self {
            Self::Resume(value) => Ok(value),
            Self::Propagate(error) => Err(error),
        }
    }
}

/// Sees every error leaving a call, with the frame it left from
pub trait ExceptionProcessor: Send + Sync {
    /// Handle `error` raised while `frame` was the innermost frame
    fn process(&self, frame: &CallFrame<'_>, error: VmError) -> ExceptionAction;
}

/// Default processor: records the unwound call in the exception's stack
/// trace and keeps propagating
#[derive(Debug, Default, Clone, Copy)]
pub struct UnwindingProcessor;

impl ExceptionProcessor for UnwindingProcessor {
    fn process(&self, frame: &CallFrame<'_>, mut error: VmError) -> ExceptionAction {
        if let VmError::Exception(thrown) = &mut error {
            thrown.record(stack_frame(frame));
        }
        ExceptionAction::Propagate(error)
    }
}

/// Trace entry for the function running in `frame`
///
/// The position is the first mapped source position of the function, when
/// its compiled code still carries debug info.
pub fn stack_frame(frame: &CallFrame<'_>) -> StackFrame {
    let Some(code_block) = frame.code_block() else {
        return StackFrame {
            function_name: "<global>".to_string(),
            line: None,
            column: None,
        };
    };

    let name = code_block.name();
    let function_name = if name.is_empty() {
        "<anonymous>".to_string()
    } else {
        name.as_str().to_string()
    };
    let position = code_block.compiled().and_then(|code| code.position(0));
    StackFrame {
        function_name,
        line: position.map(|p| p.line),
        column: position.map(|p| p.column),
    }
}
