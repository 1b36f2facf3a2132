//! Errors raised by call dispatch, array storage and compilation

use crate::value::Value;
use thiserror::Error;

/// Errors surfaced by the VM core
///
/// The script-visible kinds carry their message; `Exception` wraps a value
/// thrown by script code together with the calls it unwound through.
#[derive(Debug, Error)]
pub enum VmError {
    /// Calling a non-callable, constructing a non-constructor, poisoned accessors
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Lookup of an unbound name
    #[error("ReferenceError: {0}")]
    ReferenceError(String),

    /// Array length or index out of range
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Parser rejection during lazy compilation
    #[error("SyntaxError: {0}")]
    SyntaxError(String),

    /// Broken invariant or misbehaving collaborator
    #[error("InternalError: {0}")]
    InternalError(String),

    /// Call depth limit reached
    #[error("RangeError: Maximum call stack size exceeded")]
    StackOverflow,

    /// Heap budget exhausted
    #[error("OutOfMemory")]
    OutOfMemory,

    /// Value thrown by script code
    #[error("Uncaught exception: {0}")]
    Exception(Box<ThrownValue>),

    /// Rejected function descriptor or bytecode block
    #[error("Bytecode error: {0}")]
    Bytecode(#[from] marten_vm_bytecode::BytecodeError),

    /// Runtime configuration that failed to deserialize
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

/// A thrown value and its trace
#[derive(Debug)]
pub struct ThrownValue {
    /// What the script threw
    pub value: Value,
    /// Printable form of `value`
    pub message: String,
    /// Calls unwound so far, innermost first
    pub stack: Vec<StackFrame>,
}

impl ThrownValue {
    /// Append the next unwound call
    pub fn record(&mut self, frame: StackFrame) {
        self.stack.push(frame);
    }
}

impl std::fmt::Display for ThrownValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)?;
        for frame in &self.stack {
            write!(f, "\n    at {}", frame)?;
        }
        Ok(())
    }
}

/// One entry of an exception trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Function name, `<anonymous>` or `<global>` when there is none
    pub function_name: String,
    /// Source line, absent once debug info was cleared
    pub line: Option<u32>,
    /// Source column, absent once debug info was cleared
    pub column: Option<u32>,
}

impl std::fmt::Display for StackFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "{} ({}:{})", self.function_name, line, column),
            _ => f.write_str(&self.function_name),
        }
    }
}

impl VmError {
    /// `TypeError` with `msg`
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// `ReferenceError` with `msg`
    pub fn reference_error(msg: impl Into<String>) -> Self {
        Self::ReferenceError(msg.into())
    }

    /// `RangeError` with `msg`
    pub fn range_error(msg: impl Into<String>) -> Self {
        Self::RangeError(msg.into())
    }

    /// `SyntaxError` with `msg`
    pub fn syntax_error(msg: impl Into<String>) -> Self {
        Self::SyntaxError(msg.into())
    }

    /// `InternalError` with `msg`
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Wrap a script-thrown value with an empty trace
    pub fn exception(value: Value) -> Self {
        let message = match value.as_string() {
            Some(s) => s.as_str().to_string(),
            None => format!("{:?}", value),
        };
        Self::Exception(Box::new(ThrownValue {
            message,
            value,
            stack: Vec::new(),
        }))
    }

    /// The thrown value, if this is a script exception
    pub fn thrown_value(&self) -> Option<&Value> {
        match self {
            Self::Exception(thrown) => Some(&thrown.value),
            _ => None,
        }
    }
}

/// Result of a VM core operation
pub type VmResult<T> = std::result::Result<T, VmError>;
