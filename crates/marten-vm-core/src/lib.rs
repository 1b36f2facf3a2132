//! # Marten VM Core
//!
//! Execution core of the Marten JavaScript engine: call dispatch, array
//! storage and the compiled code cache.
//!
//! ## Design Principles
//!
//! - **Thread-safe**: Values and objects are `Send + Sync`
//! - **Lazy compilation**: Function bodies are compiled on first call and
//!   evicted again under memory pressure
//! - **Fast arrays**: Dense element storage until the array becomes sparse
//!   or gains non-default attributes
//! - **Pluggable front end**: Parser, bytecode generator, interpreter and
//!   exception processor are supplied by the embedder

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod arguments;
pub mod array;
pub mod call;
pub mod code_block;
pub mod code_cache;
pub mod compiler;
pub mod context;
pub mod environment;
pub mod error;
pub mod exception;
pub mod frame;
pub mod function;
pub mod gc;
pub mod interpreter;
pub mod memory;
pub mod object;
pub mod runtime;
pub mod string;
pub mod value;

pub use array::{ArrayMode, FastSet};
pub use code_block::{CodeBlock, CodeKind, CompiledCode, NativeCall, NativeFunctionInfo};
pub use code_cache::{CompiledCodeCache, EvictionStats};
pub use compiler::{CodeGenerator, FunctionParser, SyntaxTree};
pub use context::{Collaborators, Intrinsics, VmContext};
pub use environment::{BindingFrame, Environment};
pub use error::{StackFrame, ThrownValue, VmError, VmResult};
pub use exception::{ExceptionAction, ExceptionProcessor, UnwindingProcessor};
pub use frame::{CallFrame, RegisterFile};
pub use interpreter::Interpreter;
pub use memory::MemoryManager;
pub use object::{AttributeIntent, JsObject, ObjectRef, PropertyAttributes, PropertyDescriptor, PropertyKey};
pub use runtime::{RuntimeConfig, VmRuntime, VmRuntimeBuilder};
pub use string::JsString;
pub use value::Value;

/// Re-exported descriptor types the collaborators work with
pub use marten_vm_bytecode::{BindingLocation, ByteCodeBlock, FunctionInfo, SourceMap};
