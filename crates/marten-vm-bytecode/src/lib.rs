//! # Marten VM Bytecode
//!
//! Static data shared between the compiler collaborators and the VM core:
//! per-function descriptor metadata and the compiled code blocks produced
//! for it.
//!
//! ## Design Principles
//!
//! - **Immutable after build**: builders validate and freeze descriptor data
//! - **Accountable**: every code block reports its memory footprint so the
//!   VM can bound the total size of compiled code
//! - **Serializable**: descriptors and code blocks can be cached to disk

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod code_block;
pub mod constant;
pub mod error;
pub mod function;

pub use code_block::{ByteCodeBlock, ByteCodeBlockBuilder, SourceMap, SourceMapEntry};
pub use constant::{Constant, ConstantPool};
pub use error::BytecodeError;
pub use function::{
    BindingLocation, FunctionFlags, FunctionInfo, FunctionInfoBuilder, IdentifierInfo,
    ParameterInfo,
};

/// Number of stack storage slots reserved at the start of every frame:
/// slot 0 holds the receiver, slot 1 the callee itself.
pub const RESERVED_STACK_SLOTS: u32 = 2;

/// Name of the implicit binding holding the arguments object
pub const ARGUMENTS_BINDING: &str = "arguments";
