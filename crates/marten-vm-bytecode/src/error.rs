//! Bytecode errors

use thiserror::Error;

/// Errors raised while building or validating descriptors and code blocks
#[derive(Debug, Error)]
pub enum BytecodeError {
    /// Stack storage must at least hold the receiver and callee slots
    #[error("Stack storage of {0} slots cannot hold the reserved receiver and callee slots")]
    StackStorageTooSmall(u32),

    /// A binding refers to a stack slot outside of the declared stack storage
    #[error("Binding `{name}` uses stack slot {slot} but stack storage has {size} slots")]
    StackSlotOutOfRange {
        /// Binding name
        name: String,
        /// Offending slot
        slot: u32,
        /// Declared stack storage size
        size: u32,
    },

    /// A binding refers to a heap slot outside of the declared heap storage
    #[error("Binding `{name}` uses heap slot {slot} but heap storage has {size} slots")]
    HeapSlotOutOfRange {
        /// Binding name
        name: String,
        /// Offending slot
        slot: u32,
        /// Declared heap storage size
        size: u32,
    },

    /// A binding stored outside the stack was declared for a function whose
    /// environment lives on the stack
    #[error("Binding `{0}` escapes a function whose environment is stack allocated")]
    EscapingBinding(String),

    /// A name-resolved binding was declared for indexed storage
    #[error("Binding `{0}` needs name-based resolution but the function uses indexed storage")]
    NamedBindingInIndexedStorage(String),

    /// A heap slot was declared for a function using name-based storage
    #[error("Binding `{0}` uses a heap slot but the function uses name-based storage")]
    HeapBindingInNamedStorage(String),

    /// Saving the function's own name needs heap slot 0
    #[error("Function `{0}` saves its own name on the heap but reserves no heap slot")]
    MissingNameSlot(String),

    /// Literal pool exceeded its addressable size
    #[error("Too many literals (max 4294967295)")]
    TooManyLiterals,
}

/// Result type for bytecode operations
pub type Result<T> = std::result::Result<T, BytecodeError>;
