//! Function descriptor metadata
//!
//! A [`FunctionInfo`] is everything the VM needs to know about a function
//! before it has been compiled: how its parameters and locals are laid out
//! and which frame shape a call must prepare.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{BytecodeError, Result};
use crate::{ARGUMENTS_BINDING, RESERVED_STACK_SLOTS};

/// Function flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionFlags {
    /// Is strict mode
    pub is_strict: bool,
    /// Can be invoked with `new`
    pub is_constructor: bool,
    /// Contains a direct `eval`
    pub uses_eval: bool,
    /// Parameters cannot be copied positionally (destructuring, defaults,
    /// duplicate names, non stack-resident parameters)
    pub needs_complex_parameter_copy: bool,
    /// The body observes the `arguments` binding
    pub uses_arguments_object: bool,
    /// No binding escapes the call, so its environment may live on the stack
    pub can_allocate_environment_on_stack: bool,
    /// Every binding resolves to a static slot
    pub can_use_indexed_variable_storage: bool,
    /// The function refers to itself by name from a heap-resident binding
    pub saves_function_name_on_heap: bool,
}

/// Resolved storage of a parameter or local binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingLocation {
    /// Slot in the activation's stack storage (absolute, slot 0 is the receiver)
    Stack(u32),
    /// Slot in the heap-allocated binding frame
    Heap(u32),
    /// Resolved by name at runtime
    Named,
}

/// A declared parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterInfo {
    /// Parameter name
    pub name: Box<str>,
    /// Where the parameter value is stored
    pub location: BindingLocation,
}

/// A declared identifier (parameters, locals and implicit bindings)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierInfo {
    /// Identifier name
    pub name: Box<str>,
    /// Where the binding is stored
    pub location: BindingLocation,
}

/// Immutable descriptor metadata for one function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionInfo {
    /// Function name (`None` for anonymous functions)
    pub name: Option<Box<str>>,
    /// Function flags
    pub flags: FunctionFlags,
    /// Parameters in declaration order
    pub parameters: Vec<ParameterInfo>,
    /// Identifier table
    pub identifiers: Vec<IdentifierInfo>,
    /// Number of stack storage slots, including the reserved ones
    pub stack_slot_count: u32,
    /// Number of slots in a heap-indexed binding frame
    pub heap_slot_count: u32,
    /// Source text handed to the parser on first call
    pub source: Option<Arc<str>>,
}

impl FunctionInfo {
    /// Create a new descriptor builder
    pub fn builder() -> FunctionInfoBuilder {
        FunctionInfoBuilder::new()
    }

    /// Get the function name or `<anonymous>`
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    /// Check if function is in strict mode
    #[inline]
    pub fn is_strict(&self) -> bool {
        self.flags.is_strict
    }

    /// Check if function is a constructor
    #[inline]
    pub fn is_constructor(&self) -> bool {
        self.flags.is_constructor
    }

    /// Number of declared parameters
    #[inline]
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Find an identifier by name
    pub fn identifier(&self, name: &str) -> Option<&IdentifierInfo> {
        self.identifiers.iter().find(|info| &*info.name == name)
    }

    /// Slot holding the `arguments` object, if the body declares one statically
    pub fn arguments_location(&self) -> Option<BindingLocation> {
        self.identifier(ARGUMENTS_BINDING).map(|info| info.location)
    }
}

/// Builder for [`FunctionInfo`]
#[derive(Debug)]
pub struct FunctionInfoBuilder {
    name: Option<Box<str>>,
    flags: FunctionFlags,
    parameters: Vec<ParameterInfo>,
    identifiers: Vec<IdentifierInfo>,
    stack_slot_count: u32,
    heap_slot_count: u32,
    source: Option<Arc<str>>,
}

impl Default for FunctionInfoBuilder {
    fn default() -> Self {
        Self {
            name: None,
            flags: FunctionFlags {
                can_use_indexed_variable_storage: true,
                ..FunctionFlags::default()
            },
            parameters: Vec::new(),
            identifiers: Vec::new(),
            stack_slot_count: RESERVED_STACK_SLOTS,
            heap_slot_count: 0,
            source: None,
        }
    }
}

impl FunctionInfoBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set function name
    pub fn name(mut self, name: impl Into<Box<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set all flags at once
    pub fn flags(mut self, flags: FunctionFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Mark as strict mode
    pub fn is_strict(mut self, value: bool) -> Self {
        self.flags.is_strict = value;
        self
    }

    /// Mark as constructor
    pub fn is_constructor(mut self, value: bool) -> Self {
        self.flags.is_constructor = value;
        self
    }

    /// Mark as containing a direct `eval`
    pub fn uses_eval(mut self, value: bool) -> Self {
        self.flags.uses_eval = value;
        self
    }

    /// Force the complex parameter copy path
    pub fn needs_complex_parameter_copy(mut self, value: bool) -> Self {
        self.flags.needs_complex_parameter_copy = value;
        self
    }

    /// Mark the body as observing `arguments`
    pub fn uses_arguments_object(mut self, value: bool) -> Self {
        self.flags.uses_arguments_object = value;
        self
    }

    /// Allow the environment to live on the stack
    pub fn on_stack(mut self, value: bool) -> Self {
        self.flags.can_allocate_environment_on_stack = value;
        self
    }

    /// Use indexed (true) or name-based (false) heap storage
    pub fn indexed_storage(mut self, value: bool) -> Self {
        self.flags.can_use_indexed_variable_storage = value;
        self
    }

    /// Save the function's own name in its heap binding frame
    pub fn saves_function_name_on_heap(mut self, value: bool) -> Self {
        self.flags.saves_function_name_on_heap = value;
        self
    }

    /// Add a parameter
    pub fn parameter(mut self, name: impl Into<Box<str>>, location: BindingLocation) -> Self {
        self.parameters.push(ParameterInfo {
            name: name.into(),
            location,
        });
        self
    }

    /// Add an identifier
    pub fn identifier(mut self, name: impl Into<Box<str>>, location: BindingLocation) -> Self {
        self.identifiers.push(IdentifierInfo {
            name: name.into(),
            location,
        });
        self
    }

    /// Set the stack storage size (including the reserved slots)
    pub fn stack_slot_count(mut self, count: u32) -> Self {
        self.stack_slot_count = count;
        self
    }

    /// Set the heap slot count of indexed binding frames
    pub fn heap_slot_count(mut self, count: u32) -> Self {
        self.heap_slot_count = count;
        self
    }

    /// Set the source text
    pub fn source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Validate the layout and build the descriptor
    ///
    /// Stack allocation implies indexed storage. The complex parameter copy
    /// flag is raised whenever parameters cannot be copied positionally.
    pub fn build(mut self) -> Result<FunctionInfo> {
        if self.stack_slot_count < RESERVED_STACK_SLOTS {
            return Err(BytecodeError::StackStorageTooSmall(self.stack_slot_count));
        }

        let display_name = self.name.as_deref().unwrap_or("<anonymous>").to_string();
        if self.flags.uses_eval {
            self.flags.can_allocate_environment_on_stack = false;
            self.flags.can_use_indexed_variable_storage = false;
        }
        if self.flags.can_allocate_environment_on_stack {
            if self.flags.saves_function_name_on_heap {
                return Err(BytecodeError::EscapingBinding(display_name));
            }
            self.flags.can_use_indexed_variable_storage = true;
        }
        if self.flags.saves_function_name_on_heap
            && self.flags.can_use_indexed_variable_storage
            && self.heap_slot_count == 0
        {
            return Err(BytecodeError::MissingNameSlot(display_name));
        }

        let bindings = self
            .parameters
            .iter()
            .map(|p| (&p.name, p.location))
            .chain(self.identifiers.iter().map(|i| (&i.name, i.location)));
        for (name, location) in bindings {
            self.check_location(name, location)?;
        }

        let mut seen = FxHashSet::default();
        let positional = self.parameters.iter().enumerate().all(|(i, p)| {
            p.location == BindingLocation::Stack(RESERVED_STACK_SLOTS + i as u32)
                && seen.insert(&*p.name)
        });
        if !positional {
            self.flags.needs_complex_parameter_copy = true;
        }

        Ok(FunctionInfo {
            name: self.name,
            flags: self.flags,
            parameters: self.parameters,
            identifiers: self.identifiers,
            stack_slot_count: self.stack_slot_count,
            heap_slot_count: self.heap_slot_count,
            source: self.source,
        })
    }

    fn check_location(&self, name: &str, location: BindingLocation) -> Result<()> {
        let flags = &self.flags;
        match location {
            BindingLocation::Stack(slot) if slot >= self.stack_slot_count => {
                Err(BytecodeError::StackSlotOutOfRange {
                    name: name.to_string(),
                    slot,
                    size: self.stack_slot_count,
                })
            }
            BindingLocation::Stack(_) => Ok(()),
            BindingLocation::Heap(_) | BindingLocation::Named
                if flags.can_allocate_environment_on_stack =>
            {
                Err(BytecodeError::EscapingBinding(name.to_string()))
            }
            BindingLocation::Heap(_) if !flags.can_use_indexed_variable_storage => {
                Err(BytecodeError::HeapBindingInNamedStorage(name.to_string()))
            }
            BindingLocation::Heap(slot) if slot >= self.heap_slot_count => {
                Err(BytecodeError::HeapSlotOutOfRange {
                    name: name.to_string(),
                    slot,
                    size: self.heap_slot_count,
                })
            }
            BindingLocation::Heap(_) => Ok(()),
            BindingLocation::Named if flags.can_use_indexed_variable_storage => {
                Err(BytecodeError::NamedBindingInIndexedStorage(name.to_string()))
            }
            BindingLocation::Named => Ok(()),
        }
    }
}
