//! Lexical environments and per-call binding frames
//!
//! Every call gets a fresh [`BindingFrame`]. Which variant is used depends
//! on the function descriptor:
//!
//! - **Stack**: nothing escapes the call. All locals live in the register
//!   file's stack storage and the frame itself is a local of the dispatcher.
//! - **Indexed**: captured locals live in a heap vector addressed by slot.
//! - **Dictionary**: bindings are resolved by name (the body uses `eval` or
//!   otherwise defeats static resolution).
//!
//! Heap frames are shared with the closures that capture them through
//! `Arc<Environment>` and live as long as the longest holder.

use indexmap::IndexMap;
use marten_vm_bytecode::{BindingLocation, FunctionInfo};
use parking_lot::RwLock;
use rustc_hash::FxBuildHasher;
use std::sync::Arc;

use crate::error::{VmError, VmResult};
use crate::memory::{Allocation, MemoryManager};
use crate::object::{ObjectRef, PropertyKey};
use crate::string::JsString;
use crate::value::Value;

type BindingMap = IndexMap<Arc<JsString>, Value, FxBuildHasher>;

/// Fixed cost booked for every heap binding frame
const HEAP_FRAME_HEADER_SIZE: usize = std::mem::size_of::<Environment>();

/// Cost booked per indexed slot
const INDEXED_SLOT_SIZE: usize = std::mem::size_of::<Value>();

/// Cost booked per named binding
const NAMED_BINDING_SIZE: usize = std::mem::size_of::<Value>() + std::mem::size_of::<Arc<JsString>>();

/// One link of the scope chain
pub struct Environment {
    record: EnvironmentRecord,
    outer: Option<Arc<Environment>>,
}

/// Contents of an environment
pub enum EnvironmentRecord {
    /// Bindings are properties of the global object
    Global(ObjectRef),
    /// Bindings of one function activation
    Function(BindingFrame),
}

/// Local bindings of one call
pub enum BindingFrame {
    /// Locals live in the register file only
    Stack {
        /// Callee
        function: ObjectRef,
    },
    /// Captured locals addressed by slot
    Indexed {
        /// Callee
        function: ObjectRef,
        /// Heap slots
        slots: RwLock<Vec<Value>>,
        /// Accounted size
        booking: Allocation,
    },
    /// Bindings resolved by name
    Dictionary {
        /// Callee
        function: ObjectRef,
        /// Named bindings in declaration order
        bindings: RwLock<BindingMap>,
        /// Accounted size
        booking: Allocation,
    },
}

impl Environment {
    /// Global environment over the global object
    pub fn global(global: ObjectRef) -> Self {
        Self {
            record: EnvironmentRecord::Global(global),
            outer: None,
        }
    }

    /// Call-scoped environment with no heap storage
    pub fn on_stack(function: ObjectRef, outer: Option<Arc<Environment>>) -> Self {
        Self {
            record: EnvironmentRecord::Function(BindingFrame::Stack { function }),
            outer,
        }
    }

    /// Heap environment with `slot_count` indexed slots, all `undefined`
    pub fn indexed(
        function: ObjectRef,
        outer: Option<Arc<Environment>>,
        slot_count: usize,
        memory: &Arc<MemoryManager>,
    ) -> VmResult<Self> {
        let booking = Allocation::new(memory, HEAP_FRAME_HEADER_SIZE + slot_count * INDEXED_SLOT_SIZE)?;
        Ok(Self {
            record: EnvironmentRecord::Function(BindingFrame::Indexed {
                function,
                slots: RwLock::new(vec![Value::undefined(); slot_count]),
                booking,
            }),
            outer,
        })
    }

    /// Heap environment with one binding per name-resolved identifier
    pub fn dictionary(
        function: ObjectRef,
        outer: Option<Arc<Environment>>,
        info: &FunctionInfo,
        memory: &Arc<MemoryManager>,
    ) -> VmResult<Self> {
        let mut bindings = BindingMap::default();
        let named = info
            .parameters
            .iter()
            .map(|p| (&p.name, p.location))
            .chain(info.identifiers.iter().map(|i| (&i.name, i.location)))
            .filter(|(_, location)| *location == BindingLocation::Named);
        for (name, _) in named {
            bindings.insert(JsString::intern(name), Value::undefined());
        }

        let booking = Allocation::new(memory, HEAP_FRAME_HEADER_SIZE + bindings.len() * NAMED_BINDING_SIZE)?;
        Ok(Self {
            record: EnvironmentRecord::Function(BindingFrame::Dictionary {
                function,
                bindings: RwLock::new(bindings),
                booking,
            }),
            outer,
        })
    }

    /// Environment record
    #[inline]
    pub fn record(&self) -> &EnvironmentRecord {
        &self.record
    }

    /// Enclosing environment
    #[inline]
    pub fn outer(&self) -> Option<&Arc<Environment>> {
        self.outer.as_ref()
    }

    /// Binding frame, for function environments
    pub fn binding_frame(&self) -> Option<&BindingFrame> {
        match &self.record {
            EnvironmentRecord::Function(frame) => Some(frame),
            EnvironmentRecord::Global(_) => None,
        }
    }

    /// Function whose activation created this environment
    pub fn function(&self) -> Option<&ObjectRef> {
        self.binding_frame().map(BindingFrame::function)
    }

    /// Resolve a name through the chain
    ///
    /// Only name-addressed storage takes part: dictionary frames and the
    /// global object. Indexed slots are resolved statically by the compiler.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let key = JsString::intern(name);
        let mut current = Some(self);
        while let Some(env) = current {
            match &env.record {
                EnvironmentRecord::Function(frame) => {
                    if let Some(value) = frame.get_binding(&key) {
                        return Some(value);
                    }
                }
                EnvironmentRecord::Global(global) => {
                    if let Some(value) = global.get(&PropertyKey::from_js_string(key.clone())) {
                        return Some(value);
                    }
                }
            }
            current = env.outer.as_deref();
        }
        None
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.record {
            EnvironmentRecord::Global(_) => "Global",
            EnvironmentRecord::Function(BindingFrame::Stack { .. }) => "Stack",
            EnvironmentRecord::Function(BindingFrame::Indexed { .. }) => "Indexed",
            EnvironmentRecord::Function(BindingFrame::Dictionary { .. }) => "Dictionary",
        };
        f.debug_struct("Environment")
            .field("kind", &kind)
            .field("has_outer", &self.outer.is_some())
            .finish()
    }
}

impl BindingFrame {
    /// Callee
    pub fn function(&self) -> &ObjectRef {
        match self {
            Self::Stack { function } | Self::Indexed { function, .. } | Self::Dictionary { function, .. } => {
                function
            }
        }
    }

    /// Check for the call-scoped variant
    pub fn is_on_stack(&self) -> bool {
        matches!(self, Self::Stack { .. })
    }

    /// Check for the heap-indexed variant
    pub fn is_indexed(&self) -> bool {
        matches!(self, Self::Indexed { .. })
    }

    /// Check for the heap-dictionary variant
    pub fn is_dictionary(&self) -> bool {
        matches!(self, Self::Dictionary { .. })
    }

    /// Bytes booked for this frame (0 for stack frames)
    pub fn heap_size(&self) -> usize {
        match self {
            Self::Stack { .. } => 0,
            Self::Indexed { booking, .. } | Self::Dictionary { booking, .. } => booking.size(),
        }
    }

    /// Number of indexed heap slots
    pub fn heap_slot_count(&self) -> usize {
        match self {
            Self::Indexed { slots, .. } => slots.read().len(),
            _ => 0,
        }
    }

    /// Read an indexed heap slot
    pub fn heap_slot(&self, index: u32) -> VmResult<Value> {
        let Self::Indexed { slots, .. } = self else {
            return Err(VmError::internal("heap slot access on a frame without indexed storage"));
        };
        slots
            .read()
            .get(index as usize)
            .cloned()
            .ok_or_else(|| VmError::internal(format!("heap slot {} out of range", index)))
    }

    /// Write an indexed heap slot
    pub fn set_heap_slot(&self, index: u32, value: Value) -> VmResult<()> {
        let Self::Indexed { slots, .. } = self else {
            return Err(VmError::internal("heap slot access on a frame without indexed storage"));
        };
        let mut slots = slots.write();
        let slot = slots
            .get_mut(index as usize)
            .ok_or_else(|| VmError::internal(format!("heap slot {} out of range", index)))?;
        *slot = value;
        Ok(())
    }

    /// Check for a named binding
    pub fn has_binding(&self, name: &Arc<JsString>) -> bool {
        match self {
            Self::Dictionary { bindings, .. } => bindings.read().contains_key(name),
            _ => false,
        }
    }

    /// Create a named binding initialized to `undefined`; existing bindings are kept
    pub fn create_binding(&self, name: Arc<JsString>) -> VmResult<()> {
        let Self::Dictionary { bindings, .. } = self else {
            return Err(VmError::internal(format!("cannot create binding '{}' in indexed storage", name)));
        };
        bindings.write().entry(name).or_insert(Value::Undefined);
        Ok(())
    }

    /// Read a named binding
    pub fn get_binding(&self, name: &Arc<JsString>) -> Option<Value> {
        match self {
            Self::Dictionary { bindings, .. } => bindings.read().get(name).cloned(),
            _ => None,
        }
    }

    /// Write an existing named binding
    pub fn set_binding(&self, name: &Arc<JsString>, value: Value) -> VmResult<()> {
        let Self::Dictionary { bindings, .. } = self else {
            return Err(VmError::internal(format!("cannot set binding '{}' in indexed storage", name)));
        };
        match bindings.write().get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(VmError::reference_error(format!("{} is not defined", name))),
        }
    }

    /// Names of all named bindings, in creation order
    pub fn binding_names(&self) -> Vec<Arc<JsString>> {
        match self {
            Self::Dictionary { bindings, .. } => bindings.read().keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn with_values(&self, mut f: impl FnMut(&Value)) {
        match self {
            Self::Stack { .. } => {}
            Self::Indexed { slots, .. } => slots.read().iter().for_each(&mut f),
            Self::Dictionary { bindings, .. } => bindings.read().values().for_each(&mut f),
        }
    }
}
