//! Tracing support
//!
//! Objects are reference counted; these hooks let an external reclaimer
//! (or a heap inspector) walk the object graph. The [`ArrayRegistry`]
//! answers "which arrays are alive" without scanning the heap.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

use crate::environment::{Environment, EnvironmentRecord};
use crate::object::{JsObject, ObjectKind, ObjectRef, PropertyDescriptor};
use crate::value::Value;

/// Trait for types that can be traced
pub trait Trace {
    /// Report every reference held by this value
    fn trace(&self, tracer: &mut dyn Tracer);
}

/// Tracer interface for the marking phase
pub trait Tracer {
    /// Mark an object as reachable
    fn mark_object(&mut self, object: &ObjectRef);

    /// Mark a value as reachable
    fn mark_value(&mut self, value: &Value) {
        if let Some(object) = value.as_object() {
            self.mark_object(object);
        }
    }
}

impl Trace for Value {
    fn trace(&self, tracer: &mut dyn Tracer) {
        tracer.mark_value(self);
    }
}

impl Trace for JsObject {
    fn trace(&self, tracer: &mut dyn Tracer) {
        match self.kind() {
            ObjectKind::Array(data) => {
                if let Some(values) = data.read().dense_values() {
                    values.iter().for_each(|v| tracer.mark_value(v));
                }
            }
            ObjectKind::Function(func) => {
                if let Some(outer) = func.outer_environment() {
                    outer.trace(tracer);
                }
            }
            ObjectKind::PrimitiveWrapper(inner) => tracer.mark_value(inner),
            ObjectKind::Ordinary | ObjectKind::Arguments => {}
        }

        for desc in self.properties().read().values() {
            match desc {
                PropertyDescriptor::Data { value, .. } => tracer.mark_value(value),
                PropertyDescriptor::Accessor { get, set, .. } => {
                    get.iter().chain(set.iter()).for_each(|v| tracer.mark_value(v));
                }
            }
        }

        if let Some(proto) = self.prototype() {
            tracer.mark_object(proto);
        }
    }
}

impl Trace for Environment {
    fn trace(&self, tracer: &mut dyn Tracer) {
        let mut current = Some(self);
        while let Some(env) = current {
            match env.record() {
                EnvironmentRecord::Global(global) => tracer.mark_object(global),
                EnvironmentRecord::Function(frame) => {
                    tracer.mark_object(frame.function());
                    frame.with_values(|v| tracer.mark_value(v));
                }
            }
            current = env.outer().map(Arc::as_ref);
        }
    }
}

/// Entries below which registration never prunes
const MIN_PRUNE_THRESHOLD: usize = 64;

/// Weak registry of every array created by a context
///
/// Registration prunes dead entries whenever the list has doubled since
/// the last prune, so the list stays within twice the live count (plus a
/// small floor) even when nobody iterates.
#[derive(Default)]
pub struct ArrayRegistry {
    arrays: Mutex<RegisteredArrays>,
}

#[derive(Default)]
struct RegisteredArrays {
    entries: Vec<Weak<JsObject>>,
    prune_at: usize,
}

impl RegisteredArrays {
    fn prune(&mut self) {
        self.entries.retain(|weak| weak.strong_count() > 0);
        self.prune_at = (self.entries.len() * 2).max(MIN_PRUNE_THRESHOLD);
    }
}

impl ArrayRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly created array
    pub fn register(&self, array: &ObjectRef) {
        let mut arrays = self.arrays.lock();
        if arrays.entries.len() >= arrays.prune_at.max(MIN_PRUNE_THRESHOLD) {
            arrays.prune();
        }
        arrays.entries.push(Arc::downgrade(array));
    }

    /// Visit every live array; dead entries are dropped along the way
    pub fn iterate(&self, mut callback: impl FnMut(&ObjectRef)) {
        let live: Vec<ObjectRef> = {
            let mut arrays = self.arrays.lock();
            arrays.prune();
            arrays.entries.iter().filter_map(Weak::upgrade).collect()
        };
        live.iter().for_each(|array| callback(array));
    }

    /// Number of registered arrays still alive
    pub fn live_count(&self) -> usize {
        self.arrays
            .lock()
            .entries
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Entries currently held, dead ones included
    pub fn entry_count(&self) -> usize {
        self.arrays.lock().entries.len()
    }
}

impl std::fmt::Debug for ArrayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayRegistry")
            .field("live", &self.live_count())
            .finish()
    }
}
