//! Memory accounting for Marten VM
//!
//! Heap binding frames and compiled code report their size here so a
//! context can enforce its heap limit. Objects themselves are reference
//! counted and not tracked individually.

use crate::error::{VmError, VmResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Manages memory limits and accounting for a VM instance
pub struct MemoryManager {
    /// Total bytes currently allocated
    allocated: AtomicUsize,
    /// Maximum bytes allowed for this VM
    limit: usize,
    /// Number of allocations since creation
    allocation_count: AtomicUsize,
}

impl MemoryManager {
    /// Create a new memory manager with the specified limit
    pub fn new(limit: usize) -> Self {
        Self {
            allocated: AtomicUsize::new(0),
            limit,
            allocation_count: AtomicUsize::new(0),
        }
    }

    /// Create a memory manager with a very large limit (for tests)
    pub fn test() -> Self {
        Self::new(usize::MAX / 2)
    }

    /// Try to book `size` bytes. Returns Err(VmError::OutOfMemory) if limit exceeded.
    pub fn alloc(&self, size: usize) -> VmResult<()> {
        let current = self.allocated.load(Ordering::Relaxed);
        if current.saturating_add(size) > self.limit {
            return Err(VmError::OutOfMemory);
        }

        self.allocated.fetch_add(size, Ordering::Relaxed);
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Record deallocation of `size` bytes
    pub fn free(&self, size: usize) {
        self.allocated.fetch_sub(size, Ordering::Relaxed);
    }

    /// Get current allocated bytes
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Get memory limit
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Get the number of allocations so far
    pub fn allocation_count(&self) -> usize {
        self.allocation_count.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("allocated", &self.allocated())
            .field("limit", &self.limit)
            .field("allocation_count", &self.allocation_count())
            .finish()
    }
}

/// A booking in a [`MemoryManager`], released on drop
pub struct Allocation {
    size: AtomicUsize,
    manager: Arc<MemoryManager>,
}

impl Allocation {
    /// Book `size` bytes
    pub fn new(manager: &Arc<MemoryManager>, size: usize) -> VmResult<Self> {
        manager.alloc(size)?;
        Ok(Self {
            size: AtomicUsize::new(size),
            manager: manager.clone(),
        })
    }

    /// Bytes currently booked
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Give back part of the booking early
    pub fn release(&self, bytes: usize) {
        let previous = self
            .size
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |size| {
                Some(size.saturating_sub(bytes))
            })
            .unwrap_or_else(|size| size);
        self.manager.free(previous.min(bytes));
    }
}

impl std::fmt::Debug for Allocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocation").field("size", &self.size()).finish()
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.manager.free(*self.size.get_mut());
    }
}
