//! Bounded registry of compiled code
//!
//! Every code block that receives compiled code is registered here. When
//! the summed footprint goes over the limit, the next compilation first
//! runs an eviction pass: code blocks not running on the live call chain
//! lose their compiled code (it is regenerated on their next call) and the
//! live ones lose their debug positions.

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::debug;

use crate::code_block::CodeBlock;

/// Default footprint limit (2 MiB)
pub const DEFAULT_CODE_CACHE_LIMIT: usize = 2 * 1024 * 1024;

/// Summary of an eviction pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionStats {
    /// Code blocks whose compiled code was discarded
    pub evicted: usize,
    /// Live code blocks kept in the cache
    pub retained: usize,
    /// Footprint before the pass
    pub footprint_before: usize,
    /// Footprint after the pass
    pub footprint_after: usize,
}

/// Compiled code registry with liveness-aware eviction
pub struct CompiledCodeCache {
    blocks: Mutex<Vec<Arc<CodeBlock>>>,
    limit: usize,
}

impl CompiledCodeCache {
    /// Create a cache with a footprint limit in bytes
    pub fn new(limit: usize) -> Self {
        Self {
            blocks: Mutex::new(Vec::new()),
            limit,
        }
    }

    /// Footprint limit in bytes
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of registered code blocks
    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }

    /// Check whether `code_block` is registered
    pub fn contains(&self, code_block: &Arc<CodeBlock>) -> bool {
        self.blocks.lock().iter().any(|b| Arc::ptr_eq(b, code_block))
    }

    /// Register a code block that just received compiled code
    pub fn register(&self, code_block: Arc<CodeBlock>) {
        let mut blocks = self.blocks.lock();
        if !blocks.iter().any(|b| Arc::ptr_eq(b, &code_block)) {
            blocks.push(code_block);
        }
    }

    /// Summed footprint of all registered compiled code
    pub fn footprint(&self) -> usize {
        Self::total_footprint(&self.blocks.lock())
    }

    /// Check whether the footprint exceeds the limit
    pub fn needs_eviction(&self) -> bool {
        self.footprint() > self.limit
    }

    /// Discard compiled code of every block not in `live`
    ///
    /// Live blocks keep their code but lose debug positions. Afterwards the
    /// cache holds exactly the live blocks that still have compiled code.
    pub fn evict(&self, live: &[Arc<CodeBlock>]) -> EvictionStats {
        let live_set: FxHashSet<*const CodeBlock> = live.iter().map(Arc::as_ptr).collect();
        let mut blocks = self.blocks.lock();
        let footprint_before = Self::total_footprint(&blocks);

        let mut evicted = 0;
        for block in blocks.iter() {
            if live_set.contains(&Arc::as_ptr(block)) {
                continue;
            }
            if let Some(script) = block.as_script()
                && script.discard().is_some()
            {
                evicted += 1;
            }
        }

        let mut retained: Vec<Arc<CodeBlock>> = Vec::with_capacity(live.len());
        for block in live {
            let Some(code) = block.compiled() else {
                continue;
            };
            code.clear_debug_info();
            if !retained.iter().any(|b| Arc::ptr_eq(b, block)) {
                retained.push(block.clone());
            }
        }
        *blocks = retained;

        let stats = EvictionStats {
            evicted,
            retained: blocks.len(),
            footprint_before,
            footprint_after: Self::total_footprint(&blocks),
        };
        debug!(
            evicted = stats.evicted,
            retained = stats.retained,
            before = stats.footprint_before,
            after = stats.footprint_after,
            "compiled code cache eviction"
        );
        stats
    }

    fn total_footprint(blocks: &[Arc<CodeBlock>]) -> usize {
        blocks
            .iter()
            .filter_map(|b| b.compiled())
            .map(|code| code.footprint())
            .sum()
    }
}

impl Default for CompiledCodeCache {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_CACHE_LIMIT)
    }
}

impl std::fmt::Debug for CompiledCodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledCodeCache")
            .field("blocks", &self.len())
            .field("limit", &self.limit)
            .finish()
    }
}
