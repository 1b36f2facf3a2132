//! Compiled code blocks
//!
//! A [`ByteCodeBlock`] is the artifact the bytecode generator produces for a
//! function: the instruction stream, its literal pool and the debug metadata
//! that maps instructions back to source positions.

use serde::{Deserialize, Serialize};

use crate::constant::{Constant, ConstantPool};
use crate::error::Result;

/// Size in bytes accounted for each source map entry
const SOURCE_MAP_ENTRY_COST: usize = 2 * std::mem::size_of::<usize>();

/// Size in bytes accounted for each literal, structure and access-site entry
const POINTER_COST: usize = std::mem::size_of::<usize>();

/// A compiled function body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ByteCodeBlock {
    /// Encoded instruction stream
    pub code: Vec<u8>,
    /// Literal pool, copied into every activation
    pub literals: ConstantPool,
    /// Instruction offset to source position mapping
    pub source_map: SourceMap,
    /// Object structures referenced by inline caches
    pub object_structures_in_use: usize,
    /// Code offsets of property access sites
    pub property_access_sites: Vec<u32>,
    /// Number of registers the interpreter needs
    pub register_count: u16,
    /// The interpreter may leave stale values behind that must be scrubbed
    /// once the activation returns
    pub should_clear_stack: bool,
}

impl ByteCodeBlock {
    /// Create a new code block builder
    pub fn builder() -> ByteCodeBlockBuilder {
        ByteCodeBlockBuilder::new()
    }

    /// Approximate memory held by this block
    ///
    /// Counts the instruction bytes, the source map, the literal pool, the
    /// structure table and the access-site table.
    pub fn footprint(&self) -> usize {
        self.code.len()
            + self.source_map.footprint()
            + self.literals.len() * POINTER_COST
            + self.object_structures_in_use * POINTER_COST
            + self.property_access_sites.len() * POINTER_COST
    }

    /// Drop the source map
    pub fn clear_debug_info(&mut self) {
        self.source_map = SourceMap::default();
    }
}

/// Builder for [`ByteCodeBlock`]
#[derive(Debug, Default)]
pub struct ByteCodeBlockBuilder {
    block: ByteCodeBlock,
}

impl ByteCodeBlockBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the instruction stream
    pub fn code(mut self, code: impl Into<Vec<u8>>) -> Self {
        self.block.code = code.into();
        self
    }

    /// Add a literal, sharing an existing entry when identical
    pub fn literal(mut self, constant: Constant) -> Result<Self> {
        self.block.literals.add(constant)?;
        Ok(self)
    }

    /// Set the whole literal pool
    pub fn literals(mut self, literals: ConstantPool) -> Self {
        self.block.literals = literals;
        self
    }

    /// Set the source map
    pub fn source_map(mut self, source_map: SourceMap) -> Self {
        self.block.source_map = source_map;
        self
    }

    /// Set the number of structures in use
    pub fn object_structures_in_use(mut self, count: usize) -> Self {
        self.block.object_structures_in_use = count;
        self
    }

    /// Record a property access site
    pub fn property_access_site(mut self, offset: u32) -> Self {
        self.block.property_access_sites.push(offset);
        self
    }

    /// Set register count
    pub fn register_count(mut self, count: u16) -> Self {
        self.block.register_count = count;
        self
    }

    /// Request stack scrubbing after each activation
    pub fn should_clear_stack(mut self, value: bool) -> Self {
        self.block.should_clear_stack = value;
        self
    }

    /// Build the block
    pub fn build(self) -> ByteCodeBlock {
        self.block
    }
}

/// Source location mapping
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMap {
    /// Entries sorted by code offset
    pub entries: Vec<SourceMapEntry>,
}

/// A single source map entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SourceMapEntry {
    /// Code offset
    pub code_offset: u32,
    /// Line number (1-indexed)
    pub line: u32,
    /// Column number (1-indexed)
    pub column: u32,
}

impl SourceMap {
    /// Create a new empty source map
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping entry
    pub fn add(&mut self, code_offset: u32, line: u32, column: u32) {
        self.entries.push(SourceMapEntry {
            code_offset,
            line,
            column,
        });
    }

    /// Find the source location for a code offset
    pub fn find(&self, code_offset: u32) -> Option<&SourceMapEntry> {
        let idx = self
            .entries
            .binary_search_by_key(&code_offset, |e| e.code_offset);

        match idx {
            Ok(i) => Some(&self.entries[i]),
            Err(i) if i > 0 => Some(&self.entries[i - 1]),
            _ => None,
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes accounted for the map in a block footprint
    pub fn footprint(&self) -> usize {
        self.entries.len() * SOURCE_MAP_ENTRY_COST
    }
}
