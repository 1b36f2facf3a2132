//! Literal pool for code blocks

use serde::{Deserialize, Serialize};

use crate::error::{BytecodeError, Result};

/// A literal value in the pool
///
/// Literal values are copied into every activation's register file, so they
/// are limited to primitives that need no per-call allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean literal
    Boolean(bool),
    /// 64-bit floating point number
    Number(f64),
    /// String literal
    String(Box<str>),
}

impl Constant {
    /// Create a number constant
    #[inline]
    pub fn number(n: f64) -> Self {
        Self::Number(n)
    }

    /// Create a string constant
    #[inline]
    pub fn string(s: impl Into<Box<str>>) -> Self {
        Self::String(s.into())
    }

    /// Get as number if this is a number constant
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as string if this is a string constant
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether two literals can share one pool slot
    ///
    /// Numbers compare by bit pattern: `-0` keeps its own slot and a NaN
    /// matches a NaN with the same payload.
    fn same_literal(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }
}

/// Literal pool with deduplication
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstantPool {
    constants: Vec<Constant>,
}

impl ConstantPool {
    /// Empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of `constant`, appending it when no identical literal exists
    pub fn add(&mut self, constant: Constant) -> Result<u32> {
        let slot = match self.constants.iter().position(|c| c.same_literal(&constant)) {
            Some(existing) => existing,
            None => {
                self.constants.push(constant);
                self.constants.len() - 1
            }
        };
        u32::try_from(slot).map_err(|_| BytecodeError::TooManyLiterals)
    }

    /// Get a constant by index
    #[inline]
    pub fn get(&self, index: u32) -> Option<&Constant> {
        self.constants.get(index as usize)
    }

    /// Number of constants in the pool
    #[inline]
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    /// Check if the pool is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Iterate over constants in index order
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Constant> {
        self.constants.iter()
    }
}

impl FromIterator<Constant> for ConstantPool {
    fn from_iter<I: IntoIterator<Item = Constant>>(iter: I) -> Self {
        Self {
            constants: iter.into_iter().collect(),
        }
    }
}
