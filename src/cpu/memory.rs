//! LS-8 memory subsystem.
//!
//! A flat array of byte cells holding both the program image (from
//! address 0 upward) and the call/value stack (from the top downward).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of cells in the full LS-8 machine.
pub const MEMORY_SIZE: usize = 256;

/// Number of cells in the minimal teaching variant.
pub const MINIMAL_MEMORY_SIZE: usize = 32;

/// LS-8 memory: a fixed number of byte cells, zero on creation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<u8>,
}

impl Memory {
    /// Create a full-size memory with all cells zeroed.
    pub fn new() -> Self {
        Self::with_size(MEMORY_SIZE)
    }

    /// Create a memory with `size` cells.
    ///
    /// Any size is accepted here. [`crate::Cpu::with_config`] rejects sizes
    /// outside 1-256, since byte registers can only address 256 cells.
    pub fn with_size(size: usize) -> Self {
        Self {
            cells: vec![0; size],
        }
    }

    /// Number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True for a zero-length memory.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Read a cell by address.
    #[inline]
    pub fn read(&self, addr: usize) -> Result<u8, MemoryError> {
        self.cells
            .get(addr)
            .copied()
            .ok_or(MemoryError::AddressOutOfRange { addr, size: self.len() })
    }

    /// Write a cell by address.
    #[inline]
    pub fn write(&mut self, addr: usize, value: u8) -> Result<(), MemoryError> {
        let size = self.len();
        let cell = self.cells
            .get_mut(addr)
            .ok_or(MemoryError::AddressOutOfRange { addr, size })?;
        *cell = value;
        Ok(())
    }

    /// Read a cell, or `None` past the end. Used by the trace surface.
    #[inline]
    pub fn peek(&self, addr: usize) -> Option<u8> {
        self.cells.get(addr).copied()
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Load a program into memory starting at the given address.
    /// Cells past the program keep their current value.
    pub fn load_program(&mut self, start_addr: usize, program: &[u8]) -> Result<(), MemoryError> {
        let size = self.len();
        if start_addr > size {
            return Err(MemoryError::AddressOutOfRange { addr: start_addr, size });
        }

        let available = size - start_addr;
        if program.len() > available {
            return Err(MemoryError::ProgramTooLarge {
                size: program.len(),
                available,
            });
        }

        self.cells[start_addr..start_addr + program.len()].copy_from_slice(program);
        Ok(())
    }

    /// Dump memory contents (for debugging).
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, u8)> {
        let end = start.saturating_add(count).min(self.len());
        (start.min(end)..end)
            .map(|i| (i, self.cells[i]))
            .collect()
    }

    /// Raw view of all cells.
    pub fn as_slice(&self) -> &[u8] {
        &self.cells
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero cells
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &self.len())
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("memory address {addr} out of range (memory size {size})")]
    AddressOutOfRange { addr: usize, size: usize },

    #[error("program size {size} exceeds available space {available}")]
    ProgramTooLarge { size: usize, available: usize },
}
