//! LS-8 CPU registers.
//!
//! The LS-8 has:
//! - R0-R7: eight 8-bit general purpose registers
//! - R7 doubles as the stack pointer (SP)
//! - PC: program counter
//! - FL: flags register, `00000LGE`

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of general purpose registers.
pub const REGISTER_COUNT: usize = 8;

/// Index of the register reserved as the stack pointer.
pub const SP: u8 = 7;

/// Cells addressable by a byte-wide stack pointer.
const STACK_SPAN: usize = 256;

/// The flags register, `00000LGE`.
///
/// Only CMP writes it; JEQ and JNE read the E bit.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flags(u8);

impl Flags {
    /// Equal
    pub const E: u8 = 0b0000_0001;
    /// Greater-than
    pub const G: u8 = 0b0000_0010;
    /// Less-than
    pub const L: u8 = 0b0000_0100;

    /// Flags with only the given bits set.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & (Self::E | Self::G | Self::L))
    }

    /// Raw bit pattern.
    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn equal(self) -> bool {
        self.0 & Self::E != 0
    }

    pub fn greater(self) -> bool {
        self.0 & Self::G != 0
    }

    pub fn less(self) -> bool {
        self.0 & Self::L != 0
    }
}

impl std::fmt::Debug for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bit = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "FL={}{}{}",
            bit(self.less(), 'L'),
            bit(self.greater(), 'G'),
            bit(self.equal(), 'E')
        )
    }
}

/// The LS-8 register file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// R0-R7. R7 is the stack pointer.
    pub r: [u8; REGISTER_COUNT],

    /// Program counter: address of the next opcode to fetch.
    pub pc: usize,

    /// Flags register, set by CMP.
    pub fl: Flags,
}

impl Registers {
    /// Create a register file for a memory of `memory_size` cells.
    ///
    /// All registers are zero except SP, which points at the highest
    /// valid address.
    pub fn new(memory_size: usize) -> Self {
        let mut regs = Self {
            r: [0; REGISTER_COUNT],
            pc: 0,
            fl: Flags::default(),
        };
        regs.reset(memory_size);
        regs
    }

    /// Reset all registers to their power-on values.
    pub fn reset(&mut self, memory_size: usize) {
        self.r = [0; REGISTER_COUNT];
        self.r[SP as usize] = stack_top(memory_size);
        self.pc = 0;
        self.fl = Flags::default();
    }

    /// Read a register by index.
    #[inline]
    pub fn get(&self, index: u8) -> Result<u8, RegisterError> {
        self.r
            .get(index as usize)
            .copied()
            .ok_or(RegisterError::InvalidIndex(index))
    }

    /// Write a register by index.
    #[inline]
    pub fn set(&mut self, index: u8, value: u8) -> Result<(), RegisterError> {
        let reg = self.r
            .get_mut(index as usize)
            .ok_or(RegisterError::InvalidIndex(index))?;
        *reg = value;
        Ok(())
    }

    /// Current stack pointer.
    #[inline]
    pub fn sp(&self) -> u8 {
        self.r[SP as usize]
    }

    /// Decrement SP, wrapping within a memory of `memory_size` cells.
    /// Returns the new value.
    ///
    /// SP is first reduced modulo the memory size, so a value loaded past
    /// the end of memory addresses the same cell for PUSH and POP.
    pub fn dec_sp(&mut self, memory_size: usize) -> u8 {
        let size = stack_span(memory_size);
        let sp = wrap(self.sp() as usize % size + size - 1, size);
        self.r[SP as usize] = sp;
        sp
    }

    /// Increment SP, wrapping within a memory of `memory_size` cells.
    /// Returns the old value, reduced modulo the memory size.
    pub fn inc_sp(&mut self, memory_size: usize) -> u8 {
        let size = stack_span(memory_size);
        let old = wrap(self.sp() as usize, size);
        self.r[SP as usize] = wrap(old as usize + 1, size);
        old
    }

    /// Advance the program counter by `width` bytes.
    #[inline]
    pub fn advance_pc(&mut self, width: usize) {
        self.pc += width;
    }

    /// Set the program counter to an absolute address.
    #[inline]
    pub fn jump(&mut self, addr: u8) {
        self.pc = addr as usize;
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new(super::memory::MEMORY_SIZE)
    }
}

/// Number of cells SP can reach: the memory size, capped at 256.
fn stack_span(memory_size: usize) -> usize {
    memory_size.clamp(1, STACK_SPAN)
}

/// `value` modulo `size`, as a stack address. `size` is at most 256.
fn wrap(value: usize, size: usize) -> u8 {
    u8::try_from(value % size).unwrap_or(u8::MAX)
}

/// Initial SP value for a memory of the given size.
fn stack_top(memory_size: usize) -> u8 {
    wrap(stack_span(memory_size) - 1, STACK_SPAN)
}

/// Errors raised by register access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("register index {0} out of range (0-7)")]
    InvalidIndex(u8),
}
