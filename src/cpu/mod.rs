//! CPU emulation for the LS-8.
//!
//! This module implements the complete LS-8 machine:
//! - 256 byte cells of memory (32 in the minimal variant)
//! - 8 byte registers, R7 reserved as the stack pointer
//! - a flags register set by CMP
//! - a 19-instruction set with 1-3 byte encodings

pub mod memory;
pub mod registers;
pub mod alu;
pub mod decode;
pub mod execute;

pub use memory::{Memory, MemoryError};
pub use registers::{Flags, Registers, RegisterError};
pub use alu::{AluOp, AluError, CmpMode};
pub use decode::{Instruction, Opcode, DecodeError};
pub use execute::{Cpu, CpuError, CpuState, TraceSnapshot};
