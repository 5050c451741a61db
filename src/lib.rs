//! # LS-8 Emulator
//!
//! An emulator for the LS-8, a small 8-bit register machine.
//!
//! The LS-8 has 256 bytes of memory shared by code and a downward
//! growing stack, eight byte registers (R7 doubles as the stack pointer)
//! and a three-bit flags register set by CMP.

pub mod cpu;
pub mod asm;
pub mod config;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use cpu::{
    AluOp, CmpMode, Cpu, CpuError, CpuState, Flags, Instruction, Memory, Registers, TraceSnapshot,
};
pub use asm::{
    assemble, disassemble, load_image, load_program, parse_image, save_image, AssemblerError,
    LoadError, ProgramImage,
};
pub use config::{MachineConfig, ConfigError};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
