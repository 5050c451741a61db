//! TUI debugger for the LS-8 emulator.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register and flags view
//! - Hex memory view with PC and SP highlighted
//! - Step/run/breakpoint controls
//! - Disassembly and PRN output panes

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
