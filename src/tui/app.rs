//! Debugger application state and logic.

use std::collections::HashSet;

use crate::asm::disasm::{disassemble_at, disassemble_instruction};
use crate::config::{ConfigError, MachineConfig};
use crate::Cpu;

/// Lines of PRN output kept for the output pane.
const OUTPUT_HISTORY: usize = 200;

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged.
    pub cpu: Cpu,
    /// Original program for reference.
    pub program: Vec<u8>,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<usize>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// PRN output, newest last.
    pub output: Vec<String>,
    /// Memory view scroll offset (in rows of 8 bytes).
    pub mem_scroll: usize,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded program.
    pub fn new(program: Vec<u8>, config: MachineConfig) -> Result<Self, ConfigError> {
        let mut app = Self {
            cpu: Cpu::with_config(&config)?,
            program,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: String::new(),
            output: Vec::new(),
            mem_scroll: 0,
        };
        app.load();
        if app.status.is_empty() {
            app.status = "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into();
        }
        Ok(app)
    }

    fn load(&mut self) {
        self.cpu.reset();
        if let Err(e) = self.cpu.load_program(&self.program) {
            self.status = format!("Load error: {}", e);
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.cpu.is_running() {
            self.status = format!("CPU stopped: {:?}", self.cpu.state);
            self.running = false;
            return;
        }

        let pc = self.cpu.regs.pc;
        let mut out = Vec::new();
        let result = self.cpu.step(&mut out);
        self.capture_output(&out);

        match result {
            Ok(instr) => {
                self.status = format!("PC={:02X}: {}", pc, disassemble_instruction(&instr));
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
    }

    fn capture_output(&mut self, out: &[u8]) {
        let text = String::from_utf8_lossy(out);
        self.output.extend(text.lines().map(str::to_string));
        if self.output.len() > OUTPUT_HISTORY {
            let excess = self.output.len() - OUTPUT_HISTORY;
            self.output.drain(..excess);
        }
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// Run one iteration of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        if !self.cpu.is_running() {
            self.running = false;
            self.status =
                format!("Stopped after {} cycles ({:?})", self.cpu.cycles, self.cpu.state);
            return;
        }

        // Check for breakpoint
        let pc = self.cpu.regs.pc;
        if self.breakpoints.contains(&pc) {
            self.running = false;
            self.status = format!("Breakpoint at PC={:02X}", pc);
            return;
        }

        self.step();
    }

    /// Toggle breakpoint at current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.cpu.regs.pc;
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC={:02X}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={:02X}", pc);
        }
    }

    /// Reset CPU to initial state.
    pub fn reset(&mut self) {
        self.status = "Reset. Ready.".into();
        self.load();
        self.output.clear();
        self.running = false;
    }

    /// Get disassembly around the current PC as (addr, text, is_current).
    ///
    /// Instructions have different widths, so the listing is a linear
    /// sweep from address 0 that restarts at the PC when a jump lands
    /// mid-instruction.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(usize, String, bool)> {
        let bytes = self.cpu.mem.as_slice();
        let pc = self.cpu.regs.pc;

        let mut listing = Vec::new();
        let mut addr = 0;
        while addr < bytes.len() {
            if addr > pc && listing.last().is_some_and(|&(last, _, _)| last < pc) {
                addr = pc;
            }
            let (text, width) = disassemble_at(bytes, addr);
            listing.push((addr, text, addr == pc));
            addr += width.max(1);
        }

        let current = listing.iter().position(|(_, _, cur)| *cur).unwrap_or(0);
        let start = current.saturating_sub(lines / 2);
        listing.into_iter().skip(start).take(lines).collect()
    }
}

/// Run the debugger with a program.
pub fn run_debugger(program: Vec<u8>, config: MachineConfig) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    let mut app = DebuggerApp::new(program, config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let max_scroll = app.cpu.mem.len().div_ceil(8).saturating_sub(1);

    // Main loop
    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        // Handle input
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => app.mem_scroll = app.mem_scroll.saturating_sub(1),
                        KeyCode::Down => app.mem_scroll = (app.mem_scroll + 1).min(max_scroll),
                        _ => {}
                    }
                }
            }
        }

        // Tick for continuous running
        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
