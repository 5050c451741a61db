//! CPU execution engine for the LS-8.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use std::fmt;
use std::io::Write;

use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigError, MachineConfig};
use crate::cpu::alu::{self, AluError, CmpMode};
use crate::cpu::decode::{self, DecodeError, Instruction};
use crate::cpu::memory::MemoryError;
use crate::cpu::registers::{RegisterError, REGISTER_COUNT};
use crate::cpu::{Memory, Registers};

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU has halted (executed HLT instruction).
    Halted,
    /// CPU stopped on a fatal error.
    Error,
}

/// The LS-8 CPU.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Instruction count.
    pub cycles: u64,
    /// How CMP fills the flags.
    pub cmp_mode: CmpMode,
    /// Last executed instruction (for debugging).
    last_instr: Option<Instruction>,
}

impl Cpu {
    /// Create a full-size CPU with zeroed state.
    pub fn new() -> Self {
        Self::build(&MachineConfig::default())
    }

    /// Create a CPU sized and configured by `config`.
    ///
    /// Fails if the memory size is outside 1-256.
    pub fn with_config(config: &MachineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: &MachineConfig) -> Self {
        let mem = Memory::with_size(config.memory_size);
        Self {
            regs: Registers::new(mem.len()),
            mem,
            state: CpuState::Running,
            cycles: 0,
            cmp_mode: config.cmp_mode,
            last_instr: None,
        }
    }

    /// Reset the CPU to initial state.
    pub fn reset(&mut self) {
        self.regs.reset(self.mem.len());
        self.mem.clear();
        self.state = CpuState::Running;
        self.cycles = 0;
        self.last_instr = None;
    }

    /// Load a program image at address 0.
    pub fn load_program(&mut self, program: &[u8]) -> Result<(), MemoryError> {
        self.mem.load_program(0, program)?;
        info!("loaded {} bytes into {}-byte memory", program.len(), self.mem.len());
        Ok(())
    }

    /// Execute a single instruction, writing any PRN output to `out`.
    ///
    /// Returns the instruction that was executed, or an error. Any error
    /// moves the CPU to [`CpuState::Error`].
    pub fn step<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<Instruction, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        let pc = self.regs.pc;
        match self.fetch_and_execute(out) {
            Ok(instr) => {
                self.cycles += 1;
                self.last_instr = Some(instr);
                trace!(
                    "{:02X}: {:<4} -> pc={:02X} {:?}",
                    pc,
                    instr.mnemonic(),
                    self.regs.pc,
                    self.regs.fl
                );
                Ok(instr)
            }
            Err(e) => {
                debug!("fatal error at pc={:02X} after {} cycles: {}", pc, self.cycles, e);
                self.state = CpuState::Error;
                Err(e)
            }
        }
    }

    /// Run until halt or error.
    ///
    /// Returns the number of instructions executed.
    pub fn run<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.state == CpuState::Running {
            self.step(out)?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited<W: Write + ?Sized>(
        &mut self,
        max_cycles: u64,
        out: &mut W,
    ) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.state == CpuState::Running && self.cycles < limit {
            self.step(out)?;
        }

        Ok(self.cycles - start_cycles)
    }

    fn fetch_and_execute<W: Write + ?Sized>(
        &mut self,
        out: &mut W,
    ) -> Result<Instruction, CpuError> {
        // Fetch + decode
        let instr = decode::decode(&self.mem, self.regs.pc).map_err(|e| match e {
            DecodeError::Fetch(mem) => CpuError::MemoryError(mem),
            other => CpuError::DecodeError(other),
        })?;

        // Execute
        self.execute(instr, out)?;
        Ok(instr)
    }

    /// Execute a decoded instruction and update the PC.
    fn execute<W: Write + ?Sized>(
        &mut self,
        instr: Instruction,
        out: &mut W,
    ) -> Result<(), CpuError> {
        let width = instr.width();

        match instr {
            // ==================== Control ====================

            Instruction::Hlt => {
                self.state = CpuState::Halted;
                self.regs.advance_pc(width);
                debug!("halted after {} cycles", self.cycles + 1);
            }

            Instruction::Call { reg } => {
                let target = self.regs.get(reg)?;
                let ret = self.regs.pc + width;
                let size = self.mem.len();
                let ret = u8::try_from(ret)
                    .map_err(|_| MemoryError::AddressOutOfRange { addr: ret, size })?;
                self.push(ret)?;
                self.regs.jump(target);
            }

            Instruction::Ret => {
                let addr = self.pop()?;
                self.regs.jump(addr);
            }

            Instruction::Jmp { reg } => {
                let target = self.regs.get(reg)?;
                self.regs.jump(target);
            }

            Instruction::Jeq { reg } => {
                self.jump_if(self.regs.fl.equal(), reg, width)?;
            }

            Instruction::Jne { reg } => {
                self.jump_if(!self.regs.fl.equal(), reg, width)?;
            }

            // ==================== Data Transfer ====================

            Instruction::Ldi { reg, value } => {
                self.regs.set(reg, value)?;
                self.regs.advance_pc(width);
            }

            Instruction::Push { reg } => {
                let value = self.regs.get(reg)?;
                self.push(value)?;
                self.regs.advance_pc(width);
            }

            Instruction::Pop { reg } => {
                // Validate the destination before touching SP
                self.regs.get(reg)?;
                let value = self.pop()?;
                self.regs.set(reg, value)?;
                self.regs.advance_pc(width);
            }

            Instruction::Prn { reg } => {
                let value = self.regs.get(reg)?;
                writeln!(out, "{}", value).map_err(|e| CpuError::Output(e.to_string()))?;
                self.regs.advance_pc(width);
            }

            // ==================== ALU ====================

            Instruction::Alu { op, a, b } => {
                alu::apply(op, &mut self.regs, a, b, self.cmp_mode)?;
                self.regs.advance_pc(width);
            }
        }

        Ok(())
    }

    /// Decrement SP (wrapping) and store `value` at the new top.
    fn push(&mut self, value: u8) -> Result<(), CpuError> {
        let sp = self.regs.dec_sp(self.mem.len());
        self.mem.write(sp as usize, value)?;
        Ok(())
    }

    /// Load the top of the stack and increment SP (wrapping).
    fn pop(&mut self) -> Result<u8, CpuError> {
        let addr = self.regs.inc_sp(self.mem.len());
        Ok(self.mem.read(addr as usize)?)
    }

    fn jump_if(&mut self, taken: bool, reg: u8, width: usize) -> Result<(), CpuError> {
        let target = self.regs.get(reg)?;
        if taken {
            self.regs.jump(target);
        } else {
            self.regs.advance_pc(width);
        }
        Ok(())
    }

    /// Snapshot of PC, the next three memory cells and all registers.
    pub fn trace(&self) -> TraceSnapshot {
        let pc = self.regs.pc;
        let peek = |offset: usize| self.mem.peek(pc + offset).unwrap_or(0);
        TraceSnapshot {
            pc,
            next: [peek(0), peek(1), peek(2)],
            fl: self.regs.fl.bits(),
            regs: self.regs.r,
        }
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Read-only view of the machine for trace output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TraceSnapshot {
    pub pc: usize,
    /// Memory at PC, PC+1, PC+2 (zero past the end of memory).
    pub next: [u8; 3],
    pub fl: u8,
    pub regs: [u8; REGISTER_COUNT],
}

impl fmt::Display for TraceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TRACE: {:02X} | {:02X} {:02X} {:02X} |",
            self.pc, self.next[0], self.next[1], self.next[2]
        )?;
        for reg in self.regs {
            write!(f, " {:02X}", reg)?;
        }
        Ok(())
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("memory error: {0}")]
    MemoryError(#[from] MemoryError),

    #[error(transparent)]
    DecodeError(#[from] DecodeError),

    #[error("register error: {0}")]
    RegisterError(#[from] RegisterError),

    #[error("ALU error: {0}")]
    AluError(#[from] AluError),

    #[error("output error: {0}")]
    Output(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::alu::AluOp;
    use crate::cpu::decode::{encode_program, Opcode};
    use crate::cpu::registers::SP;

    fn make_cpu(instructions: &[Instruction]) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.load_program(&encode_program(instructions)).unwrap();
        cpu
    }

    fn run_to_string(cpu: &mut Cpu) -> String {
        let mut out = Vec::new();
        cpu.run(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_cpu_halt() {
        let mut cpu = make_cpu(&[Instruction::Hlt]);
        let executed = cpu.run(&mut std::io::sink()).unwrap();

        assert_eq!(executed, 1);
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.pc, 1);
    }

    #[test]
    fn test_step_after_halt() {
        let mut cpu = make_cpu(&[Instruction::Hlt]);
        cpu.run(&mut std::io::sink()).unwrap();
        let err = cpu.step(&mut std::io::sink()).unwrap_err();
        assert_eq!(err, CpuError::NotRunning(CpuState::Halted));
    }

    #[test]
    fn test_ldi_prn() {
        let mut cpu = make_cpu(&[
            Instruction::Ldi { reg: 3, value: 200 },
            Instruction::Prn { reg: 3 },
            Instruction::Hlt,
        ]);
        assert_eq!(run_to_string(&mut cpu), "200\n");
        assert_eq!(cpu.cycles, 3);
    }

    #[test]
    fn test_mul_program() {
        let mut cpu = make_cpu(&[
            Instruction::Ldi { reg: 0, value: 8 },
            Instruction::Ldi { reg: 1, value: 9 },
            Instruction::Alu { op: AluOp::Mul, a: 0, b: 1 },
            Instruction::Prn { reg: 0 },
            Instruction::Hlt,
        ]);
        assert_eq!(run_to_string(&mut cpu), "72\n");
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_push_pop() {
        let mut cpu = make_cpu(&[
            Instruction::Ldi { reg: 0, value: 5 },
            Instruction::Push { reg: 0 },
            Instruction::Pop { reg: 1 },
            Instruction::Prn { reg: 1 },
            Instruction::Hlt,
        ]);
        assert_eq!(run_to_string(&mut cpu), "5\n");
        assert_eq!(cpu.regs.sp(), 255);
        // The pushed value stays in memory below SP
        assert_eq!(cpu.mem.read(254).unwrap(), 5);
    }

    #[test]
    fn test_call_ret() {
        // 0: LDI R1,8   3: CALL R1   5: PRN R0   7: HLT
        // 8: LDI R0,42  11: RET
        let mut cpu = make_cpu(&[
            Instruction::Ldi { reg: 1, value: 8 },
            Instruction::Call { reg: 1 },
            Instruction::Prn { reg: 0 },
            Instruction::Hlt,
            Instruction::Ldi { reg: 0, value: 42 },
            Instruction::Ret,
        ]);

        let mut out = Vec::new();
        cpu.step(&mut out).unwrap();
        cpu.step(&mut out).unwrap();
        assert_eq!(cpu.regs.pc, 8);
        assert_eq!(cpu.regs.sp(), 254);
        assert_eq!(cpu.mem.read(254).unwrap(), 5);

        cpu.run(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "42\n");
        assert_eq!(cpu.regs.sp(), 255);
    }

    #[test]
    fn test_conditional_jumps() {
        // 0: LDI R0,1  3: LDI R1,1  6: LDI R2,17  9: CMP R0,R1
        // 12: JEQ R2   14: PRN R0   16: HLT       17: PRN R2  19: HLT
        let mut cpu = make_cpu(&[
            Instruction::Ldi { reg: 0, value: 1 },
            Instruction::Ldi { reg: 1, value: 1 },
            Instruction::Ldi { reg: 2, value: 17 },
            Instruction::Alu { op: AluOp::Cmp, a: 0, b: 1 },
            Instruction::Jeq { reg: 2 },
            Instruction::Prn { reg: 0 },
            Instruction::Hlt,
            Instruction::Prn { reg: 2 },
            Instruction::Hlt,
        ]);
        assert_eq!(run_to_string(&mut cpu), "17\n");

        // Same program with JNE falls through
        let mut cpu = make_cpu(&[
            Instruction::Ldi { reg: 0, value: 1 },
            Instruction::Ldi { reg: 1, value: 1 },
            Instruction::Ldi { reg: 2, value: 17 },
            Instruction::Alu { op: AluOp::Cmp, a: 0, b: 1 },
            Instruction::Jne { reg: 2 },
            Instruction::Prn { reg: 0 },
            Instruction::Hlt,
            Instruction::Prn { reg: 2 },
            Instruction::Hlt,
        ]);
        assert_eq!(run_to_string(&mut cpu), "1\n");
    }

    #[test]
    fn test_unknown_opcode_stops() {
        let mut cpu = Cpu::new();
        cpu.load_program(&[Opcode::LDI, 0, 1, 0xFF, Opcode::PRN, 0, Opcode::HLT]).unwrap();

        let mut out = Vec::new();
        let err = cpu.run(&mut out).unwrap_err();

        assert_eq!(err, CpuError::DecodeError(DecodeError::UnknownOpcode(0xFF)));
        assert_eq!(err.to_string(), "unknown instruction: 0b11111111");
        assert_eq!(cpu.state, CpuState::Error);
        assert_eq!(cpu.cycles, 1);
        assert!(out.is_empty());
    }

    #[test]
    fn test_invalid_register_is_fatal() {
        let mut cpu = Cpu::new();
        cpu.load_program(&[Opcode::PRN, 9, Opcode::HLT]).unwrap();
        let err = cpu.run(&mut std::io::sink()).unwrap_err();
        assert_eq!(err, CpuError::RegisterError(RegisterError::InvalidIndex(9)));
    }

    #[test]
    fn test_running_off_memory_is_fatal() {
        let mut cpu = Cpu::with_config(&MachineConfig {
            memory_size: 4,
            ..MachineConfig::default()
        })
        .unwrap();
        cpu.load_program(&[Opcode::LDI, 0, 1]).unwrap();
        // Address 3 holds 0, which is not an opcode
        assert!(matches!(
            cpu.run(&mut std::io::sink()),
            Err(CpuError::DecodeError(DecodeError::UnknownOpcode(0)))
        ));

        let mut cpu = Cpu::with_config(&MachineConfig {
            memory_size: 3,
            ..MachineConfig::default()
        })
        .unwrap();
        cpu.load_program(&[Opcode::LDI, 0, 1]).unwrap();
        assert_eq!(
            cpu.run(&mut std::io::sink()),
            Err(CpuError::MemoryError(MemoryError::AddressOutOfRange { addr: 3, size: 3 }))
        );
    }

    #[test]
    fn test_stack_wraps_in_small_memory() {
        let mut cpu = Cpu::with_config(&MachineConfig {
            memory_size: 32,
            ..MachineConfig::default()
        })
        .unwrap();
        cpu.load_program(&encode_program(&[
            Instruction::Ldi { reg: SP, value: 0 },
            Instruction::Ldi { reg: 0, value: 77 },
            Instruction::Push { reg: 0 },
            Instruction::Hlt,
        ]))
        .unwrap();
        cpu.run(&mut std::io::sink()).unwrap();

        assert_eq!(cpu.regs.sp(), 31);
        assert_eq!(cpu.mem.read(31).unwrap(), 77);
    }

    #[test]
    fn test_sp_past_memory_end_wraps_for_push_and_pop() {
        let mut cpu = Cpu::with_config(&MachineConfig {
            memory_size: 32,
            ..MachineConfig::default()
        })
        .unwrap();
        // 62 is cell 30 of a 32-cell memory, where PUSH left the value
        cpu.load_program(&encode_program(&[
            Instruction::Ldi { reg: 0, value: 9 },
            Instruction::Push { reg: 0 },
            Instruction::Ldi { reg: SP, value: 62 },
            Instruction::Pop { reg: 1 },
            Instruction::Prn { reg: 1 },
            Instruction::Ldi { reg: SP, value: 200 },
            Instruction::Pop { reg: 2 },
            Instruction::Hlt,
        ]))
        .unwrap();

        let mut out = Vec::new();
        cpu.run(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "9\n");
        assert_eq!(cpu.regs.get(1).unwrap(), 9);
        // 200 reads cell 8 and leaves SP at 9
        assert_eq!(cpu.regs.get(2).unwrap(), cpu.mem.read(8).unwrap());
        assert_eq!(cpu.regs.sp(), 9);
    }

    #[test]
    fn test_with_config_rejects_oversized_memory() {
        let config = MachineConfig { memory_size: 300, ..MachineConfig::default() };
        assert_eq!(Cpu::with_config(&config).unwrap_err(), ConfigError::MemorySize(300));

        let config = MachineConfig { memory_size: 0, ..MachineConfig::default() };
        assert!(Cpu::with_config(&config).is_err());
    }

    #[test]
    fn test_legacy_cmp_mode() {
        let program = encode_program(&[
            Instruction::Ldi { reg: 0, value: 9 },
            Instruction::Ldi { reg: 1, value: 2 },
            Instruction::Alu { op: AluOp::Cmp, a: 0, b: 1 },
            Instruction::Hlt,
        ]);

        let mut cpu = Cpu::new();
        cpu.load_program(&program).unwrap();
        cpu.run(&mut std::io::sink()).unwrap();
        assert!(cpu.regs.fl.greater());

        let mut cpu = Cpu::new();
        cpu.cmp_mode = CmpMode::Legacy;
        cpu.load_program(&program).unwrap();
        cpu.run(&mut std::io::sink()).unwrap();
        assert_eq!(cpu.regs.fl.bits(), 0);
    }

    #[test]
    fn test_run_limited() {
        // 0: LDI R0,0  3: JMP R0  (loops forever)
        let mut cpu = make_cpu(&[
            Instruction::Ldi { reg: 0, value: 0 },
            Instruction::Jmp { reg: 0 },
        ]);
        let executed = cpu.run_limited(10, &mut std::io::sink()).unwrap();
        assert_eq!(executed, 10);
        assert!(cpu.is_running());
    }

    #[test]
    fn test_trace_format() {
        let mut cpu = make_cpu(&[Instruction::Ldi { reg: 0, value: 8 }, Instruction::Hlt]);
        assert_eq!(
            cpu.trace().to_string(),
            "TRACE: 00 | 82 00 08 | 00 00 00 00 00 00 00 FF"
        );

        cpu.step(&mut std::io::sink()).unwrap();
        assert_eq!(cpu.trace().pc, 3);
        assert_eq!(cpu.trace().next, [0x01, 0x00, 0x00]);
        assert_eq!(cpu.last_instruction(), Some(Instruction::Ldi { reg: 0, value: 8 }));
    }

    #[test]
    fn test_reset() {
        let mut cpu = make_cpu(&[Instruction::Ldi { reg: 0, value: 1 }, Instruction::Hlt]);
        cpu.run(&mut std::io::sink()).unwrap();
        cpu.reset();

        assert!(cpu.is_running());
        assert_eq!(cpu.cycles, 0);
        assert_eq!(cpu.regs, Registers::new(256));
        assert_eq!(cpu.mem.read(0).unwrap(), 0);
    }
}
