//! Instruction decoder for the LS-8.
//!
//! Opcodes are one byte laid out as `AABCDDDD`:
//! - `AA`: number of operand bytes that follow (0-2)
//! - `B`: 1 if the ALU handles the instruction
//! - `C`: 1 if the instruction sets the PC itself
//! - `DDDD`: instruction identifier
//!
//! The decoder does not trust the layout bits; each opcode is looked up
//! in a fixed table, and unknown bytes are rejected.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cpu::alu::AluOp;
use crate::cpu::memory::{Memory, MemoryError};

/// Opcode byte values.
pub struct Opcode;

impl Opcode {
    pub const HLT: u8 = 0b0000_0001;
    pub const RET: u8 = 0b0001_0001;
    pub const PUSH: u8 = 0b0100_0101;
    pub const POP: u8 = 0b0100_0110;
    pub const PRN: u8 = 0b0100_0111;
    pub const CALL: u8 = 0b0101_0000;
    pub const JMP: u8 = 0b0101_0100;
    pub const JEQ: u8 = 0b0101_0101;
    pub const JNE: u8 = 0b0101_0110;
    pub const NOT: u8 = 0b0110_1001;
    pub const LDI: u8 = 0b1000_0010;
    pub const ADD: u8 = 0b1010_0000;
    pub const MUL: u8 = 0b1010_0010;
    pub const CMP: u8 = 0b1010_0111;
    pub const AND: u8 = 0b1010_1000;
    pub const OR: u8 = 0b1010_1010;
    pub const XOR: u8 = 0b1010_1011;
    pub const SHL: u8 = 0b1010_1100;
    pub const SHR: u8 = 0b1010_1101;

    /// Number of operand bytes following `opcode`, or `None` if the
    /// opcode is not part of the instruction set.
    pub fn operand_count(opcode: u8) -> Option<usize> {
        match opcode {
            Self::HLT | Self::RET => Some(0),
            Self::PUSH | Self::POP | Self::PRN | Self::CALL | Self::JMP | Self::JEQ
            | Self::JNE | Self::NOT => Some(1),
            Self::LDI | Self::ADD | Self::MUL | Self::CMP | Self::AND | Self::OR
            | Self::XOR | Self::SHL | Self::SHR => Some(2),
            _ => None,
        }
    }

    /// The ALU operation behind an ALU opcode.
    pub fn alu_op(opcode: u8) -> Option<AluOp> {
        let op = match opcode {
            Self::ADD => AluOp::Add,
            Self::MUL => AluOp::Mul,
            Self::CMP => AluOp::Cmp,
            Self::AND => AluOp::And,
            Self::OR => AluOp::Or,
            Self::XOR => AluOp::Xor,
            Self::NOT => AluOp::Not,
            Self::SHL => AluOp::Shl,
            Self::SHR => AluOp::Shr,
            _ => return None,
        };
        Some(op)
    }

    /// Opcode byte for an ALU operation.
    pub fn for_alu(op: AluOp) -> u8 {
        match op {
            AluOp::Add => Self::ADD,
            AluOp::Mul => Self::MUL,
            AluOp::Cmp => Self::CMP,
            AluOp::And => Self::AND,
            AluOp::Or => Self::OR,
            AluOp::Xor => Self::XOR,
            AluOp::Not => Self::NOT,
            AluOp::Shl => Self::SHL,
            AluOp::Shr => Self::SHR,
        }
    }
}

/// Decoded LS-8 instruction.
///
/// Register operands are raw bytes from memory; range checks happen at
/// register access time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    // ==================== Control ====================

    /// Halt execution
    Hlt,

    /// Push PC+2, then jump to the address in `reg`
    Call { reg: u8 },

    /// Pop the return address into PC
    Ret,

    /// Unconditional jump to the address in `reg`
    Jmp { reg: u8 },

    /// Jump to the address in `reg` if E is set
    Jeq { reg: u8 },

    /// Jump to the address in `reg` if E is clear
    Jne { reg: u8 },

    // ==================== Data Transfer ====================

    /// Load immediate: R[reg] := value
    Ldi { reg: u8, value: u8 },

    /// Push R[reg] onto the stack
    Push { reg: u8 },

    /// Pop the top of the stack into R[reg]
    Pop { reg: u8 },

    /// Print R[reg] as a decimal line
    Prn { reg: u8 },

    // ==================== ALU ====================

    /// ALU operation on R[a] and R[b]. For NOT, `b` is unused.
    Alu { op: AluOp, a: u8, b: u8 },
}

impl Instruction {
    /// Encoded size in bytes, opcode included.
    pub fn width(&self) -> usize {
        match self {
            Instruction::Hlt | Instruction::Ret => 1,
            Instruction::Alu { op, .. } if op.is_unary() => 2,
            Instruction::Alu { .. } | Instruction::Ldi { .. } => 3,
            _ => 2,
        }
    }

    /// The opcode byte.
    pub fn opcode(&self) -> u8 {
        match self {
            Instruction::Hlt => Opcode::HLT,
            Instruction::Call { .. } => Opcode::CALL,
            Instruction::Ret => Opcode::RET,
            Instruction::Jmp { .. } => Opcode::JMP,
            Instruction::Jeq { .. } => Opcode::JEQ,
            Instruction::Jne { .. } => Opcode::JNE,
            Instruction::Ldi { .. } => Opcode::LDI,
            Instruction::Push { .. } => Opcode::PUSH,
            Instruction::Pop { .. } => Opcode::POP,
            Instruction::Prn { .. } => Opcode::PRN,
            Instruction::Alu { op, .. } => Opcode::for_alu(*op),
        }
    }

    /// Assembly mnemonic.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Hlt => "HLT",
            Instruction::Call { .. } => "CALL",
            Instruction::Ret => "RET",
            Instruction::Jmp { .. } => "JMP",
            Instruction::Jeq { .. } => "JEQ",
            Instruction::Jne { .. } => "JNE",
            Instruction::Ldi { .. } => "LDI",
            Instruction::Push { .. } => "PUSH",
            Instruction::Pop { .. } => "POP",
            Instruction::Prn { .. } => "PRN",
            Instruction::Alu { op, .. } => op.mnemonic(),
        }
    }
}

/// Decode the instruction starting at `pc`.
///
/// Operand bytes must lie inside memory; an instruction that runs off
/// the end is a memory error.
pub fn decode(mem: &Memory, pc: usize) -> Result<Instruction, DecodeError> {
    let opcode = mem.read(pc)?;
    let count = Opcode::operand_count(opcode).ok_or(DecodeError::UnknownOpcode(opcode))?;

    let mut operands = [0u8; 2];
    for (i, operand) in operands.iter_mut().enumerate().take(count) {
        *operand = mem.read(pc + 1 + i)?;
    }
    decode_bytes(opcode, operands[0], operands[1])
}

/// Decode from an opcode and its (possibly unused) operand bytes.
pub fn decode_bytes(opcode: u8, op_a: u8, op_b: u8) -> Result<Instruction, DecodeError> {
    if let Some(op) = Opcode::alu_op(opcode) {
        let b = if op.is_unary() { 0 } else { op_b };
        return Ok(Instruction::Alu { op, a: op_a, b });
    }

    let instruction = match opcode {
        Opcode::HLT => Instruction::Hlt,
        Opcode::RET => Instruction::Ret,
        Opcode::CALL => Instruction::Call { reg: op_a },
        Opcode::JMP => Instruction::Jmp { reg: op_a },
        Opcode::JEQ => Instruction::Jeq { reg: op_a },
        Opcode::JNE => Instruction::Jne { reg: op_a },
        Opcode::LDI => Instruction::Ldi { reg: op_a, value: op_b },
        Opcode::PUSH => Instruction::Push { reg: op_a },
        Opcode::POP => Instruction::Pop { reg: op_a },
        Opcode::PRN => Instruction::Prn { reg: op_a },
        _ => return Err(DecodeError::UnknownOpcode(opcode)),
    };

    Ok(instruction)
}

/// Encode an instruction back to bytes.
pub fn encode(instr: &Instruction) -> Vec<u8> {
    let opcode = instr.opcode();
    match *instr {
        Instruction::Hlt | Instruction::Ret => vec![opcode],
        Instruction::Ldi { reg, value } => vec![opcode, reg, value],
        Instruction::Alu { op, a, .. } if op.is_unary() => vec![opcode, a],
        Instruction::Alu { a, b, .. } => vec![opcode, a, b],
        Instruction::Call { reg }
        | Instruction::Jmp { reg }
        | Instruction::Jeq { reg }
        | Instruction::Jne { reg }
        | Instruction::Push { reg }
        | Instruction::Pop { reg }
        | Instruction::Prn { reg } => vec![opcode, reg],
    }
}

/// Encode a sequence of instructions into a program image.
pub fn encode_program(instructions: &[Instruction]) -> Vec<u8> {
    instructions.iter().flat_map(encode).collect()
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown instruction: {0:#010b}")]
    UnknownOpcode(u8),

    #[error("fetch failed: {0}")]
    Fetch(#[from] MemoryError),
}
