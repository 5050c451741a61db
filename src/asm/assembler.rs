//! Simple assembler for LS-8 programs.
//!
//! Syntax:
//! ```text
//! ; Comment (# also works)
//! LOOP:               ; Define a label
//!     LDI R0, 8       ; Load immediate
//!     LDI R1, LOOP    ; Labels are valid immediates
//!     MUL R0, R1      ; Two-register ALU op
//!     JMP R1          ; Jumps go through a register
//!     HLT
//!     DB 0b1010       ; Raw data byte
//! ```

use std::collections::HashMap;

use thiserror::Error;

use crate::cpu::alu::AluOp;
use crate::cpu::decode::{encode, Instruction};
use crate::cpu::registers::REGISTER_COUNT;

/// Assemble source code to a program image.
pub fn assemble(source: &str) -> Result<Vec<u8>, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// The assembler state.
struct Assembler {
    /// Symbol table (label -> address).
    symbols: HashMap<String, u8>,
    /// Immediates waiting on a label: (output_index, label, source_line).
    pending: Vec<(usize, String, usize)>,
    /// Output bytes.
    output: Vec<u8>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            pending: Vec::new(),
            output: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<u8>, AssemblerError> {
        // Pass 1: Collect labels and generate code
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        // Pass 2: Resolve forward references
        self.resolve_references()?;

        Ok(std::mem::take(&mut self.output))
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        // Remove comments
        let line = line
            .split(|c: char| c == ';' || c == '#')
            .next()
            .unwrap_or("")
            .trim();

        if line.is_empty() {
            return Ok(());
        }

        // Check for label definition
        if let Some((label, rest)) = line.split_once(':') {
            let label = label.trim().to_uppercase();
            if label.is_empty() || label.contains(char::is_whitespace) {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("invalid label {:?}", label),
                });
            }
            let addr = self.current_addr(line_num)?;
            if self.symbols.insert(label.clone(), addr).is_some() {
                return Err(AssemblerError::DuplicateLabel { line: line_num, label });
            }

            // Process rest of line if any
            let rest = rest.trim();
            if !rest.is_empty() {
                return self.process_instruction(rest, line_num);
            }
            return Ok(());
        }

        self.process_instruction(line, line_num)
    }

    fn process_instruction(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let (mnemonic, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let mnemonic = mnemonic.to_uppercase();
        let operands: Vec<&str> = if rest.trim().is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(str::trim).collect()
        };

        // Directives
        if mnemonic == "DB" {
            let [value] = self.expect_operands::<1>(&mnemonic, &operands, line_num)?;
            let byte = self.parse_immediate(value, line_num)?;
            self.output.push(byte);
            return Ok(());
        }

        let instr = self.parse_instruction(&mnemonic, &operands, line_num)?;
        self.output.extend(encode(&instr));
        Ok(())
    }

    fn parse_instruction(&mut self, mnemonic: &str, operands: &[&str], line_num: usize)
        -> Result<Instruction, AssemblerError>
    {
        let instr = match mnemonic {
            "HLT" => {
                self.expect_operands::<0>(mnemonic, operands, line_num)?;
                Instruction::Hlt
            }
            "RET" => {
                self.expect_operands::<0>(mnemonic, operands, line_num)?;
                Instruction::Ret
            }
            "LDI" => {
                let [reg, value] = self.expect_operands::<2>(mnemonic, operands, line_num)?;
                let reg = parse_register(reg, line_num)?;
                // The immediate is the third byte of the instruction
                let start = self.output.len();
                let value = self.parse_immediate_at(value, start + 2, line_num)?;
                Instruction::Ldi { reg, value }
            }
            "PUSH" | "POP" | "PRN" | "CALL" | "JMP" | "JEQ" | "JNE" => {
                let [reg] = self.expect_operands::<1>(mnemonic, operands, line_num)?;
                let reg = parse_register(reg, line_num)?;
                match mnemonic {
                    "PUSH" => Instruction::Push { reg },
                    "POP" => Instruction::Pop { reg },
                    "PRN" => Instruction::Prn { reg },
                    "CALL" => Instruction::Call { reg },
                    "JMP" => Instruction::Jmp { reg },
                    "JEQ" => Instruction::Jeq { reg },
                    _ => Instruction::Jne { reg },
                }
            }
            _ => {
                let op: AluOp = mnemonic.parse().map_err(|_| AssemblerError::UnknownMnemonic {
                    line: line_num,
                    mnemonic: mnemonic.to_string(),
                })?;
                if op.is_unary() {
                    let [a] = self.expect_operands::<1>(mnemonic, operands, line_num)?;
                    Instruction::Alu { op, a: parse_register(a, line_num)?, b: 0 }
                } else {
                    let [a, b] = self.expect_operands::<2>(mnemonic, operands, line_num)?;
                    Instruction::Alu {
                        op,
                        a: parse_register(a, line_num)?,
                        b: parse_register(b, line_num)?,
                    }
                }
            }
        };

        Ok(instr)
    }

    fn expect_operands<'a, const N: usize>(
        &self,
        mnemonic: &str,
        operands: &[&'a str],
        line_num: usize,
    ) -> Result<[&'a str; N], AssemblerError> {
        <[&str; N]>::try_from(operands).map_err(|_| AssemblerError::SyntaxError {
            line: line_num,
            message: format!("{} takes {} operand(s), found {}", mnemonic, N, operands.len()),
        })
    }

    /// Parse an immediate that will be emitted as the next output byte.
    fn parse_immediate(&mut self, operand: &str, line_num: usize) -> Result<u8, AssemblerError> {
        let index = self.output.len();
        self.parse_immediate_at(operand, index, line_num)
    }

    /// Parse an immediate that will land at `out_idx` in the output.
    /// Labels are recorded and patched in pass 2.
    fn parse_immediate_at(&mut self, operand: &str, out_idx: usize, line_num: usize)
        -> Result<u8, AssemblerError>
    {
        if let Some(value) = parse_number(operand, line_num)? {
            return u8::try_from(value)
                .map_err(|_| AssemblerError::ValueOutOfRange { line: line_num, value });
        }

        if operand.is_empty() || !operand.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: format!("invalid operand {:?}", operand),
            });
        }

        self.pending.push((out_idx, operand.to_uppercase(), line_num));
        Ok(0) // Placeholder, will be resolved in pass 2
    }

    fn current_addr(&self, line_num: usize) -> Result<u8, AssemblerError> {
        let addr = self.output.len();
        u8::try_from(addr).map_err(|_| AssemblerError::ValueOutOfRange {
            line: line_num,
            value: addr as i64,
        })
    }

    fn resolve_references(&mut self) -> Result<(), AssemblerError> {
        for (out_idx, label, line_num) in &self.pending {
            let addr = self.symbols.get(label)
                .ok_or_else(|| AssemblerError::UndefinedLabel {
                    line: *line_num,
                    label: label.clone(),
                })?;
            self.output[*out_idx] = *addr;
        }
        Ok(())
    }
}

/// Parse `R0`-`R7`.
fn parse_register(operand: &str, line_num: usize) -> Result<u8, AssemblerError> {
    operand
        .strip_prefix(|c: char| c.eq_ignore_ascii_case(&'r'))
        .and_then(|n| n.parse::<u8>().ok())
        .filter(|&n| (n as usize) < REGISTER_COUNT)
        .ok_or_else(|| AssemblerError::InvalidRegister {
            line: line_num,
            operand: operand.to_string(),
        })
}

/// Parse a decimal, `0x` hex or `0b` binary literal. `Ok(None)` means
/// the operand is not a number (it may be a label).
fn parse_number(operand: &str, line_num: usize) -> Result<Option<i64>, AssemblerError> {
    let invalid = |kind: &str| AssemblerError::SyntaxError {
        line: line_num,
        message: format!("invalid {} literal {:?}", kind, operand),
    };

    if let Some(hex) = operand.strip_prefix("0x").or_else(|| operand.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map(Some).map_err(|_| invalid("hex"));
    }
    if let Some(bin) = operand.strip_prefix("0b").or_else(|| operand.strip_prefix("0B")) {
        return i64::from_str_radix(bin, 2).map(Some).map_err(|_| invalid("binary"));
    }
    if operand.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        return operand.parse::<i64>().map(Some).map_err(|_| invalid("decimal"));
    }
    Ok(None)
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("invalid register on line {line}: {operand}")]
    InvalidRegister { line: usize, operand: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("duplicate label on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i64 },
}
