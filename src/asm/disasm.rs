//! Disassembler for LS-8 programs.
//!
//! Converts program bytes back to readable assembly.

use crate::cpu::decode::{decode_bytes, Instruction, Opcode};

/// Format a decoded instruction as assembly text.
pub fn disassemble_instruction(instr: &Instruction) -> String {
    match *instr {
        Instruction::Hlt | Instruction::Ret => instr.mnemonic().to_string(),
        Instruction::Ldi { reg, value } => format!("LDI R{},{}", reg, value),
        Instruction::Alu { op, a, .. } if op.is_unary() => format!("{} R{}", op, a),
        Instruction::Alu { op, a, b } => format!("{} R{},R{}", op, a, b),
        Instruction::Call { reg }
        | Instruction::Jmp { reg }
        | Instruction::Jeq { reg }
        | Instruction::Jne { reg }
        | Instruction::Push { reg }
        | Instruction::Pop { reg }
        | Instruction::Prn { reg } => format!("{} R{}", instr.mnemonic(), reg),
    }
}

/// Disassemble the instruction at `addr`.
///
/// Returns the text and the number of bytes consumed. Unknown opcodes
/// and instructions cut off by the end of `bytes` come out as raw `DB`
/// lines one byte wide.
pub fn disassemble_at(bytes: &[u8], addr: usize) -> (String, usize) {
    let Some(&opcode) = bytes.get(addr) else {
        return (String::new(), 0);
    };
    let raw = || (format!("DB {:#010b}", opcode), 1);

    let Some(count) = Opcode::operand_count(opcode) else {
        return raw();
    };
    if addr + count >= bytes.len() {
        return raw();
    }

    let operand = |i: usize| if i < count { bytes[addr + 1 + i] } else { 0 };
    match decode_bytes(opcode, operand(0), operand(1)) {
        Ok(instr) => (disassemble_instruction(&instr), instr.width()),
        Err(_) => raw(),
    }
}

/// Disassemble a whole program image.
pub fn disassemble(bytes: &[u8]) -> String {
    let mut output = String::new();
    output.push_str("; LS-8 Disassembly\n");
    output.push_str("; ----------------\n\n");

    let mut addr = 0;
    while addr < bytes.len() {
        let (line, width) = disassemble_at(bytes, addr);
        let raw: Vec<String> = bytes[addr..addr + width]
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect();
        output.push_str(&format!("{:02X}: {:<9} {}\n", addr, raw.join(" "), line));
        addr += width;
    }

    output
}
