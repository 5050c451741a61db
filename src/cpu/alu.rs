//! Arithmetic/logic unit.
//!
//! Every operation reads registers A and B and writes its result back to
//! A, except CMP, which only writes the flags. Results wrap at 8 bits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cpu::registers::{Flags, RegisterError, Registers};

/// ALU operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AluOp {
    Add,
    Mul,
    Cmp,
    And,
    Or,
    Xor,
    /// Unary; register B is ignored.
    Not,
    Shl,
    Shr,
}

impl AluOp {
    pub const ALL: [AluOp; 9] = [
        AluOp::Add,
        AluOp::Mul,
        AluOp::Cmp,
        AluOp::And,
        AluOp::Or,
        AluOp::Xor,
        AluOp::Not,
        AluOp::Shl,
        AluOp::Shr,
    ];

    /// Assembly mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "ADD",
            AluOp::Mul => "MUL",
            AluOp::Cmp => "CMP",
            AluOp::And => "AND",
            AluOp::Or => "OR",
            AluOp::Xor => "XOR",
            AluOp::Not => "NOT",
            AluOp::Shl => "SHL",
            AluOp::Shr => "SHR",
        }
    }

    /// True for operations that take a single register.
    pub fn is_unary(self) -> bool {
        matches!(self, AluOp::Not)
    }
}

impl fmt::Display for AluOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl FromStr for AluOp {
    type Err = AluError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AluOp::ALL
            .into_iter()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(s))
            .ok_or_else(|| AluError::Unsupported(s.to_string()))
    }
}

/// How CMP fills the flags register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CmpMode {
    /// Exactly one of L, G, E is set.
    #[default]
    Corrected,
    /// Bug-compatible: A > B leaves the flags untouched, so G is never set.
    Legacy,
}

/// Apply `op` to registers `a` and `b`.
pub fn apply(
    op: AluOp,
    regs: &mut Registers,
    a: u8,
    b: u8,
    cmp_mode: CmpMode,
) -> Result<(), AluError> {
    let x = regs.get(a)?;
    // NOT ignores B
    let y = if op.is_unary() { 0 } else { regs.get(b)? };

    let result = match op {
        AluOp::Add => x.wrapping_add(y),
        AluOp::Mul => x.wrapping_mul(y),
        AluOp::And => x & y,
        AluOp::Or => x | y,
        AluOp::Xor => x ^ y,
        AluOp::Not => !x,
        AluOp::Shl => x.checked_shl(y as u32).unwrap_or(0),
        AluOp::Shr => x.checked_shr(y as u32).unwrap_or(0),
        AluOp::Cmp => {
            if let Some(fl) = compare(x, y, cmp_mode) {
                regs.fl = fl;
            }
            return Ok(());
        }
    };

    regs.set(a, result)?;
    Ok(())
}

/// Flags produced by comparing `x` with `y`, or `None` when the mode
/// leaves the flags unchanged.
pub fn compare(x: u8, y: u8, mode: CmpMode) -> Option<Flags> {
    use std::cmp::Ordering;

    match (x.cmp(&y), mode) {
        (Ordering::Less, _) => Some(Flags::from_bits(Flags::L)),
        (Ordering::Equal, _) => Some(Flags::from_bits(Flags::E)),
        (Ordering::Greater, CmpMode::Corrected) => Some(Flags::from_bits(Flags::G)),
        (Ordering::Greater, CmpMode::Legacy) => None,
    }
}

/// Errors raised by the ALU.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AluError {
    #[error("unsupported ALU operation: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Register(#[from] RegisterError),
}
