//! Program tooling for the LS-8.
//!
//! This module provides:
//! - The program image format (binary-literal text, one byte per line)
//! - A simple two-pass assembler (mnemonics → image bytes)
//! - A disassembler (image bytes → readable text)

pub mod assembler;
pub mod disasm;
pub mod image;

pub use assembler::{assemble, AssemblerError};
pub use disasm::disassemble;
pub use image::{ProgramImage, ImageError, load_image, parse_image, save_image};

use std::path::Path;

use thiserror::Error;

/// Load a program from disk. `.asm` files are assembled; anything else
/// is read as a program image.
pub fn load_program<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, LoadError> {
    let path = path.as_ref();
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("asm")) {
        let source = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ImageError::NotFound(path.display().to_string()),
            _ => ImageError::IoError(e.to_string()),
        })?;
        Ok(assemble(&source)?)
    } else {
        Ok(load_image(path)?.bytes)
    }
}

/// Errors from [`load_program`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("assembly error: {0}")]
    Assembler(#[from] AssemblerError),
}
