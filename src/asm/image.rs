//! LS-8 program image format.
//!
//! A program image is a plain text file:
//! - One byte per line, written as 1-8 binary digits
//! - `#` starts a comment that runs to the end of the line
//! - Blank lines are ignored
//!
//! ```text
//! 10000010 # LDI R0,8
//! 00000000
//! 00001000
//! 00000001 # HLT
//! ```

use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use thiserror::Error;

use crate::asm::disasm::disassemble_at;

/// A loaded program image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramImage {
    /// Memory contents starting at address 0.
    pub bytes: Vec<u8>,
}

impl ProgramImage {
    /// Create a new empty image.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a byte.
    pub fn push(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    /// Get the number of bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<Vec<u8>> for ProgramImage {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

/// Parse a single byte literal such as `10000010`.
pub fn parse_byte(literal: &str) -> Result<u8, String> {
    if literal.is_empty() || literal.len() > 8 {
        return Err(format!("expected 1-8 binary digits, found {:?}", literal));
    }
    if !literal.bytes().all(|c| c == b'0' || c == b'1') {
        return Err(format!("invalid binary literal {:?}", literal));
    }
    u8::from_str_radix(literal, 2).map_err(|e| e.to_string())
}

/// Parse program image text.
pub fn parse_image(text: &str) -> Result<ProgramImage, ImageError> {
    let mut image = ProgramImage::new();

    for (line_num, line) in text.lines().enumerate() {
        push_line(&mut image, line, line_num + 1)?;
    }

    Ok(image)
}

/// Load a program image from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<ProgramImage, ImageError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ImageError::NotFound(path.display().to_string()),
        _ => ImageError::IoError(e.to_string()),
    })?;
    let reader = BufReader::new(file);

    let mut image = ProgramImage::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(|e| ImageError::IoError(e.to_string()))?;
        push_line(&mut image, &line, line_num + 1)?;
    }

    log::debug!("parsed {} bytes from {}", image.len(), path.display());
    Ok(image)
}

fn push_line(image: &mut ProgramImage, line: &str, line_num: usize) -> Result<(), ImageError> {
    let code = line.split('#').next().unwrap_or("").trim();

    // Skip blank and comment-only lines
    if code.is_empty() {
        return Ok(());
    }

    let byte = parse_byte(code).map_err(|message| ImageError::ParseError {
        line: line_num,
        message,
    })?;
    image.push(byte);
    Ok(())
}

/// Render an image as text, annotating each instruction with its mnemonic.
pub fn format_image(bytes: &[u8]) -> String {
    let mut output = String::new();
    output.push_str("# LS-8 program image\n");
    output.push_str(&format!("# {} bytes\n\n", bytes.len()));

    let mut addr = 0;
    while addr < bytes.len() {
        let (text, width) = disassemble_at(bytes, addr);
        let end = (addr + width).min(bytes.len());
        output.push_str(&format!("{:08b} # {:02X}: {}\n", bytes[addr], addr, text));
        for byte in &bytes[addr + 1..end] {
            output.push_str(&format!("{:08b}\n", byte));
        }
        addr = end;
    }

    output
}

/// Save a program image to disk.
pub fn save_image<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<(), ImageError> {
    let mut file = std::fs::File::create(path.as_ref())
        .map_err(|e| ImageError::IoError(e.to_string()))?;

    file.write_all(format_image(bytes).as_bytes())
        .map_err(|e| ImageError::IoError(e.to_string()))?;

    Ok(())
}

/// Errors that can occur while reading or writing program images.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_comments() {
        let text = "\
# print8.ls8
10000010 # LDI R0,8
00000000
00001000

01000111 # PRN R0
00000000
00000001 # HLT
";
        let image = parse_image(text).unwrap();
        assert_eq!(image.bytes, vec![0x82, 0, 8, 0x47, 0, 1]);
        assert_eq!(image.len(), 6);
    }

    #[test]
    fn test_short_literals() {
        let image = parse_image("1\n  101  \n").unwrap();
        assert_eq!(image.bytes, vec![1, 5]);
    }

    #[test]
    fn test_parse_errors_report_line() {
        let err = parse_image("00000001\n\n2\n").unwrap_err();
        assert!(matches!(err, ImageError::ParseError { line: 3, .. }));

        let err = parse_image("100000000\n").unwrap_err();
        assert!(matches!(err, ImageError::ParseError { line: 1, .. }));
    }

    #[test]
    fn test_never_evaluates_input() {
        assert!(parse_image("__import__('os')\n").is_err());
        assert!(parse_image("0b101\n").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = load_image("/definitely/not/here.ls8").unwrap_err();
        assert!(matches!(err, ImageError::NotFound(_)));
    }

    #[test]
    fn test_format_round_trips() {
        let bytes = vec![0x82, 0, 8, 0x47, 0, 1];
        let text = format_image(&bytes);
        assert!(text.contains("# 00: LDI R0,8"));
        assert!(text.contains("# 05: HLT"));
        assert_eq!(parse_image(&text).unwrap().bytes, bytes);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("ls8-image-{}.ls8", std::process::id()));
        let bytes = vec![0x82, 1, 0xFF, 0x01];
        save_image(&path, &bytes).unwrap();
        let image = load_image(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(image.bytes, bytes);
    }
}
