//! Machine configuration.
//!
//! Defaults describe the full LS-8. A JSON file can override any field:
//!
//! ```json
//! { "memory_size": 32, "cmp_mode": "legacy", "max_cycles": 100000 }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cpu::alu::CmpMode;
use crate::cpu::memory::MEMORY_SIZE;

/// Largest memory a byte-wide stack pointer and PC can address.
pub const MAX_MEMORY_SIZE: usize = 256;

/// Parameters for building a [`crate::Cpu`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MachineConfig {
    /// Number of memory cells (1-256).
    pub memory_size: usize,
    /// How CMP fills the flags register.
    pub cmp_mode: CmpMode,
    /// Stop after this many instructions. `None` runs until HLT.
    pub max_cycles: Option<u64>,
}

impl MachineConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_json_str(&text)
    }

    /// Check that the configuration describes a buildable machine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_size == 0 || self.memory_size > MAX_MEMORY_SIZE {
            return Err(ConfigError::MemorySize(self.memory_size));
        }
        Ok(())
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_size: MEMORY_SIZE,
            cmp_mode: CmpMode::default(),
            max_cycles: None,
        }
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("invalid config: {0}")]
    Parse(String),

    #[error("memory size {0} out of range (1-256)")]
    MemorySize(usize),
}
