//! Engine configuration
//!
//! ```toml
//! max_stack_depth = 4096
//! div_scale = 16
//! max_steps = 0        # 0 = unlimited
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Default maximum value stack size
pub const DEFAULT_MAX_STACK: usize = 65536;

/// Default number of fractional digits kept by big number division
pub const DEFAULT_DIV_SCALE: u32 = 32;

/// Default instruction budget for one program run
pub const DEFAULT_MAX_STEPS: u64 = 10_000_000;

/// Errors that can occur when loading a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Limits applied to every VM instance
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmConfig {
    /// Largest number of values a stack may hold
    pub max_stack_depth: usize,

    /// Fractional digits kept when dividing big numbers
    pub div_scale: u32,

    /// Instructions a single program run may execute, 0 for no limit
    pub max_steps: u64,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_stack_depth: DEFAULT_MAX_STACK,
            div_scale: DEFAULT_DIV_SCALE,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl VmConfig {
    /// Load a configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from a TOML string.
    ///
    /// Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_stack_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "max_stack_depth",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Returns the step budget, if any
    #[must_use]
    pub fn step_limit(&self) -> Option<u64> {
        (self.max_steps > 0).then_some(self.max_steps)
    }
}
