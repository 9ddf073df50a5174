//! Runtime errors for the Cairn virtual machine

use std::fmt;

use thiserror::Error;

use super::registry::Handle;
use crate::bytecode::{ParseNumberError, Value};

/// Result type for VM operations
pub type VmResult<T> = Result<T, VmError>;

/// An error raised while executing or inspecting a VM
///
/// Every variant is recoverable: the dispatcher checks an instruction before
/// touching the stack, so a failed instruction leaves the instance as it was.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VmError {
    #[error(transparent)]
    Parse(#[from] ParseNumberError),

    #[error("type error: {operation} expected {expected}, got {got}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
        operation: &'static str,
    },

    #[error("stack underflow: needed {needed} values but the stack holds {depth}")]
    StackUnderflow { needed: usize, depth: usize },

    #[error("index {index} out of range for length {length}")]
    IndexOutOfRange { index: i64, length: usize },

    #[error("unknown opcode: {0}")]
    UnknownOpcode(u8),

    #[error("division by zero")]
    DivisionByZero,

    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("stack overflow: limit is {limit} values")]
    StackOverflow { limit: usize },

    #[error("cannot skip {offset} instructions here")]
    InvalidSkip { offset: i64 },

    #[error("step limit of {limit} instructions exceeded")]
    StepLimitExceeded { limit: u64 },

    #[error("no live VM for handle {0}")]
    InvalidHandle(Handle),

    #[error("registry is full: {live} instances are live")]
    RegistryFull { live: usize },
}

impl VmError {
    /// Build a type mismatch naming the kind of the offending value
    pub fn type_mismatch(expected: &'static str, got: &Value, operation: &'static str) -> Self {
        VmError::TypeMismatch {
            expected,
            got: got.type_name(),
            operation,
        }
    }
}

/// A runtime error raised inside a program, with its location
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramError {
    /// The underlying error
    pub error: VmError,
    /// Index of the failing instruction
    pub index: usize,
    /// Listing line of the failing instruction, 0 when unknown
    pub line: u32,
}

impl fmt::Display for ProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (instruction {}", self.error, self.index)?;
        if self.line > 0 {
            write!(f, ", line {}", self.line)?;
        }
        write!(f, ")")
    }
}

impl std::error::Error for ProgramError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = VmError::type_mismatch("numeric", &Value::text("x"), "ADD");
        assert_eq!(err.to_string(), "type error: ADD expected numeric, got Text");

        let err = VmError::StackUnderflow { needed: 2, depth: 1 };
        assert_eq!(
            err.to_string(),
            "stack underflow: needed 2 values but the stack holds 1"
        );
    }

    #[test]
    fn test_parse_error_converts() {
        let parse = "1.2.3".parse::<crate::bytecode::BigNumber>().unwrap_err();
        let err: VmError = parse.into();
        assert!(matches!(err, VmError::Parse(_)));
        assert!(err.to_string().contains("1.2.3"));
    }

    #[test]
    fn test_program_error_display() {
        let err = ProgramError {
            error: VmError::DivisionByZero,
            index: 3,
            line: 7,
        };
        assert_eq!(err.to_string(), "division by zero (instruction 3, line 7)");
    }
}
