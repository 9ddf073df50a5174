//! Cairn Core - a stack-based bytecode virtual machine
//!
//! This crate provides:
//! - Bytecode: the value model, instruction set and disassembler
//! - VM: instruction dispatch, VM instances and the handle registry
//! - Host: handle-based entry points for embedding
//! - Asm: the textual instruction listing format

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bytecode module - values, instruction set and disassembler
pub mod bytecode;

/// Virtual Machine module - bytecode execution
pub mod vm;

/// Handle-based host interface
pub mod host;

/// Listing assembler
pub mod asm;

/// Convenience re-export of the value model
pub use bytecode::{BigNumber, Kind, OpCode, Value};

/// Convenience re-export of VM types
pub use vm::{Handle, Registry, Vm, VmConfig, VmError, VmResult};

/// Convenience re-export of the assembler
pub use asm::{assemble, AsmError};
