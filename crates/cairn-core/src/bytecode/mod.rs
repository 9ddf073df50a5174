//! Bytecode module for the Cairn virtual machine
//!
//! This module provides:
//! - `OpCode`: The instruction set
//! - `Value`: Runtime value representation
//! - `BigNumber`: Exact decimal numbers
//! - `Program`: A sequence of instructions
//! - Disassembler utilities for debugging

mod debug;
mod number;
mod opcode;
mod program;
mod value;

pub use debug::{describe, describe_operand, disassemble, disassemble_program};
pub use number::{BigNumber, ParseNumberError};
pub use opcode::{OpCode, OperandShape, StackEffect};
pub use program::{Instruction, Program};
pub use value::{Kind, Value};
