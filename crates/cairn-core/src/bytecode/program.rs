//! Programs - ordered instruction sequences with source line info

use super::opcode::OpCode;
use super::value::Value;

/// One instruction: a raw opcode number and an optional operand
///
/// The opcode is kept raw so that programs can carry numbers the VM will
/// reject at execution time, exactly as a host could send them.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: u8,
    pub operand: Option<Value>,
    /// Listing line, 0 when the instruction was built in code
    pub line: u32,
}

impl Instruction {
    /// Create an instruction from a known opcode
    #[must_use]
    pub fn new(opcode: OpCode, operand: Option<Value>) -> Self {
        Self {
            opcode: opcode.code(),
            operand,
            line: 0,
        }
    }

    /// Create an instruction from a raw opcode number
    #[must_use]
    pub fn raw(opcode: u8, operand: Option<Value>) -> Self {
        Self {
            opcode,
            operand,
            line: 0,
        }
    }

    /// Set the listing line
    #[must_use]
    pub fn at_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }
}

/// A sequence of instructions run by [`crate::vm::Vm::run_program`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    instructions: Vec<Instruction>,

    /// Source file name (for listings and error messages)
    pub source_name: Option<String>,
}

impl Program {
    /// Create a new empty program
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new program with a source name
    #[must_use]
    pub fn with_source(source_name: impl Into<String>) -> Self {
        Self {
            instructions: Vec::new(),
            source_name: Some(source_name.into()),
        }
    }

    /// Returns the number of instructions
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if the program is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Returns the instructions
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Get an instruction by index
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// Append an instruction, returning its index
    pub fn push(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    /// Append an opcode without an operand
    pub fn write_op(&mut self, opcode: OpCode, line: u32) -> usize {
        self.push(Instruction::new(opcode, None).at_line(line))
    }

    /// Append an opcode with an operand
    pub fn write_op_with(&mut self, opcode: OpCode, operand: impl Into<Value>, line: u32) -> usize {
        self.push(Instruction::new(opcode, Some(operand.into())).at_line(line))
    }

    /// Replace the operand of a previously written instruction
    ///
    /// Used to fill in skip offsets once the skipped block is known.
    pub fn patch_operand(&mut self, index: usize, operand: impl Into<Value>) -> bool {
        match self.instructions.get_mut(index) {
            Some(instruction) => {
                instruction.operand = Some(operand.into());
                true
            }
            None => false,
        }
    }
}

impl FromIterator<Instruction> for Program {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        Self {
            instructions: iter.into_iter().collect(),
            source_name: None,
        }
    }
}
