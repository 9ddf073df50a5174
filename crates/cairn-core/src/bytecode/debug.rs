//! Bytecode disassembler
//!
//! Renders instructions without executing them. Operands are checked the way
//! the dispatcher checks them, so an instruction disassembles cleanly exactly
//! when its operand would be accepted.

use std::fmt::Write;

use super::opcode::OpCode;
use super::program::{Instruction, Program};
use super::value::{Kind, Value};
use crate::vm::{VmError, VmResult};

/// Describe one instruction as a Text value
///
/// Operand-taking opcodes render the operand's kind followed by its canonical
/// rendering (`PUT number 3.5`, `SETVAR text "x"`); a missing `PUT` operand
/// renders as `PUT null`. Operands of pure stack opcodes are ignored.
pub fn disassemble(opcode: u8, operand: Option<&Value>) -> VmResult<Value> {
    describe(opcode, operand).map(Value::from)
}

/// Describe one instruction as a string
pub fn describe(opcode: u8, operand: Option<&Value>) -> VmResult<String> {
    let op = OpCode::try_from(opcode).map_err(VmError::UnknownOpcode)?;
    if !op.takes_operand() {
        return Ok(op.name().to_string());
    }
    op.check_operand(operand)?;
    let operand = operand.unwrap_or(&Value::Null);
    Ok(format!("{} {}", op.name(), describe_operand(operand)))
}

/// Render an operand as `<kind> <rendering>`
#[must_use]
pub fn describe_operand(operand: &Value) -> String {
    match operand {
        Value::Null | Value::True | Value::False => operand.to_string(),
        Value::Text(s) => format!("text \"{s}\""),
        other => format!("{} {other}", kind_label(other.kind())),
    }
}

fn kind_label(kind: Kind) -> &'static str {
    match kind {
        Kind::Null => "null",
        Kind::True => "true",
        Kind::False => "false",
        Kind::Number => "number",
        Kind::BigNumber => "big",
        Kind::Text => "text",
        Kind::Array => "array",
        Kind::Map => "map",
        Kind::SmallNumber => "small",
    }
}

/// Disassemble a program to a string
pub fn disassemble_program(program: &Program, name: &str) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "== {name} ==");

    let instructions = program.instructions();
    for (offset, instruction) in instructions.iter().enumerate() {
        let _ = write!(output, "{offset:04} ");

        // Line number, or | when unchanged
        let previous = offset.checked_sub(1).and_then(|i| instructions.get(i));
        match previous {
            Some(prev) if prev.line == instruction.line => {
                let _ = write!(output, "   | ");
            }
            _ => {
                let _ = write!(output, "{:4} ", instruction.line);
            }
        }

        let _ = writeln!(output, "{}", render_listed(instruction));
    }

    output
}

fn render_listed(instruction: &Instruction) -> String {
    match describe(instruction.opcode, instruction.operand.as_ref()) {
        Ok(text) => text,
        Err(VmError::UnknownOpcode(code)) => format!("Unknown opcode {code}"),
        Err(err) => match OpCode::try_from(instruction.opcode) {
            Ok(op) => format!("{:16} ; {err}", op.name()),
            Err(code) => format!("Unknown opcode {code}"),
        },
    }
}
