//! Assembler for the textual instruction listing
//!
//! One instruction per line: a mnemonic, then at most one operand literal.
//! `;` starts a comment.
//!
//! ```text
//! PUT 7s          ; SmallNumber
//! PUT 0.5         ; Number
//! PUT 1e40n       ; BigNumber
//! PUT "a\tb"      ; Text
//! SETVAR total    ; bare identifiers are Text
//! ```

mod token;

pub use token::TokenKind;

use logos::Logos;
use thiserror::Error;

use crate::bytecode::{Instruction, OpCode, OperandShape, Program, Value};

/// A listing that could not be assembled
#[derive(Error, Debug, Clone, PartialEq)]
#[error("line {line}: {message}")]
pub struct AsmError {
    /// 1-based line number
    pub line: u32,
    pub message: String,
}

impl AsmError {
    fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Assemble a whole listing
pub fn assemble(source: &str) -> Result<Program, AsmError> {
    let mut program = Program::new();
    for (index, text) in source.lines().enumerate() {
        let line = u32::try_from(index + 1).unwrap_or(u32::MAX);
        if let Some(instruction) = parse_line(text, line)? {
            program.push(instruction);
        }
    }
    Ok(program)
}

/// Assemble a listing and record where it came from
pub fn assemble_named(source: &str, name: impl Into<String>) -> Result<Program, AsmError> {
    let mut program = assemble(source)?;
    program.source_name = Some(name.into());
    Ok(program)
}

/// Parse one listing line; blank and comment-only lines yield `None`
pub fn parse_line(text: &str, line: u32) -> Result<Option<Instruction>, AsmError> {
    let mut lexer = TokenKind::lexer(text);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next() {
        let kind = token
            .map_err(|()| AsmError::new(line, format!("unexpected input '{}'", lexer.slice())))?;
        tokens.push((kind, lexer.slice()));
    }

    let mut tokens = tokens.into_iter();
    let Some((kind, mnemonic)) = tokens.next() else {
        return Ok(None);
    };
    if kind != TokenKind::Ident {
        return Err(AsmError::new(
            line,
            format!("expected a mnemonic, found '{mnemonic}'"),
        ));
    }
    let op = OpCode::from_name(mnemonic)
        .ok_or_else(|| AsmError::new(line, format!("unknown mnemonic '{mnemonic}'")))?;

    let operand = tokens
        .next()
        .map(|(kind, slice)| match (op.operand_shape(), kind) {
            // `IS null` names a kind, not a literal
            (OperandShape::KindName, TokenKind::Null | TokenKind::True | TokenKind::False) => {
                Ok(Value::from(slice))
            }
            _ => literal(kind, slice),
        })
        .transpose()
        .map_err(|message| AsmError::new(line, message))?;
    if let Some((_, extra)) = tokens.next() {
        return Err(AsmError::new(line, format!("unexpected '{extra}' after operand")));
    }

    if op.takes_operand() {
        op.check_operand(operand.as_ref())
            .map_err(|err| AsmError::new(line, err.to_string()))?;
    } else if operand.is_some() {
        return Err(AsmError::new(line, format!("{op} takes no operand")));
    }

    Ok(Some(Instruction::new(op, operand).at_line(line)))
}

fn literal(kind: TokenKind, slice: &str) -> Result<Value, String> {
    match kind {
        TokenKind::Null => Ok(Value::Null),
        TokenKind::True => Ok(Value::True),
        TokenKind::False => Ok(Value::False),
        TokenKind::Number => slice
            .parse::<f64>()
            .map(Value::Number)
            .map_err(|e| format!("invalid number '{slice}': {e}")),
        TokenKind::Small => {
            let digits = &slice[..slice.len() - 1];
            digits
                .parse::<i32>()
                .map(Value::SmallNumber)
                .map_err(|_| format!("small number '{slice}' does not fit in 32 bits"))
        }
        TokenKind::Big => Value::big(&slice[..slice.len() - 1]).map_err(|e| e.to_string()),
        TokenKind::Text => unescape(&slice[1..slice.len() - 1]).map(Value::from),
        TokenKind::Ident => Ok(Value::from(slice)),
    }
}

fn unescape(body: &str) -> Result<String, String> {
    let mut text = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            text.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => text.push('\n'),
            Some('t') => text.push('\t'),
            Some('"') => text.push('"'),
            Some('\\') => text.push('\\'),
            Some(other) => return Err(format!("invalid escape sequence: \\{other}")),
            None => return Err("unterminated escape sequence".to_string()),
        }
    }
    Ok(text)
}
