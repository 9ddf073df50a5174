//! Instruction set for the Cairn virtual machine
//!
//! Opcode numbers are part of the host interface and never change. Numbers
//! not listed here are rejected as unknown.

use std::fmt;

use super::value::{Kind, Value};
use crate::vm::{VmError, VmResult};

/// Bytecode operation codes
///
/// Stack-based: most operations pop their inputs and push one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // ===== Stack Operations =====
    /// Push the operand (Null when absent)
    Put = 1,

    /// Pop and discard the top of stack
    Pop = 33,

    // ===== Arithmetic Operations =====
    Add = 2,
    Sub = 3,
    Mul = 4,
    Div = 5,
    Mod = 6,
    Pow = 7,

    /// Negate the top of stack
    Negate = 32,

    // ===== Variables =====
    /// Pop into the named variable
    SetVar = 8,

    /// Push a copy of the named variable
    GetVar = 9,

    /// Remove the named variable
    DelVar = 10,

    // ===== Control Flow =====
    /// Pop; skip the next n instructions if the value is truthy
    SkipIf = 13,

    /// Pop; skip the next n instructions if the value is falsy
    SkipIfNot = 14,

    /// Skip the next n instructions unconditionally
    Skip = 45,

    // ===== Comparison Operations =====
    Neq = 16,
    Eq = 17,
    Gt = 18,
    Ge = 19,
    Lt = 20,
    Le = 21,

    /// Equal canonical renderings (`"3" LEQ 3` holds)
    LooseEq = 22,

    // ===== Logical Operations =====
    And = 23,
    Or = 24,
    Not = 28,

    // ===== Bitwise Operations =====
    BitAnd = 25,
    BitOr = 26,
    BitNot = 27,
    Shl = 29,
    Shr = 30,
    Xor = 31,

    // ===== Collections =====
    /// Pop n values into an array; the deepest becomes index 0
    CreateArray = 34,

    /// `[container, key]` -> element
    Get = 35,

    /// `[container, key, value]` -> updated container
    Set = 36,

    /// Pop n key/value pairs into a map, deepest pair first
    CreateMap = 37,

    // ===== Type Tests =====
    /// Pop a value and push whether it has the named kind
    Is = 52,

    // ===== In-place Variable Updates =====
    /// `var = var + popped`
    Increase = 53,
    Decrease = 54,
    InplaceMul = 55,
    InplaceDiv = 56,
    InplaceMod = 57,
    InplacePow = 58,
    InplaceAnd = 59,
    InplaceOr = 60,
    InplaceShl = 61,
    InplaceShr = 62,
    InplaceXor = 63,
}

/// What an opcode expects in its operand slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    /// No operand; any operand supplied is ignored
    None,
    /// Any value; absence means Null
    Literal,
    /// A variable name: text, or an integral number used as an id
    Name,
    /// A non-negative element count
    Count,
    /// A signed instruction offset
    Offset,
    /// The name of a [`Kind`]
    KindName,
}

/// Declared stack effect of one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEffect {
    pub pops: usize,
    pub pushes: usize,
}

impl StackEffect {
    const fn new(pops: usize, pushes: usize) -> Self {
        Self { pops, pushes }
    }
}

impl OpCode {
    /// Every opcode, ordered by number
    pub const ALL: [OpCode; 47] = [
        OpCode::Put,
        OpCode::Add,
        OpCode::Sub,
        OpCode::Mul,
        OpCode::Div,
        OpCode::Mod,
        OpCode::Pow,
        OpCode::SetVar,
        OpCode::GetVar,
        OpCode::DelVar,
        OpCode::SkipIf,
        OpCode::SkipIfNot,
        OpCode::Neq,
        OpCode::Eq,
        OpCode::Gt,
        OpCode::Ge,
        OpCode::Lt,
        OpCode::Le,
        OpCode::LooseEq,
        OpCode::And,
        OpCode::Or,
        OpCode::BitAnd,
        OpCode::BitOr,
        OpCode::BitNot,
        OpCode::Not,
        OpCode::Shl,
        OpCode::Shr,
        OpCode::Xor,
        OpCode::Negate,
        OpCode::Pop,
        OpCode::CreateArray,
        OpCode::Get,
        OpCode::Set,
        OpCode::CreateMap,
        OpCode::Skip,
        OpCode::Is,
        OpCode::Increase,
        OpCode::Decrease,
        OpCode::InplaceMul,
        OpCode::InplaceDiv,
        OpCode::InplaceMod,
        OpCode::InplacePow,
        OpCode::InplaceAnd,
        OpCode::InplaceOr,
        OpCode::InplaceShl,
        OpCode::InplaceShr,
        OpCode::InplaceXor,
    ];

    /// Returns the human-readable name of this opcode
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            OpCode::Put => "PUT",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Mod => "MOD",
            OpCode::Pow => "POW",
            OpCode::SetVar => "SETVAR",
            OpCode::GetVar => "GETVAR",
            OpCode::DelVar => "DELVAR",
            OpCode::SkipIf => "SKIPIF",
            OpCode::SkipIfNot => "SKIPIFN",
            OpCode::Neq => "NEQ",
            OpCode::Eq => "EQ",
            OpCode::Gt => "GT",
            OpCode::Ge => "GE",
            OpCode::Lt => "LT",
            OpCode::Le => "LE",
            OpCode::LooseEq => "LEQ",
            OpCode::And => "AND",
            OpCode::Or => "OR",
            OpCode::BitAnd => "B_AND",
            OpCode::BitOr => "B_OR",
            OpCode::BitNot => "B_NOT",
            OpCode::Not => "NOT",
            OpCode::Shl => "LSHIFT",
            OpCode::Shr => "RSHIFT",
            OpCode::Xor => "XOR",
            OpCode::Negate => "NEGATE",
            OpCode::Pop => "POP",
            OpCode::CreateArray => "CREATE_ARR",
            OpCode::Get => "GET",
            OpCode::Set => "SET",
            OpCode::CreateMap => "CREATE_MAP",
            OpCode::Skip => "SKIP",
            OpCode::Is => "IS",
            OpCode::Increase => "INCREASE",
            OpCode::Decrease => "DECREASE",
            OpCode::InplaceMul => "INPLACE_MUL",
            OpCode::InplaceDiv => "INPLACE_DIV",
            OpCode::InplaceMod => "INPLACE_MOD",
            OpCode::InplacePow => "INPLACE_POW",
            OpCode::InplaceAnd => "INPLACE_AND",
            OpCode::InplaceOr => "INPLACE_OR",
            OpCode::InplaceShl => "INPLACE_LSHIFT",
            OpCode::InplaceShr => "INPLACE_RSHIFT",
            OpCode::InplaceXor => "INPLACE_XOR",
        }
    }

    /// Looks up an opcode by mnemonic, ignoring ASCII case
    #[must_use]
    pub fn from_name(name: &str) -> Option<OpCode> {
        Self::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(name))
    }

    /// Returns the opcode number
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Returns what this opcode expects as its operand
    #[must_use]
    pub const fn operand_shape(self) -> OperandShape {
        match self {
            OpCode::Put => OperandShape::Literal,
            OpCode::SetVar
            | OpCode::GetVar
            | OpCode::DelVar
            | OpCode::Increase
            | OpCode::Decrease
            | OpCode::InplaceMul
            | OpCode::InplaceDiv
            | OpCode::InplaceMod
            | OpCode::InplacePow
            | OpCode::InplaceAnd
            | OpCode::InplaceOr
            | OpCode::InplaceShl
            | OpCode::InplaceShr
            | OpCode::InplaceXor => OperandShape::Name,
            OpCode::CreateArray | OpCode::CreateMap => OperandShape::Count,
            OpCode::Skip | OpCode::SkipIf | OpCode::SkipIfNot => OperandShape::Offset,
            OpCode::Is => OperandShape::KindName,
            _ => OperandShape::None,
        }
    }

    /// Returns true if this opcode reads its operand
    #[must_use]
    pub const fn takes_operand(self) -> bool {
        !matches!(self.operand_shape(), OperandShape::None)
    }

    /// Returns true for the skip family
    #[must_use]
    pub const fn is_skip(self) -> bool {
        matches!(self.operand_shape(), OperandShape::Offset)
    }

    /// Returns the binary operation an in-place opcode applies
    #[must_use]
    pub const fn inplace_base(self) -> Option<OpCode> {
        match self {
            OpCode::Increase => Some(OpCode::Add),
            OpCode::Decrease => Some(OpCode::Sub),
            OpCode::InplaceMul => Some(OpCode::Mul),
            OpCode::InplaceDiv => Some(OpCode::Div),
            OpCode::InplaceMod => Some(OpCode::Mod),
            OpCode::InplacePow => Some(OpCode::Pow),
            OpCode::InplaceAnd => Some(OpCode::BitAnd),
            OpCode::InplaceOr => Some(OpCode::BitOr),
            OpCode::InplaceShl => Some(OpCode::Shl),
            OpCode::InplaceShr => Some(OpCode::Shr),
            OpCode::InplaceXor => Some(OpCode::Xor),
            _ => None,
        }
    }

    /// Checks that `operand` fits this opcode's operand shape
    pub fn check_operand(self, operand: Option<&Value>) -> VmResult<()> {
        match self.operand_shape() {
            OperandShape::None | OperandShape::Literal => Ok(()),
            OperandShape::Name => self.name_operand(operand).map(drop),
            OperandShape::Count => self.count_operand(operand).map(drop),
            OperandShape::Offset => self.offset_operand(operand).map(drop),
            OperandShape::KindName => self.kind_operand(operand).map(drop),
        }
    }

    /// Returns the declared stack effect for this opcode and operand
    pub fn stack_effect(self, operand: Option<&Value>) -> VmResult<StackEffect> {
        let effect = match self {
            OpCode::Put | OpCode::GetVar => StackEffect::new(0, 1),
            OpCode::DelVar | OpCode::Skip => StackEffect::new(0, 0),
            OpCode::Pop | OpCode::SkipIf | OpCode::SkipIfNot | OpCode::SetVar => {
                StackEffect::new(1, 0)
            }
            OpCode::Negate | OpCode::Not | OpCode::BitNot | OpCode::Is => StackEffect::new(1, 1),
            OpCode::Set => StackEffect::new(3, 1),
            OpCode::CreateArray => StackEffect::new(self.count_operand(operand)?, 1),
            OpCode::CreateMap => {
                StackEffect::new(self.count_operand(operand)?.saturating_mul(2), 1)
            }
            op if op.inplace_base().is_some() => StackEffect::new(1, 0),
            _ => StackEffect::new(2, 1),
        };
        Ok(effect)
    }

    // ===== Operand decoding =====

    /// Decodes a variable name operand
    ///
    /// Integral numbers are accepted as ids and keyed by their rendering.
    pub fn name_operand(self, operand: Option<&Value>) -> VmResult<String> {
        match operand {
            Some(Value::Text(name)) => Ok(name.to_string()),
            Some(value) => value
                .as_integer()
                .map(|id| id.to_string())
                .ok_or_else(|| self.operand_mismatch("variable name", operand)),
            None => Err(self.operand_mismatch("variable name", None)),
        }
    }

    /// Decodes an element count operand
    pub fn count_operand(self, operand: Option<&Value>) -> VmResult<usize> {
        operand
            .and_then(Value::as_integer)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| self.operand_mismatch("non-negative count", operand))
    }

    /// Decodes a skip offset operand
    pub fn offset_operand(self, operand: Option<&Value>) -> VmResult<i64> {
        operand
            .and_then(Value::as_integer)
            .ok_or_else(|| self.operand_mismatch("integral offset", operand))
    }

    /// Decodes a kind name operand
    pub fn kind_operand(self, operand: Option<&Value>) -> VmResult<Kind> {
        operand
            .and_then(Value::as_text)
            .and_then(Kind::from_name)
            .ok_or_else(|| self.operand_mismatch("kind name", operand))
    }

    fn operand_mismatch(self, expected: &'static str, operand: Option<&Value>) -> VmError {
        VmError::TypeMismatch {
            expected,
            got: operand.map_or("no operand", Value::type_name),
            operation: self.name(),
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|op| op.code() == value)
            .ok_or(value)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
