//! Runtime values for the Cairn virtual machine

use std::fmt;
use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use super::number::{BigNumber, ParseNumberError};
use crate::vm::{VmError, VmResult};

/// Kind tag of a [`Value`], with the stable codes reported to hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    Null = 0,
    True = 1,
    False = 2,
    Number = 3,
    BigNumber = 4,
    Text = 5,
    Array = 6,
    Map = 7,
    SmallNumber = 8,
}

impl Kind {
    /// Every kind, ordered by code
    pub const ALL: [Kind; 9] = [
        Kind::Null,
        Kind::True,
        Kind::False,
        Kind::Number,
        Kind::BigNumber,
        Kind::Text,
        Kind::Array,
        Kind::Map,
        Kind::SmallNumber,
    ];

    /// Returns the numeric code of this kind
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Returns the name of this kind (for error messages and `IS`)
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Kind::Null => "Null",
            Kind::True => "True",
            Kind::False => "False",
            Kind::Number => "Number",
            Kind::BigNumber => "BigNumber",
            Kind::Text => "Text",
            Kind::Array => "Array",
            Kind::Map => "Map",
            Kind::SmallNumber => "SmallNumber",
        }
    }

    /// Looks up a kind by name, ignoring ASCII case
    #[must_use]
    pub fn from_name(name: &str) -> Option<Kind> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }
}

impl TryFrom<u8> for Kind {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL.get(usize::from(code)).copied().ok_or(code)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamically tagged runtime value
///
/// Containers own their elements outright, so a `Value` is a tree and can be
/// moved between threads.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    True,
    False,
    /// IEEE-754 double
    Number(f64),
    /// Exact decimal of arbitrary precision
    BigNumber(Box<BigNumber>),
    /// Immutable string
    Text(Arc<str>),
    /// Ordered sequence
    Array(Vec<Value>),
    /// Ordered key/value pairs; keys may repeat
    Map(Vec<(Value, Value)>),
    /// Integer fast path, distinct from `Number` even when numerically equal
    SmallNumber(i32),
}

impl Value {
    // ===== Constructors =====

    /// Create a text value
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Value::Text(Arc::from(text.into()))
    }

    /// Create a big number by parsing its canonical decimal text
    pub fn big(text: &str) -> Result<Self, ParseNumberError> {
        Ok(Value::BigNumber(Box::new(text.parse()?)))
    }

    /// Create an array value
    #[must_use]
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(items)
    }

    /// Create a map value from ordered pairs
    #[must_use]
    pub fn map(pairs: Vec<(Value, Value)>) -> Self {
        Value::Map(pairs)
    }

    /// Create a small number from a double
    ///
    /// The double must be integral and within the `i32` range.
    pub fn small_from_f64(value: f64) -> VmResult<Self> {
        if value.fract() == 0.0 && value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX) {
            Ok(Value::SmallNumber(value as i32))
        } else {
            Err(VmError::TypeMismatch {
                expected: "integral number within SmallNumber range",
                got: "Number",
                operation: "small number",
            })
        }
    }

    // ===== Inspection =====

    /// Returns the kind of this value
    #[must_use]
    pub const fn kind(&self) -> Kind {
        match self {
            Value::Null => Kind::Null,
            Value::True => Kind::True,
            Value::False => Kind::False,
            Value::Number(_) => Kind::Number,
            Value::BigNumber(_) => Kind::BigNumber,
            Value::Text(_) => Kind::Text,
            Value::Array(_) => Kind::Array,
            Value::Map(_) => Kind::Map,
            Value::SmallNumber(_) => Kind::SmallNumber,
        }
    }

    /// Returns the type name of this value (for error messages)
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Returns true if this value is truthy
    #[must_use]
    pub const fn is_truthy(&self) -> bool {
        // Zero, empty text and empty containers are truthy
        !matches!(self, Value::Null | Value::False)
    }

    /// Returns true if this value is null
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true for the three numeric kinds
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Value::Number(_) | Value::SmallNumber(_) | Value::BigNumber(_))
    }

    /// Returns the text content, if this is a text value
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an `i64` when it is numeric and integral
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::SmallNumber(n) => Some(i64::from(*n)),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.223_372_036_854_776e18 => {
                Some(*n as i64)
            }
            Value::BigNumber(b) => b.to_integer().and_then(|i| i.to_i64()),
            _ => None,
        }
    }

    /// Returns the value as an arbitrary-precision integer when it is integral
    #[must_use]
    pub fn as_big_integer(&self) -> Option<BigInt> {
        match self {
            Value::SmallNumber(n) => Some(BigInt::from(*n)),
            Value::Number(n) => BigNumber::from_f64(*n).and_then(|b| b.to_integer()),
            Value::BigNumber(b) => b.to_integer(),
            _ => None,
        }
    }

    /// Converts a numeric value to a double
    ///
    /// Big numbers yield the closest double.
    pub fn to_f64(&self) -> VmResult<f64> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::SmallNumber(n) => Ok(f64::from(*n)),
            Value::BigNumber(b) => Ok(b.to_f64()),
            other => Err(VmError::type_mismatch("numeric", other, "to double")),
        }
    }

    /// Converts a numeric value to a big number
    ///
    /// Non-finite doubles have no decimal form and are rejected.
    pub fn to_big(&self) -> VmResult<BigNumber> {
        match self {
            Value::SmallNumber(n) => Ok(BigNumber::from(*n)),
            Value::Number(n) => BigNumber::from_f64(*n).ok_or(VmError::TypeMismatch {
                expected: "finite number",
                got: "Number",
                operation: "big number promotion",
            }),
            Value::BigNumber(b) => Ok((**b).clone()),
            other => Err(VmError::type_mismatch("numeric", other, "big number promotion")),
        }
    }

    // ===== Positional access =====

    /// Returns the element count of an array or the pair count of a map
    pub fn len(&self) -> VmResult<usize> {
        match self {
            Value::Array(items) => Ok(items.len()),
            Value::Map(pairs) => Ok(pairs.len()),
            other => Err(VmError::type_mismatch("Array or Map", other, "length")),
        }
    }

    /// Returns true for an empty array or map
    pub fn is_empty(&self) -> VmResult<bool> {
        self.len().map(|len| len == 0)
    }

    /// Returns the array element at `index`
    pub fn at(&self, index: usize) -> VmResult<&Value> {
        match self {
            Value::Array(items) => items.get(index).ok_or_else(|| out_of_range(index, items.len())),
            other => Err(VmError::type_mismatch("Array", other, "element access")),
        }
    }

    /// Returns the key of the map pair at `index`
    pub fn key_at(&self, index: usize) -> VmResult<&Value> {
        self.pair_at(index, "key access").map(|(key, _)| key)
    }

    /// Returns the value of the map pair at `index`
    pub fn value_at(&self, index: usize) -> VmResult<&Value> {
        self.pair_at(index, "value access").map(|(_, value)| value)
    }

    fn pair_at(&self, index: usize, operation: &'static str) -> VmResult<&(Value, Value)> {
        match self {
            Value::Map(pairs) => pairs.get(index).ok_or_else(|| out_of_range(index, pairs.len())),
            other => Err(VmError::type_mismatch("Map", other, operation)),
        }
    }

    // ===== Equality =====

    /// Value equality where numbers compare by magnitude across kinds
    ///
    /// `SmallNumber(1)`, `Number(1.0)` and the big number `1` are all the
    /// same value. Containers compare element by element.
    #[must_use]
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::SmallNumber(a), Value::SmallNumber(b)) => a == b,
            (Value::BigNumber(_), _) | (_, Value::BigNumber(_))
                if self.is_numeric() && other.is_numeric() =>
            {
                match (self.to_big(), other.to_big()) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => false,
                }
            }
            (Value::Number(_) | Value::SmallNumber(_), Value::Number(_) | Value::SmallNumber(_)) => {
                matches!((self.to_f64(), other.to_f64()), (Ok(a), Ok(b)) if a == b)
            }
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_value(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka.same_value(kb) && va.same_value(vb))
            }
            (Value::Null, Value::Null) | (Value::True, Value::True) | (Value::False, Value::False) => {
                true
            }
            _ => false,
        }
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s:?}"),
            other => write!(f, "{other}"),
        }
    }
}

fn out_of_range(index: usize, length: usize) -> VmError {
    VmError::IndexOutOfRange {
        index: i64::try_from(index).unwrap_or(i64::MAX),
        length,
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        if b {
            Value::True
        } else {
            Value::False
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::SmallNumber(n)
    }
}

impl From<BigNumber> for Value {
    fn from(n: BigNumber) -> Self {
        Value::BigNumber(Box::new(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::text(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl PartialEq for Value {
    /// Structural equality: kinds must match, so `SmallNumber(1) != Number(1.0)`
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null)
            | (Value::True, Value::True)
            | (Value::False, Value::False) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::SmallNumber(a), Value::SmallNumber(b)) => a == b,
            (Value::BigNumber(a), Value::BigNumber(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::True => write!(f, "true"),
            Value::False => write!(f, "false"),
            Value::Number(n) => write!(f, "{n:?}"),
            Value::SmallNumber(n) => write!(f, "{n}s"),
            Value::BigNumber(b) => write!(f, "{b:?}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Array(items) => f.debug_list().entries(items).finish(),
            Value::Map(pairs) => f
                .debug_map()
                .entries(pairs.iter().map(|(k, v)| (k, v)))
                .finish(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::True => write!(f, "true"),
            Value::False => write!(f, "false"),
            Value::Number(n) => write!(f, "{n}"),
            Value::SmallNumber(n) => write!(f, "{n}"),
            Value::BigNumber(b) => write!(f, "{b}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.fmt_nested(f)?;
                }
                write!(f, "]")
            }
            Value::Map(pairs) => {
                write!(f, "{{")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    key.fmt_nested(f)?;
                    write!(f, ": ")?;
                    value.fmt_nested(f)?;
                }
                write!(f, "}}")
            }
        }
    }
}
