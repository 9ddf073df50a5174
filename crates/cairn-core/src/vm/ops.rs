//! Value operations behind the arithmetic, comparison, bitwise and
//! collection opcodes
//!
//! Every function here reads its inputs by reference and returns a fresh
//! value, so the dispatcher can fail without having touched the stack.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use super::error::{VmError, VmResult};
use crate::bytecode::{BigNumber, OpCode, Value};

/// Largest exponent accepted by big number `POW`
pub const MAX_BIG_EXPONENT: u32 = 4096;

/// Largest shift applied to a big number
pub const MAX_BIG_SHIFT: usize = 4096;

/// Shift amounts for 64-bit integers must stay below this
const WORD_BITS: u32 = 64;

// ===== Numeric tower =====

/// Both operands after promotion to a common representation
enum Numeric {
    Small(i32, i32),
    Float(f64, f64),
    Big(BigNumber, BigNumber),
}

fn numeric_pair(op: OpCode, left: &Value, right: &Value) -> VmResult<Numeric> {
    for operand in [left, right] {
        if !operand.is_numeric() {
            return Err(VmError::type_mismatch("numeric", operand, op.name()));
        }
    }
    Ok(match (left, right) {
        (Value::SmallNumber(a), Value::SmallNumber(b)) => Numeric::Small(*a, *b),
        (Value::BigNumber(_), _) | (_, Value::BigNumber(_)) => {
            Numeric::Big(promote(op, left)?, promote(op, right)?)
        }
        _ => Numeric::Float(left.to_f64()?, right.to_f64()?),
    })
}

fn promote(op: OpCode, value: &Value) -> VmResult<BigNumber> {
    value.to_big().map_err(|_| VmError::TypeMismatch {
        expected: "finite number",
        got: value.type_name(),
        operation: op.name(),
    })
}

fn small_or_float(result: Option<i32>, fallback: f64) -> Value {
    result.map_or(Value::Number(fallback), Value::SmallNumber)
}

/// Apply a binary opcode to two operands
pub fn binary(op: OpCode, left: &Value, right: &Value, div_scale: u32) -> VmResult<Value> {
    match op {
        OpCode::Add => add(left, right),
        OpCode::Sub => {
            arithmetic(op, left, right, i32::checked_sub, |a, b| a - b, |a, b| Some(a.sub(b)))
        }
        OpCode::Mul => {
            arithmetic(op, left, right, i32::checked_mul, |a, b| a * b, BigNumber::checked_mul)
        }
        OpCode::Div => divide(left, right, div_scale),
        OpCode::Mod => remainder(left, right),
        OpCode::Pow => power(left, right),
        OpCode::Eq => Ok(Value::from(left.same_value(right))),
        OpCode::Neq => Ok(Value::from(!left.same_value(right))),
        OpCode::LooseEq => Ok(Value::from(left.to_string() == right.to_string())),
        OpCode::Gt | OpCode::Ge | OpCode::Lt | OpCode::Le => compare(op, left, right),
        OpCode::And => Ok(Value::from(left.is_truthy() && right.is_truthy())),
        OpCode::Or => Ok(Value::from(left.is_truthy() || right.is_truthy())),
        OpCode::BitAnd | OpCode::BitOr | OpCode::Xor => bitwise(op, left, right),
        OpCode::Shl | OpCode::Shr => shift(op, left, right),
        other => Err(VmError::UnknownOpcode(other.code())),
    }
}

fn add(left: &Value, right: &Value) -> VmResult<Value> {
    // Text on either side concatenates renderings
    if matches!(left, Value::Text(_)) || matches!(right, Value::Text(_)) {
        return Ok(Value::text(format!("{left}{right}")));
    }
    arithmetic(OpCode::Add, left, right, i32::checked_add, |a, b| a + b, |a, b| Some(a.add(b)))
}

/// A big number result whose decimal scale no longer fits
fn beyond_precision(op: OpCode, right: &Value) -> VmError {
    VmError::TypeMismatch {
        expected: "operand within precision limits",
        got: right.type_name(),
        operation: op.name(),
    }
}

fn arithmetic(
    op: OpCode,
    left: &Value,
    right: &Value,
    small_op: fn(i32, i32) -> Option<i32>,
    float_op: fn(f64, f64) -> f64,
    big_op: fn(&BigNumber, &BigNumber) -> Option<BigNumber>,
) -> VmResult<Value> {
    Ok(match numeric_pair(op, left, right)? {
        Numeric::Small(a, b) => small_or_float(small_op(a, b), float_op(f64::from(a), f64::from(b))),
        Numeric::Float(a, b) => Value::Number(float_op(a, b)),
        Numeric::Big(a, b) => Value::from(big_op(&a, &b).ok_or_else(|| beyond_precision(op, right))?),
    })
}

fn divide(left: &Value, right: &Value, div_scale: u32) -> VmResult<Value> {
    match numeric_pair(OpCode::Div, left, right)? {
        Numeric::Small(_, 0) => Err(VmError::DivisionByZero),
        Numeric::Small(a, b) => {
            let quotient = f64::from(a) / f64::from(b);
            // Exact quotients stay small
            Ok(match a.checked_rem(b) {
                Some(0) => small_or_float(a.checked_div(b), quotient),
                _ => Value::Number(quotient),
            })
        }
        Numeric::Float(_, b) if b == 0.0 => Err(VmError::DivisionByZero),
        Numeric::Float(a, b) => Ok(Value::Number(a / b)),
        Numeric::Big(a, b) => a
            .checked_div(&b, div_scale)
            .map(Value::from)
            .ok_or(VmError::DivisionByZero),
    }
}

fn remainder(left: &Value, right: &Value) -> VmResult<Value> {
    match numeric_pair(OpCode::Mod, left, right)? {
        Numeric::Small(_, 0) => Err(VmError::DivisionByZero),
        // i32::MIN % -1 overflows but is mathematically zero
        Numeric::Small(a, b) => Ok(Value::SmallNumber(a.checked_rem(b).unwrap_or(0))),
        Numeric::Float(_, b) if b == 0.0 => Err(VmError::DivisionByZero),
        Numeric::Float(a, b) => Ok(Value::Number(a % b)),
        Numeric::Big(a, b) => a.checked_rem(&b).map(Value::from).ok_or(VmError::DivisionByZero),
    }
}

fn power(left: &Value, right: &Value) -> VmResult<Value> {
    Ok(match numeric_pair(OpCode::Pow, left, right)? {
        Numeric::Small(a, b) => {
            let fallback = f64::from(a).powf(f64::from(b));
            let exact = u32::try_from(b).ok().and_then(|e| a.checked_pow(e));
            small_or_float(exact, fallback)
        }
        Numeric::Float(a, b) => Value::Number(a.powf(b)),
        Numeric::Big(a, b) => {
            let exponent = b
                .to_integer()
                .and_then(|e| e.to_u32())
                .filter(|e| *e <= MAX_BIG_EXPONENT)
                .ok_or(VmError::TypeMismatch {
                    expected: "integral exponent in 0..=4096",
                    got: right.type_name(),
                    operation: "POW",
                })?;
            Value::from(
                a.checked_pow(exponent)
                    .ok_or_else(|| beyond_precision(OpCode::Pow, right))?,
            )
        }
    })
}

fn compare(op: OpCode, left: &Value, right: &Value) -> VmResult<Value> {
    let ordering = match (left, right) {
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        _ => match numeric_pair(op, left, right)? {
            Numeric::Small(a, b) => Some(a.cmp(&b)),
            Numeric::Float(a, b) => a.partial_cmp(&b),
            Numeric::Big(a, b) => Some(a.cmp(&b)),
        },
    };
    // NaN is unordered: every comparison is false
    let holds = match op {
        OpCode::Gt => matches!(ordering, Some(Ordering::Greater)),
        OpCode::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        OpCode::Lt => matches!(ordering, Some(Ordering::Less)),
        _ => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
    };
    Ok(Value::from(holds))
}

/// Negate a number
pub fn negate(value: &Value) -> VmResult<Value> {
    match value {
        Value::SmallNumber(n) => Ok(small_or_float(n.checked_neg(), -f64::from(*n))),
        Value::Number(n) => Ok(Value::Number(-n)),
        Value::BigNumber(b) => Ok(Value::from(b.neg())),
        other => Err(VmError::type_mismatch("numeric", other, "NEGATE")),
    }
}

// ===== Bitwise =====

/// Both operands as integers of a common width
enum Integral {
    Small(i32, i32),
    Wide(i64, i64),
    Big(BigInt, BigInt),
}

fn integral_pair(op: OpCode, left: &Value, right: &Value) -> VmResult<Integral> {
    let mismatch = |value: &Value| VmError::type_mismatch("integral number", value, op.name());
    Ok(match (left, right) {
        (Value::SmallNumber(a), Value::SmallNumber(b)) => Integral::Small(*a, *b),
        (Value::BigNumber(_), _) | (_, Value::BigNumber(_)) => Integral::Big(
            left.as_big_integer().ok_or_else(|| mismatch(left))?,
            right.as_big_integer().ok_or_else(|| mismatch(right))?,
        ),
        _ => Integral::Wide(
            left.as_integer().ok_or_else(|| mismatch(left))?,
            right.as_integer().ok_or_else(|| mismatch(right))?,
        ),
    })
}

fn bitwise(op: OpCode, left: &Value, right: &Value) -> VmResult<Value> {
    Ok(match integral_pair(op, left, right)? {
        Integral::Small(a, b) => Value::SmallNumber(match op {
            OpCode::BitAnd => a & b,
            OpCode::BitOr => a | b,
            _ => a ^ b,
        }),
        Integral::Wide(a, b) => {
            let bits = match op {
                OpCode::BitAnd => a & b,
                OpCode::BitOr => a | b,
                _ => a ^ b,
            };
            Value::Number(bits as f64)
        }
        Integral::Big(a, b) => Value::from(BigNumber::from_integer(match op {
            OpCode::BitAnd => a & b,
            OpCode::BitOr => a | b,
            _ => a ^ b,
        })),
    })
}

fn shift(op: OpCode, left: &Value, right: &Value) -> VmResult<Value> {
    let out_of_range = |expected: &'static str| VmError::TypeMismatch {
        expected,
        got: right.type_name(),
        operation: op.name(),
    };
    let word_amount = |amount: i64| {
        u32::try_from(amount)
            .ok()
            .filter(|n| *n < WORD_BITS)
            .ok_or_else(|| out_of_range("shift amount in 0..64"))
    };
    // |value| < 2^63 and amount < 64, so the shifted value fits in an i128
    let shift_wide = |value: i64, amount: u32| {
        let value = i128::from(value);
        if op == OpCode::Shl {
            value << amount
        } else {
            value >> amount
        }
    };

    Ok(match integral_pair(op, left, right)? {
        Integral::Small(a, b) => {
            let shifted = shift_wide(i64::from(a), word_amount(i64::from(b))?);
            i32::try_from(shifted).map_or(Value::Number(shifted as f64), Value::SmallNumber)
        }
        Integral::Wide(a, b) => Value::Number(shift_wide(a, word_amount(b)?) as f64),
        Integral::Big(a, b) => {
            let amount = b
                .to_usize()
                .filter(|n| *n <= MAX_BIG_SHIFT)
                .ok_or_else(|| out_of_range("shift amount in 0..=4096"))?;
            let shifted = if op == OpCode::Shl { a << amount } else { a >> amount };
            Value::from(BigNumber::from_integer(shifted))
        }
    })
}

/// Bitwise complement of an integer
pub fn bit_not(value: &Value) -> VmResult<Value> {
    let mismatch = || VmError::type_mismatch("integral number", value, "B_NOT");
    match value {
        Value::SmallNumber(n) => Ok(Value::SmallNumber(!n)),
        Value::BigNumber(_) => {
            let n = value.as_big_integer().ok_or_else(mismatch)?;
            Ok(Value::from(BigNumber::from_integer(!n)))
        }
        _ => {
            let n = value.as_integer().ok_or_else(mismatch)?;
            Ok(Value::Number((!n) as f64))
        }
    }
}

// ===== Collections =====

fn index_of(key: &Value, length: usize, operation: &'static str) -> VmResult<usize> {
    let index = key
        .as_integer()
        .ok_or_else(|| VmError::type_mismatch("integral index", key, operation))?;
    usize::try_from(index)
        .ok()
        .filter(|i| *i < length)
        .ok_or(VmError::IndexOutOfRange { index, length })
}

/// Read `container[key]`
///
/// Arrays take an integral index; maps look the key up by [`Value::same_value`]
/// and yield Null on a miss; text yields the character at the index.
pub fn get(container: &Value, key: &Value) -> VmResult<Value> {
    match container {
        Value::Array(items) => {
            let index = index_of(key, items.len(), "GET")?;
            Ok(items[index].clone())
        }
        Value::Map(pairs) => Ok(pairs
            .iter()
            .find(|(k, _)| k.same_value(key))
            .map_or(Value::Null, |(_, v)| v.clone())),
        Value::Text(text) => {
            let index = index_of(key, text.chars().count(), "GET")?;
            Ok(text
                .chars()
                .nth(index)
                .map_or(Value::Null, |c| Value::text(c.to_string())))
        }
        other => Err(VmError::type_mismatch("Array, Map or Text", other, "GET")),
    }
}

/// Where a `SET` will store its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Overwrite an array element or the value of an existing map pair
    Replace(usize),
    /// Append a new map pair
    Append,
}

/// Check that `container[key] = value` is possible and find where it lands
pub fn placement(container: &Value, key: &Value) -> VmResult<Placement> {
    match container {
        Value::Array(items) => index_of(key, items.len(), "SET").map(Placement::Replace),
        Value::Map(pairs) => Ok(pairs
            .iter()
            .position(|(k, _)| k.same_value(key))
            .map_or(Placement::Append, Placement::Replace)),
        other => Err(VmError::type_mismatch("Array or Map", other, "SET")),
    }
}

/// Store `value` according to a placement from [`placement`]
#[must_use]
pub fn store(container: Value, key: Value, value: Value, placement: Placement) -> Value {
    match (container, placement) {
        (Value::Array(mut items), Placement::Replace(index)) => {
            if let Some(slot) = items.get_mut(index) {
                *slot = value;
            }
            Value::Array(items)
        }
        (Value::Map(mut pairs), Placement::Replace(index)) => {
            if let Some((_, slot)) = pairs.get_mut(index) {
                *slot = value;
            }
            Value::Map(pairs)
        }
        (Value::Map(mut pairs), Placement::Append) => {
            pairs.push((key, value));
            Value::Map(pairs)
        }
        (other, _) => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn big(text: &str) -> Value {
        Value::big(text).unwrap()
    }

    fn apply(op: OpCode, left: Value, right: Value) -> VmResult<Value> {
        binary(op, &left, &right, 32)
    }

    #[test]
    fn test_small_arithmetic_stays_small() {
        assert_eq!(apply(OpCode::Add, 2.into(), 3.into()).unwrap(), Value::SmallNumber(5));
        assert_eq!(apply(OpCode::Mul, 6.into(), 7.into()).unwrap(), Value::SmallNumber(42));
        assert_eq!(apply(OpCode::Div, 8.into(), 2.into()).unwrap(), Value::SmallNumber(4));
        assert_eq!(apply(OpCode::Pow, 2.into(), 10.into()).unwrap(), Value::SmallNumber(1024));
    }

    #[test]
    fn test_small_overflow_widens() {
        assert_eq!(
            apply(OpCode::Add, i32::MAX.into(), 1.into()).unwrap(),
            Value::Number(2_147_483_648.0)
        );
        assert_eq!(apply(OpCode::Div, 7.into(), 2.into()).unwrap(), Value::Number(3.5));
        assert_eq!(
            apply(OpCode::Div, i32::MIN.into(), (-1).into()).unwrap(),
            Value::Number(2_147_483_648.0)
        );
        assert_eq!(
            negate(&Value::SmallNumber(i32::MIN)).unwrap(),
            Value::Number(2_147_483_648.0)
        );
        assert_eq!(apply(OpCode::Pow, 2.into(), (-1).into()).unwrap(), Value::Number(0.5));
    }

    #[test]
    fn test_mixed_kinds_promote() {
        assert_eq!(apply(OpCode::Add, 2.into(), Value::Number(0.5)).unwrap(), Value::Number(2.5));
        let sum = apply(OpCode::Add, big("0.1"), Value::Number(0.2)).unwrap();
        assert_eq!(sum, big("0.3"));
        assert!(matches!(
            apply(OpCode::Add, big("1"), Value::Number(f64::INFINITY)),
            Err(VmError::TypeMismatch { expected: "finite number", .. })
        ));
    }

    #[test]
    fn test_add_concatenates_text() {
        assert_eq!(
            apply(OpCode::Add, Value::text("n="), 4.into()).unwrap(),
            Value::text("n=4")
        );
        assert_eq!(
            apply(OpCode::Add, Value::Number(1.5), Value::text("!")).unwrap(),
            Value::text("1.5!")
        );
        assert!(matches!(
            apply(OpCode::Sub, Value::text("a"), 1.into()),
            Err(VmError::TypeMismatch { got: "Text", operation: "SUB", .. })
        ));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(apply(OpCode::Div, 1.into(), 0.into()), Err(VmError::DivisionByZero));
        assert_eq!(
            apply(OpCode::Div, Value::Number(1.0), Value::Number(0.0)),
            Err(VmError::DivisionByZero)
        );
        assert_eq!(apply(OpCode::Mod, big("5"), big("0.0")), Err(VmError::DivisionByZero));
        assert_eq!(apply(OpCode::Mod, 5.into(), 0.into()), Err(VmError::DivisionByZero));
    }

    #[test]
    fn test_big_division_uses_scale() {
        let third = binary(OpCode::Div, &big("1"), &big("3"), 5).unwrap();
        assert_eq!(third.to_string(), "0.33333");
    }

    #[test]
    fn test_big_power() {
        assert_eq!(apply(OpCode::Pow, big("1.5"), 2.into()).unwrap(), big("2.25"));
        assert!(apply(OpCode::Pow, big("2"), big("0.5")).is_err());
        assert!(apply(OpCode::Pow, big("2"), (-1).into()).is_err());
        assert!(apply(OpCode::Pow, big("2"), 5000.into()).is_err());
    }

    #[test]
    fn test_big_scale_overflow_is_an_error() {
        let once = apply(OpCode::Pow, big("1e-10000"), 4096.into()).unwrap();
        assert_eq!(
            apply(OpCode::Pow, once, 4096.into()),
            Err(VmError::TypeMismatch {
                expected: "operand within precision limits",
                got: "SmallNumber",
                operation: "POW",
            })
        );

        let wide = Value::from(BigNumber::new(BigInt::from(1), u32::MAX));
        assert!(matches!(
            apply(OpCode::Mul, wide, big("0.5")),
            Err(VmError::TypeMismatch { operation: "MUL", .. })
        ));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(apply(OpCode::Gt, 3.into(), Value::Number(2.5)).unwrap(), Value::True);
        assert_eq!(apply(OpCode::Le, big("2"), 2.into()).unwrap(), Value::True);
        assert_eq!(
            apply(OpCode::Lt, Value::text("apple"), Value::text("banana")).unwrap(),
            Value::True
        );
        assert_eq!(
            apply(OpCode::Ge, Value::Number(f64::NAN), 1.into()).unwrap(),
            Value::False
        );
        assert!(apply(OpCode::Gt, Value::text("a"), 1.into()).is_err());
    }

    #[test]
    fn test_equality() {
        assert_eq!(apply(OpCode::Eq, 1.into(), Value::Number(1.0)).unwrap(), Value::True);
        assert_eq!(apply(OpCode::Neq, Value::text("1"), 1.into()).unwrap(), Value::True);
        assert_eq!(apply(OpCode::LooseEq, Value::text("1"), 1.into()).unwrap(), Value::True);
        assert_eq!(apply(OpCode::LooseEq, Value::Null, Value::False).unwrap(), Value::False);
    }

    #[test]
    fn test_logic() {
        assert_eq!(apply(OpCode::And, 0.into(), Value::text("")).unwrap(), Value::True);
        assert_eq!(apply(OpCode::And, Value::True, Value::Null).unwrap(), Value::False);
        assert_eq!(apply(OpCode::Or, Value::False, Value::Null).unwrap(), Value::False);
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(apply(OpCode::BitAnd, 12.into(), 10.into()).unwrap(), Value::SmallNumber(8));
        assert_eq!(apply(OpCode::Xor, Value::Number(6.0), 3.into()).unwrap(), Value::Number(5.0));
        assert_eq!(apply(OpCode::BitOr, big("4"), 1.into()).unwrap(), big("5"));
        assert!(apply(OpCode::BitAnd, Value::Number(1.5), 1.into()).is_err());
        assert_eq!(bit_not(&Value::SmallNumber(0)).unwrap(), Value::SmallNumber(-1));
        assert_eq!(bit_not(&big("5")).unwrap(), big("-6"));
    }

    #[test]
    fn test_shifts() {
        assert_eq!(apply(OpCode::Shl, 1.into(), 4.into()).unwrap(), Value::SmallNumber(16));
        assert_eq!(
            apply(OpCode::Shl, 1.into(), 40.into()).unwrap(),
            Value::Number(1_099_511_627_776.0)
        );
        assert_eq!(apply(OpCode::Shr, (-16).into(), 2.into()).unwrap(), Value::SmallNumber(-4));
        assert_eq!(
            apply(OpCode::Shl, big("1"), 100.into()).unwrap(),
            big("1267650600228229401496703205376")
        );
        assert!(apply(OpCode::Shl, 1.into(), 64.into()).is_err());
        assert!(apply(OpCode::Shr, 1.into(), (-1).into()).is_err());
    }

    #[test]
    fn test_get() {
        let array = Value::array(vec![Value::text("a"), Value::text("b")]);
        assert_eq!(get(&array, &Value::SmallNumber(1)).unwrap(), Value::text("b"));
        assert_eq!(
            get(&array, &Value::SmallNumber(2)),
            Err(VmError::IndexOutOfRange { index: 2, length: 2 })
        );
        assert_eq!(
            get(&array, &Value::SmallNumber(-1)),
            Err(VmError::IndexOutOfRange { index: -1, length: 2 })
        );

        let map = Value::map(vec![(Value::SmallNumber(1), Value::text("one"))]);
        assert_eq!(get(&map, &Value::Number(1.0)).unwrap(), Value::text("one"));
        assert_eq!(get(&map, &Value::text("x")).unwrap(), Value::Null);

        assert_eq!(get(&Value::text("héllo"), &Value::SmallNumber(1)).unwrap(), Value::text("é"));
        assert!(get(&Value::Null, &Value::SmallNumber(0)).is_err());
    }

    #[test]
    fn test_set() {
        let array = Value::array(vec![Value::Null]);
        let place = placement(&array, &Value::SmallNumber(0)).unwrap();
        let updated = store(array, Value::SmallNumber(0), Value::True, place);
        assert_eq!(updated, Value::array(vec![Value::True]));

        let map = Value::map(vec![(Value::text("k"), Value::SmallNumber(1))]);
        let place = placement(&map, &Value::text("k")).unwrap();
        assert_eq!(place, Placement::Replace(0));
        let map = store(map, Value::text("k"), Value::SmallNumber(2), place);
        let place = placement(&map, &Value::text("j")).unwrap();
        assert_eq!(place, Placement::Append);
        let map = store(map, Value::text("j"), Value::SmallNumber(3), place);
        assert_eq!(map.to_string(), "{\"k\": 2, \"j\": 3}");

        assert!(placement(&Value::text("abc"), &Value::SmallNumber(0)).is_err());
    }
}
