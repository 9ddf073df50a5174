//! Arbitrary-precision decimal numbers for the Cairn virtual machine
//!
//! A `BigNumber` is an integer digit string scaled by a power of ten:
//! `digits * 10^-scale`. Addition, subtraction, multiplication and remainder
//! are exact; division is truncated to a caller-supplied number of
//! fractional digits.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use thiserror::Error;

/// Largest exponent accepted in scientific notation (`1e10000`)
const MAX_EXPONENT: i64 = 10_000;

/// Malformed decimal text handed to [`BigNumber::from_str`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid number '{input}': {reason}")]
pub struct ParseNumberError {
    /// The rejected input
    pub input: String,
    /// What was wrong with it
    pub reason: &'static str,
}

/// Exact decimal number
#[derive(Clone)]
pub struct BigNumber {
    digits: BigInt,
    scale: u32,
}

fn power_of_ten(exponent: u32) -> BigInt {
    BigInt::from(10u32).pow(exponent)
}

impl BigNumber {
    /// Create a number from raw digits and a decimal scale
    #[must_use]
    pub fn new(digits: BigInt, scale: u32) -> Self {
        Self { digits, scale }
    }

    /// Create an integral number
    #[must_use]
    pub fn from_integer(digits: BigInt) -> Self {
        Self { digits, scale: 0 }
    }

    /// Convert a double exactly as it prints in shortest round-trip form.
    ///
    /// Returns `None` for NaN and infinities.
    #[must_use]
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        format!("{value}").parse().ok()
    }

    /// The unscaled digits
    #[must_use]
    pub fn digits(&self) -> &BigInt {
        &self.digits
    }

    /// Number of fractional decimal digits
    #[must_use]
    pub fn scale(&self) -> u32 {
        self.scale
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.digits.is_zero()
    }

    /// Returns true if there is no fractional part
    #[must_use]
    pub fn is_integer(&self) -> bool {
        self.scale == 0 || (&self.digits % power_of_ten(self.scale)).is_zero()
    }

    /// The integral value, if the number has no fractional part
    #[must_use]
    pub fn to_integer(&self) -> Option<BigInt> {
        if self.is_integer() {
            Some(&self.digits / power_of_ten(self.scale))
        } else {
            None
        }
    }

    /// Approximate the number as a double (may lose precision)
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        if self.scale == 0 {
            return self.digits.to_f64().unwrap_or(f64::NAN);
        }
        self.to_string().parse().unwrap_or(f64::NAN)
    }

    /// Drop trailing zeros from the fractional part
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut digits = self.digits.clone();
        let mut scale = self.scale;
        let ten = BigInt::from(10u32);
        while scale > 0 && (&digits % &ten).is_zero() {
            digits /= &ten;
            scale -= 1;
        }
        Self { digits, scale }
    }

    /// Bring both operands to the same scale
    fn align(&self, other: &Self) -> (BigInt, BigInt, u32) {
        match self.scale.cmp(&other.scale) {
            Ordering::Equal => (self.digits.clone(), other.digits.clone(), self.scale),
            Ordering::Less => (
                &self.digits * power_of_ten(other.scale - self.scale),
                other.digits.clone(),
                other.scale,
            ),
            Ordering::Greater => (
                self.digits.clone(),
                &other.digits * power_of_ten(self.scale - other.scale),
                self.scale,
            ),
        }
    }

    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        let (a, b, scale) = self.align(other);
        Self::new(a + b, scale)
    }

    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        let (a, b, scale) = self.align(other);
        Self::new(a - b, scale)
    }

    /// Exact product
    ///
    /// Returns `None` when the combined scale does not fit in a `u32`.
    #[must_use]
    pub fn checked_mul(&self, other: &Self) -> Option<Self> {
        let scale = self.scale.checked_add(other.scale)?;
        Some(Self::new(&self.digits * &other.digits, scale))
    }

    /// Divide, truncating toward zero after `frac_digits` fractional digits.
    ///
    /// Returns `None` when dividing by zero.
    #[must_use]
    pub fn checked_div(&self, other: &Self, frac_digits: u32) -> Option<Self> {
        if other.is_zero() {
            return None;
        }
        let (a, b, _) = self.align(other);
        let quotient = (a * power_of_ten(frac_digits)) / b;
        Some(Self::new(quotient, frac_digits).normalized())
    }

    /// Truncated remainder (sign follows the dividend)
    ///
    /// Returns `None` when dividing by zero.
    #[must_use]
    pub fn checked_rem(&self, other: &Self) -> Option<Self> {
        if other.is_zero() {
            return None;
        }
        let (a, b, scale) = self.align(other);
        Some(Self::new(a % b, scale))
    }

    /// Raise to a non-negative integral power
    ///
    /// Trailing fractional zeros are dropped first. Returns `None` when the
    /// resulting scale does not fit in a `u32`.
    #[must_use]
    pub fn checked_pow(&self, exponent: u32) -> Option<Self> {
        let base = self.normalized();
        let scale = base.scale.checked_mul(exponent)?;
        Some(Self::new(base.digits.pow(exponent), scale))
    }

    #[must_use]
    pub fn neg(&self) -> Self {
        Self::new(-&self.digits, self.scale)
    }
}

impl From<i32> for BigNumber {
    fn from(value: i32) -> Self {
        Self::from_integer(BigInt::from(value))
    }
}

impl From<i64> for BigNumber {
    fn from(value: i64) -> Self {
        Self::from_integer(BigInt::from(value))
    }
}

impl FromStr for BigNumber {
    type Err = ParseNumberError;

    /// Parse `[+-]digits[.digits][(e|E)[+-]digits]`
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let fail = |reason| ParseNumberError {
            input: text.to_string(),
            reason,
        };

        let (mantissa, exponent) = match text.find(|c: char| c == 'e' || c == 'E') {
            Some(at) => (&text[..at], Some(&text[at + 1..])),
            None => (text, None),
        };

        let (negative, unsigned) = match mantissa.as_bytes().first() {
            Some(b'-') => (true, &mantissa[1..]),
            Some(b'+') => (false, &mantissa[1..]),
            Some(_) => (false, mantissa),
            None => return Err(fail("empty input")),
        };

        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((int_part, frac_part)) => {
                if frac_part.is_empty() {
                    return Err(fail("expected digits after decimal point"));
                }
                (int_part, frac_part)
            }
            None => (unsigned, ""),
        };

        if int_part.is_empty() {
            return Err(fail("expected digits before decimal point"));
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(fail("unexpected character"));
        }

        let mut digits: BigInt = format!("{int_part}{frac_part}")
            .parse()
            .map_err(|_| fail("unexpected character"))?;
        let mut scale = frac_part.len() as i64;

        if let Some(exponent) = exponent {
            let exponent: i64 = exponent.parse().map_err(|_| fail("invalid exponent"))?;
            if exponent.abs() > MAX_EXPONENT {
                return Err(fail("exponent out of range"));
            }
            scale -= exponent;
        }

        if scale < 0 {
            digits *= power_of_ten((-scale) as u32);
            scale = 0;
        }
        let scale = u32::try_from(scale).map_err(|_| fail("too many fractional digits"))?;

        if negative {
            digits = -digits;
        }
        Ok(Self { digits, scale })
    }
}

impl PartialEq for BigNumber {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BigNumber {}

impl PartialOrd for BigNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BigNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b, _) = self.align(other);
        a.cmp(&b)
    }
}

impl fmt::Display for BigNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.digits.is_negative() { "-" } else { "" };
        let magnitude = self.digits.abs().to_string();
        if self.scale == 0 {
            return write!(f, "{sign}{magnitude}");
        }

        let scale = self.scale as usize;
        let padded = if magnitude.len() <= scale {
            format!("{}{magnitude}", "0".repeat(scale + 1 - magnitude.len()))
        } else {
            magnitude
        };
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

impl fmt::Debug for BigNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}n")
    }
}
