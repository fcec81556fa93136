//! Fixed-point decimal values
//!
//! Settings and gains are stored as scaled integers so that they survive
//! persistence and display without binary rounding noise. `FixedDecimal<D>`
//! holds `value × 10^D` in an `i32`.
//!
//! Arithmetic between values with the same number of decimal places is
//! exact (saturating at the `i32` range). Converting to or from `f64` is the
//! only lossy step and rounds to nearest, half away from zero.

use core::cmp::Ordering;
use core::fmt;
use core::ops::{Add, Neg, Sub};
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Errors from decimal conversion and parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecimalError {
    /// Input text was empty (or only a sign)
    Empty,
    /// Input text contained something other than digits, a sign and one '.'
    InvalidDigit,
    /// Value does not fit in the scaled `i32`
    OutOfRange,
    /// Floating-point input was NaN
    NotANumber,
}

/// Decimal number with `D` digits after the point
///
/// # Example
/// ```
/// use kiln_core::decimal::FixedDecimal;
/// let step: FixedDecimal<1> = "12.5".parse().unwrap();
/// assert_eq!(step.raw(), 125);
/// assert_eq!(step.to_f64(), 12.5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct FixedDecimal<const D: u8>(i32);

impl<const D: u8> FixedDecimal<D> {
    /// Zero value
    pub const ZERO: Self = Self(0);

    /// Scaling factor (10^D)
    pub const SCALE: i32 = 10_i32.pow(D as u32);

    /// Create from the scaled integer representation
    #[inline]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Scaled integer representation (`value × 10^D`)
    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Create from a whole number, saturating at the representable range
    pub const fn from_int(n: i32) -> Self {
        Self(n.saturating_mul(Self::SCALE))
    }

    /// Round a float to the nearest representable value
    pub fn from_f64(value: f64) -> Result<Self, DecimalError> {
        if value.is_nan() {
            return Err(DecimalError::NotANumber);
        }
        let scaled = libm::round(value * Self::SCALE as f64);
        if scaled > i32::MAX as f64 || scaled < i32::MIN as f64 {
            return Err(DecimalError::OutOfRange);
        }
        Ok(Self(scaled as i32))
    }

    /// Convert to a float
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    /// Change the number of decimal places
    ///
    /// Dropping digits rounds half away from zero; adding digits fails only
    /// when the result leaves the `i32` range.
    pub fn rescale<const E: u8>(self) -> Result<FixedDecimal<E>, DecimalError> {
        let value = self.0 as i64;
        let raw = match E.cmp(&D) {
            Ordering::Equal => value,
            Ordering::Greater => value * 10_i64.pow((E - D) as u32),
            Ordering::Less => round_div(value, 10_i64.pow((D - E) as u32)),
        };
        i32::try_from(raw)
            .map(FixedDecimal)
            .map_err(|_| DecimalError::OutOfRange)
    }

    /// Multiply two decimals, rounding the product back to `D` places
    pub fn mul_rescale(self, rhs: Self) -> Result<Self, DecimalError> {
        let product = round_div(self.0 as i64 * rhs.0 as i64, Self::SCALE as i64);
        i32::try_from(product)
            .map(Self)
            .map_err(|_| DecimalError::OutOfRange)
    }

    /// Half the value, rounded half away from zero in the last place
    #[inline]
    pub fn half(self) -> Self {
        Self(round_div(self.0 as i64, 2) as i32)
    }

    /// Absolute value (saturating)
    #[inline]
    pub const fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    /// Check if the value is below zero
    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Check if the value is zero
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Clamp to a range
    #[inline]
    pub fn clamp(self, min: Self, max: Self) -> Self {
        Self(self.0.clamp(min.0, max.0))
    }
}

/// Integer division rounding half away from zero
fn round_div(numerator: i64, denominator: i64) -> i64 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    }
}

impl<const D: u8> PartialOrd for FixedDecimal<D> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<const D: u8> Ord for FixedDecimal<D> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<const D: u8> Add for FixedDecimal<D> {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl<const D: u8> Sub for FixedDecimal<D> {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl<const D: u8> Neg for FixedDecimal<D> {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self(self.0.saturating_neg())
    }
}

impl<const D: u8> fmt::Display for FixedDecimal<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0 as i64;
        let sign = if value < 0 { "-" } else { "" };
        let magnitude = value.unsigned_abs();
        let scale = Self::SCALE as u64;

        if D == 0 {
            return write!(f, "{}{}", sign, magnitude);
        }
        write!(
            f,
            "{}{}.{:0width$}",
            sign,
            magnitude / scale,
            magnitude % scale,
            width = D as usize
        )
    }
}

impl<const D: u8> FromStr for FixedDecimal<D> {
    type Err = DecimalError;

    /// Parse `[+-]digits[.digits]`
    ///
    /// Extra fractional digits beyond `D` are rounded, not rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, body) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        if body.is_empty() || body == "." {
            return Err(DecimalError::Empty);
        }

        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };

        let limit = i32::MAX as i64 + 1;
        let mut magnitude: i64 = 0;
        for b in int_part.bytes() {
            let digit = ascii_digit(b)?;
            magnitude = magnitude * 10 + digit;
            if magnitude * Self::SCALE as i64 > limit {
                return Err(DecimalError::OutOfRange);
            }
        }
        magnitude *= Self::SCALE as i64;

        let mut place = Self::SCALE as i64;
        let mut round_up = false;
        for (i, b) in frac_part.bytes().enumerate() {
            let digit = ascii_digit(b)?;
            if i < D as usize {
                place /= 10;
                magnitude += digit * place;
            } else if i == D as usize {
                round_up = digit >= 5;
            }
        }
        if round_up {
            magnitude += 1;
        }

        let value = if negative { -magnitude } else { magnitude };
        i32::try_from(value)
            .map(Self)
            .map_err(|_| DecimalError::OutOfRange)
    }
}

fn ascii_digit(b: u8) -> Result<i64, DecimalError> {
    if b.is_ascii_digit() {
        Ok((b - b'0') as i64)
    } else {
        Err(DecimalError::InvalidDigit)
    }
}
