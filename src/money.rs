//! Currency amounts as integer minor units and rates as basis points.
//!
//! Nothing in the ledger touches floating point. Percentages are applied with
//! [`apply_rate`], which rounds half-up (away from zero) to the minor unit, and
//! amounts are only rendered with two decimals at the API edge.

use std::{
  fmt,
  iter::Sum,
  ops::{Add, AddAssign, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minor units per major unit (cents per unit).
pub const MINOR_DIGITS: u32 = 2;
/// Basis points in 100%.
pub const BPS_SCALE: u32 = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
  #[error("empty amount")]
  Empty,
  #[error("malformed amount `{0}`")]
  Malformed(String),
  #[error("`{0}` has more than {1} decimal places")]
  TooPrecise(String, u32),
  #[error("`{0}` is out of range")]
  OutOfRange(String),
  #[error("amount must be positive, got {0}")]
  NotPositive(Money),
  #[error("amount {0} exceeds the {max} limit", max = Money::MAX)]
  TooLarge(Money),
}

/// Signed amount in the currency minor unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
  pub const ZERO: Money = Money(0);
  /// Largest amount a single sale, transfer or withdrawal may carry
  /// (1 000 000 000.00). Far enough below `i64::MAX` that ledger sums
  /// cannot overflow.
  pub const MAX: Money = Money(100_000_000_000);

  pub const fn from_minor(minor: i64) -> Self {
    Money(minor)
  }

  pub const fn minor(self) -> i64 {
    self.0
  }

  pub const fn is_positive(self) -> bool {
    self.0 > 0
  }

  pub const fn is_zero(self) -> bool {
    self.0 == 0
  }

  pub const fn is_negative(self) -> bool {
    self.0 < 0
  }

  /// Parses a decimal string in major units: `"12"`, `"12.5"`, `"-0.01"`.
  /// Magnitudes above [`Money::MAX`] are out of range.
  pub fn parse_major(input: &str) -> Result<Self, ParseError> {
    let minor = parse_fixed(input, MINOR_DIGITS)?;
    if minor.unsigned_abs() > Money::MAX.0.unsigned_abs() {
      return Err(ParseError::OutOfRange(input.trim().to_string()));
    }
    Ok(Money(minor))
  }

  /// Accepts `self` as a transaction amount: `0 < self <= Money::MAX`.
  pub fn transactable(self) -> Result<Self, ParseError> {
    if !self.is_positive() {
      Err(ParseError::NotPositive(self))
    } else if self > Money::MAX {
      Err(ParseError::TooLarge(self))
    } else {
      Ok(self)
    }
  }

  pub fn checked_add(self, rhs: Money) -> Option<Money> {
    self.0.checked_add(rhs.0).map(Money)
  }

  pub fn checked_sub(self, rhs: Money) -> Option<Money> {
    self.0.checked_sub(rhs.0).map(Money)
  }

  pub fn apply_rate(self, rate: Rate) -> Money {
    Money(apply_rate(self.0, rate))
  }
}

/// `amount × rate`, rounded half-up to the minor unit.
///
/// Halves round away from zero, so a negative amount mirrors its positive
/// counterpart exactly.
pub fn apply_rate(amount_minor: i64, rate: Rate) -> i64 {
  let scale = BPS_SCALE as i128;
  let product = amount_minor as i128 * rate.bps() as i128;
  let magnitude = (product.abs() + scale / 2) / scale;
  // |result| <= |amount| since rate <= 100%
  (product.signum() * magnitude) as i64
}

impl fmt::Display for Money {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let sign = if self.0 < 0 { "-" } else { "" };
    let abs = self.0.unsigned_abs();
    let scale = 10u64.pow(MINOR_DIGITS);
    write!(f, "{sign}{}.{:02}", abs / scale, abs % scale)
  }
}

// Operators saturate instead of panicking. Use `checked_*` where an overflow
// has to surface.
impl Add for Money {
  type Output = Self;

  fn add(self, rhs: Self) -> Self {
    Money(self.0.saturating_add(rhs.0))
  }
}

impl AddAssign for Money {
  fn add_assign(&mut self, rhs: Self) {
    *self = *self + rhs;
  }
}

impl Sub for Money {
  type Output = Self;

  fn sub(self, rhs: Self) -> Self {
    Money(self.0.saturating_sub(rhs.0))
  }
}

impl SubAssign for Money {
  fn sub_assign(&mut self, rhs: Self) {
    *self = *self - rhs;
  }
}

impl Neg for Money {
  type Output = Self;

  fn neg(self) -> Self {
    Money(self.0.saturating_neg())
  }
}

impl Sum for Money {
  fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
    iter.fold(Money::ZERO, Add::add)
  }
}

/// A percentage in basis points, `0..=100%`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Rate(u32);

impl Rate {
  pub const ZERO: Rate = Rate(0);

  pub fn from_bps(bps: u32) -> Result<Self, ParseError> {
    if bps > BPS_SCALE {
      return Err(ParseError::OutOfRange(format!("{bps}bps")));
    }
    Ok(Rate(bps))
  }

  /// Parses a percent string with up to two decimals: `"2"`, `"2.5"`.
  pub fn parse_percent(input: &str) -> Result<Self, ParseError> {
    let bps = parse_fixed(input, 2)?;
    u32::try_from(bps)
      .ok()
      .filter(|bps| *bps <= BPS_SCALE)
      .map(Rate)
      .ok_or_else(|| ParseError::OutOfRange(input.trim().to_string()))
  }

  pub const fn bps(self) -> u32 {
    self.0
  }
}

impl TryFrom<u32> for Rate {
  type Error = ParseError;

  fn try_from(bps: u32) -> Result<Self, Self::Error> {
    Rate::from_bps(bps)
  }
}

impl From<Rate> for u32 {
  fn from(rate: Rate) -> u32 {
    rate.0
  }
}

impl fmt::Display for Rate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
  }
}

/// Parses a signed decimal into an integer scaled by `10^digits`.
fn parse_fixed(input: &str, digits: u32) -> Result<i64, ParseError> {
  let trimmed = input.trim();
  if trimmed.is_empty() {
    return Err(ParseError::Empty);
  }

  let malformed = || ParseError::Malformed(trimmed.to_string());
  let out_of_range = || ParseError::OutOfRange(trimmed.to_string());

  let (negative, unsigned) = match trimmed.as_bytes()[0] {
    b'-' => (true, &trimmed[1..]),
    b'+' => (false, &trimmed[1..]),
    _ => (false, trimmed),
  };

  let (whole, frac) = match unsigned.split_once('.') {
    Some((whole, frac)) => (whole, frac),
    None => (unsigned, ""),
  };

  let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
  if whole.is_empty()
    || !all_digits(whole)
    || !all_digits(frac)
    || (unsigned.contains('.') && frac.is_empty())
  {
    return Err(malformed());
  }
  if frac.len() > digits as usize {
    return Err(ParseError::TooPrecise(trimmed.to_string(), digits));
  }

  let scale = 10i64.pow(digits);
  let whole: i64 = whole.parse().map_err(|_| out_of_range())?;
  let frac_scaled: i64 = if frac.is_empty() {
    0
  } else {
    let padding = 10i64.pow(digits - frac.len() as u32);
    frac.parse::<i64>().map_err(|_| malformed())? * padding
  };

  let value = whole
    .checked_mul(scale)
    .and_then(|v| v.checked_add(frac_scaled))
    .ok_or_else(out_of_range)?;

  Ok(if negative { -value } else { value })
}
