//! Fixed-point money amount.
//!
//! # Responsibility
//! - Hold every profit/plan value as an integer count of minor units.
//! - Convert legacy numeric representations (integral, fractional, numeric
//!   strings) into that single canonical form.
//!
//! # Invariants
//! - One major unit is exactly `MINOR_UNITS_PER_MAJOR` minor units.
//! - Conversion from floating point rounds half away from zero.
//! - Values stay within `±MAX_MINOR_UNITS`; construction and arithmetic
//!   clamp to that range, which keeps fractional amounts exact through the
//!   JSON float form.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

/// Minor units per major currency unit.
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Largest magnitude an amount can hold (2^50 minor units).
pub const MAX_MINOR_UNITS: i64 = 1 << 50;

const fn clamp_minor_units(minor_units: i64) -> i64 {
    if minor_units > MAX_MINOR_UNITS {
        MAX_MINOR_UNITS
    } else if minor_units < -MAX_MINOR_UNITS {
        -MAX_MINOR_UNITS
    } else {
        minor_units
    }
}

/// Monetary amount in minor units (hundredths).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Builds an amount from minor units, clamped to `±MAX_MINOR_UNITS`.
    pub const fn from_minor_units(minor_units: i64) -> Self {
        Self(clamp_minor_units(minor_units))
    }

    /// Builds an amount from whole major units, clamped to `±MAX_MINOR_UNITS`.
    pub const fn from_major_units(major_units: i64) -> Self {
        Self(clamp_minor_units(
            major_units.saturating_mul(MINOR_UNITS_PER_MAJOR),
        ))
    }

    /// Converts a major-unit float, rounding to the nearest minor unit and
    /// clamping to `±MAX_MINOR_UNITS`.
    ///
    /// Returns `None` for non-finite values.
    pub fn from_major_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let limit = MAX_MINOR_UNITS as f64;
        let scaled = (value * MINOR_UNITS_PER_MAJOR as f64)
            .round()
            .clamp(-limit, limit);
        Some(Self(scaled as i64))
    }

    /// Raw minor-unit value.
    pub const fn minor_units(self) -> i64 {
        self.0
    }

    /// Major-unit value as float, used for persistence and ratios.
    pub fn to_major_f64(self) -> f64 {
        self.0 as f64 / MINOR_UNITS_PER_MAJOR as f64
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn saturating_add(self, other: Amount) -> Amount {
        Amount(clamp_minor_units(self.0.saturating_add(other.0)))
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        *self = self.saturating_add(rhs);
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, Amount::saturating_add)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Amount {
        iter.copied().sum()
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let per_major = MINOR_UNITS_PER_MAJOR.unsigned_abs();
        write!(
            f,
            "{sign}{}.{:02}",
            magnitude / per_major,
            magnitude % per_major
        )
    }
}

/// Error returned when text is not a finite decimal amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAmountError(String);

impl Display for ParseAmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid amount: `{}`", self.0)
    }
}

impl std::error::Error for ParseAmountError {}

impl FromStr for Amount {
    type Err = ParseAmountError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        trimmed
            .parse::<f64>()
            .ok()
            .and_then(Amount::from_major_f64)
            .ok_or_else(|| ParseAmountError(trimmed.to_string()))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 % MINOR_UNITS_PER_MAJOR == 0 {
            serializer.serialize_i64(self.0 / MINOR_UNITS_PER_MAJOR)
        } else {
            serializer.serialize_f64(self.to_major_f64())
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}

struct AmountVisitor;

impl Visitor<'_> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("a number of major currency units")
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Amount, E> {
        Ok(Amount::from_major_units(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Amount, E> {
        i64::try_from(value)
            .map(Amount::from_major_units)
            .map_err(|_| E::custom(format!("amount out of range: {value}")))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Amount, E> {
        Amount::from_major_f64(value).ok_or_else(|| E::custom(format!("invalid amount: {value}")))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Amount, E> {
        value.parse::<Amount>().map_err(E::custom)
    }
}
