// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use crate::{DimensionalityError, Result};

pub const BASE_DIMENSION_COUNT: usize = 8;

/// The base dimensions a unit is built from.
///
/// Voltage is kept as its own base dimension, so `V * A` is a power but
/// `V` and `A` never reduce into each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseDimension {
    Time = 0,
    Length = 1,
    Mass = 2,
    Current = 3,
    Temperature = 4,
    Amount = 5,
    Luminosity = 6,
    Voltage = 7,
}

impl BaseDimension {
    pub const ALL: [BaseDimension; BASE_DIMENSION_COUNT] = [
        BaseDimension::Time,
        BaseDimension::Length,
        BaseDimension::Mass,
        BaseDimension::Current,
        BaseDimension::Temperature,
        BaseDimension::Amount,
        BaseDimension::Luminosity,
        BaseDimension::Voltage,
    ];

    fn name(self) -> &'static str {
        match self {
            BaseDimension::Time => "time",
            BaseDimension::Length => "length",
            BaseDimension::Mass => "mass",
            BaseDimension::Current => "current",
            BaseDimension::Temperature => "temperature",
            BaseDimension::Amount => "substance",
            BaseDimension::Luminosity => "luminosity",
            BaseDimension::Voltage => "voltage",
        }
    }
}

/// Exponents of the base dimensions, one signed byte each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UnitExponents([i8; BASE_DIMENSION_COUNT]);

impl UnitExponents {
    pub const DIMENSIONLESS: UnitExponents = UnitExponents([0; BASE_DIMENSION_COUNT]);
    pub const TIME: UnitExponents = UnitExponents::of(BaseDimension::Time, 1);
    pub const FREQUENCY: UnitExponents = UnitExponents::of(BaseDimension::Time, -1);
    pub const LENGTH: UnitExponents = UnitExponents::of(BaseDimension::Length, 1);
    pub const MASS: UnitExponents = UnitExponents::of(BaseDimension::Mass, 1);
    pub const CURRENT: UnitExponents = UnitExponents::of(BaseDimension::Current, 1);
    pub const TEMPERATURE: UnitExponents = UnitExponents::of(BaseDimension::Temperature, 1);
    pub const AMOUNT: UnitExponents = UnitExponents::of(BaseDimension::Amount, 1);
    pub const LUMINOSITY: UnitExponents = UnitExponents::of(BaseDimension::Luminosity, 1);
    pub const VOLTAGE: UnitExponents = UnitExponents::of(BaseDimension::Voltage, 1);
    // [time, length, mass, current, temperature, amount, luminosity, voltage]
    pub const POWER: UnitExponents = UnitExponents([0, 0, 0, 1, 0, 0, 0, 1]);
    pub const RESISTANCE: UnitExponents = UnitExponents([0, 0, 0, -1, 0, 0, 0, 1]);

    pub const fn of(dim: BaseDimension, exponent: i8) -> Self {
        let mut exps = [0; BASE_DIMENSION_COUNT];
        exps[dim as usize] = exponent;
        UnitExponents(exps)
    }

    pub fn exponent(&self, dim: BaseDimension) -> i8 {
        self.0[dim as usize]
    }

    pub fn is_dimensionless(&self) -> bool {
        self.0.iter().all(|e| *e == 0)
    }

    pub fn checked_mul(self, other: Self) -> Result<Self> {
        self.combine(other, |a, b| a as i64 + b as i64)
    }

    pub fn checked_div(self, other: Self) -> Result<Self> {
        self.combine(other, |a, b| a as i64 - b as i64)
    }

    pub fn checked_pow(self, n: i64) -> Result<Self> {
        self.combine(UnitExponents::DIMENSIONLESS, |a, _| a as i64 * n)
    }

    fn combine(self, other: Self, op: impl Fn(i8, i8) -> i64) -> Result<Self> {
        let mut exps = [0i8; BASE_DIMENSION_COUNT];
        for (i, exp) in exps.iter_mut().enumerate() {
            let value = op(self.0[i], other.0[i]);
            *exp = i8::try_from(value).map_err(|_| DimensionalityError::ExponentOverflow(value))?;
        }
        Ok(UnitExponents(exps))
    }
}

impl fmt::Display for UnitExponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "dimensionless");
        }
        let mut first = true;
        for dim in BaseDimension::ALL {
            let exp = self.exponent(dim);
            if exp == 0 {
                continue;
            }
            if !first {
                write!(f, " * ")?;
            }
            first = false;
            if exp == 1 {
                write!(f, "[{}]", dim.name())?;
            } else {
                write!(f, "[{}]^{}", dim.name(), exp)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_times_time_is_dimensionless() {
        let dims = UnitExponents::FREQUENCY
            .checked_mul(UnitExponents::TIME)
            .unwrap();
        assert!(dims.is_dimensionless());
    }

    #[test]
    fn test_pow_overflow() {
        assert!(UnitExponents::TIME.checked_pow(200).is_err());
        assert_eq!(
            UnitExponents::TIME.checked_pow(-1).unwrap(),
            UnitExponents::FREQUENCY
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(UnitExponents::FREQUENCY.to_string(), "[time]^-1");
        assert_eq!(UnitExponents::DIMENSIONLESS.to_string(), "dimensionless");
    }
}
