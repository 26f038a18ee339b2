// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Div, Mul, Neg};

use num_traits::Zero;

use crate::dimension::UnitExponents;
use crate::unit::{Unit, round_to_significant_digits};
use crate::{DimensionalityError, Result};

/// Number of significant digits used when comparing or hashing quantities.
///
/// Unit scales such as `1e-9` are not exactly representable, so
/// `1 GHz * 1 ns` lands one ulp away from `1`.
const EQUALITY_DIGITS: u32 = 12;

/// A magnitude expressed in a unit.
#[derive(Debug, Clone)]
pub struct Quantity {
    magnitude: f64,
    unit: Unit,
}

impl Quantity {
    pub fn new(magnitude: f64, unit: &str) -> Result<Self> {
        Ok(Quantity {
            magnitude,
            unit: Unit::parse(unit)?,
        })
    }

    pub fn with_unit(magnitude: f64, unit: Unit) -> Self {
        Quantity { magnitude, unit }
    }

    pub fn dimensionless(magnitude: f64) -> Self {
        Quantity {
            magnitude,
            unit: Unit::dimensionless(),
        }
    }

    /// Parse text of the form `<number> [unit]`, e.g. `10 MHz` or `-3.5e-6s`.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let split = text
            .char_indices()
            .find(|(i, c)| {
                let prev = text[..*i].chars().last();
                !(c.is_ascii_digit()
                    || *c == '.'
                    || (*i == 0 && (*c == '-' || *c == '+'))
                    || ((*c == 'e' || *c == 'E')
                        && prev.is_some_and(|p| p.is_ascii_digit() || p == '.')
                        && text[i + 1..]
                            .chars()
                            .next()
                            .is_some_and(|n| n.is_ascii_digit() || n == '-' || n == '+'))
                    || ((*c == '-' || *c == '+') && matches!(prev, Some('e' | 'E'))))
            })
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        let magnitude = text[..split]
            .parse::<f64>()
            .map_err(|_| DimensionalityError::UnknownUnit(text.to_string()))?;
        Quantity::new(magnitude, &text[split..])
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn dims(&self) -> UnitExponents {
        self.unit.dims()
    }

    pub fn is_dimensionless(&self) -> bool {
        self.unit.is_dimensionless()
    }

    /// Whether the quantity carries no unit symbol at all (a plain number).
    pub fn is_plain_number(&self) -> bool {
        self.unit.symbol().is_empty() && self.is_dimensionless()
    }

    /// Magnitude expressed in the SI base units.
    pub fn base_value(&self) -> f64 {
        self.magnitude * self.unit.scale()
    }

    pub fn to(&self, unit: &Unit) -> Result<Quantity> {
        let factor = self.unit.conversion_factor(unit)?;
        Ok(Quantity {
            magnitude: self.magnitude * factor,
            unit: unit.clone(),
        })
    }

    pub fn to_unit(&self, unit: &str) -> Result<Quantity> {
        self.to(&Unit::parse(unit)?)
    }

    /// Magnitude in the given unit.
    pub fn m_as(&self, unit: &str) -> Result<f64> {
        self.m_as_unit(&Unit::parse(unit)?)
    }

    pub fn m_as_unit(&self, unit: &Unit) -> Result<f64> {
        Ok(self.magnitude * self.unit.conversion_factor(unit)?)
    }

    pub fn try_add(&self, other: &Quantity) -> Result<Quantity> {
        let factor = other.unit.conversion_factor(&self.unit)?;
        Ok(Quantity {
            magnitude: self.magnitude + other.magnitude * factor,
            unit: self.unit.clone(),
        })
    }

    pub fn try_sub(&self, other: &Quantity) -> Result<Quantity> {
        self.try_add(&-other.clone())
    }

    pub fn try_rem(&self, other: &Quantity) -> Result<Quantity> {
        let factor = other.unit.conversion_factor(&self.unit)?;
        Ok(Quantity {
            magnitude: self.magnitude % (other.magnitude * factor),
            unit: self.unit.clone(),
        })
    }

    pub fn try_mul(&self, other: &Quantity) -> Result<Quantity> {
        let unit = self.unit.checked_mul(&other.unit)?;
        Ok(Quantity {
            magnitude: self.magnitude * other.magnitude,
            unit,
        }
        .simplified(self, other))
    }

    pub fn try_div(&self, other: &Quantity) -> Result<Quantity> {
        let unit = self.unit.checked_div(&other.unit)?;
        Ok(Quantity {
            magnitude: self.magnitude / other.magnitude,
            unit,
        }
        .simplified(self, other))
    }

    pub fn powi(&self, n: i64) -> Result<Quantity> {
        Ok(Quantity {
            magnitude: self.magnitude.powi(n as i32),
            unit: self.unit.powi(n)?,
        })
    }

    /// Real-valued power; only defined for dimensionless bases.
    pub fn powf(&self, exponent: f64) -> Result<Quantity> {
        let base = self.require_dimensionless("pow")?;
        Ok(Quantity::dimensionless(base.powf(exponent)))
    }

    /// Value as a plain number, failing for dimensioned quantities.
    pub fn require_dimensionless(&self, op: &str) -> Result<f64> {
        if !self.is_dimensionless() {
            return Err(DimensionalityError::NotDimensionless {
                op: op.to_string(),
                unit: self.unit.symbol().to_string(),
            });
        }
        Ok(self.base_value())
    }

    pub fn try_cmp(&self, other: &Quantity) -> Result<Ordering> {
        let factor = other.unit.conversion_factor(&self.unit)?;
        let a = round_to_significant_digits(self.magnitude, EQUALITY_DIGITS);
        let b = round_to_significant_digits(other.magnitude * factor, EQUALITY_DIGITS);
        Ok(a.partial_cmp(&b).unwrap_or(Ordering::Equal))
    }

    // A product of dimensioned operands that cancels out is a plain number.
    fn simplified(self, lhs: &Quantity, rhs: &Quantity) -> Quantity {
        if self.is_dimensionless() && !(lhs.is_dimensionless() && rhs.is_dimensionless()) {
            Quantity::dimensionless(self.base_value())
        } else {
            self
        }
    }

    fn key(&self) -> (UnitExponents, u64) {
        let value = round_to_significant_digits(self.base_value(), EQUALITY_DIGITS);
        (self.dims(), value.to_bits())
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Quantity {}

impl Hash for Quantity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.try_cmp(other).ok()
    }
}

impl Neg for Quantity {
    type Output = Quantity;

    fn neg(self) -> Quantity {
        Quantity {
            magnitude: -self.magnitude,
            unit: self.unit,
        }
    }
}

impl Mul<f64> for Quantity {
    type Output = Quantity;

    fn mul(self, rhs: f64) -> Quantity {
        Quantity {
            magnitude: self.magnitude * rhs,
            unit: self.unit,
        }
    }
}

impl Div<f64> for Quantity {
    type Output = Quantity;

    fn div(self, rhs: f64) -> Quantity {
        Quantity {
            magnitude: self.magnitude / rhs,
            unit: self.unit,
        }
    }
}

impl Zero for Quantity {
    fn zero() -> Self {
        Quantity::dimensionless(0.0)
    }

    fn is_zero(&self) -> bool {
        self.magnitude == 0.0
    }
}

impl std::ops::Add for Quantity {
    type Output = Quantity;

    /// Addition for `Zero`. Incompatible units keep the left operand.
    fn add(self, rhs: Quantity) -> Quantity {
        if self.is_zero() && self.is_plain_number() {
            return rhs;
        }
        self.try_add(&rhs).unwrap_or(self)
    }
}

impl From<f64> for Quantity {
    fn from(value: f64) -> Self {
        Quantity::dimensionless(value)
    }
}

impl std::str::FromStr for Quantity {
    type Err = DimensionalityError;

    fn from_str(s: &str) -> Result<Self> {
        Quantity::parse(s)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = round_to_significant_digits(self.magnitude, EQUALITY_DIGITS);
        if self.unit.symbol().is_empty() {
            write!(f, "{value}")
        } else {
            write!(f, "{value} {}", self.unit)
        }
    }
}
