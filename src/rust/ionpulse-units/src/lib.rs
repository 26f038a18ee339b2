// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Dimensioned scalar arithmetic.
//!
//! A [`Quantity`] is a magnitude attached to a [`Unit`]. Units carry a scale to
//! the SI base and a [`UnitExponents`] vector over eight base dimensions.
//! Operations that would mix incompatible dimensions return a
//! [`DimensionalityError`] instead of panicking.

pub mod dimension;
pub mod quantity;
pub mod unit;

pub use dimension::{BaseDimension, UnitExponents};
pub use quantity::Quantity;
pub use unit::Unit;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DimensionalityError {
    #[error("Cannot convert from '{from}' ({from_dims}) to '{to}' ({to_dims})")]
    Incompatible {
        from: String,
        from_dims: UnitExponents,
        to: String,
        to_dims: UnitExponents,
    },
    #[error("Operation '{op}' requires a dimensionless operand, got '{unit}'")]
    NotDimensionless { op: String, unit: String },
    #[error("Unknown unit '{0}'")]
    UnknownUnit(String),
    #[error("Exponent {0} is out of range for a unit")]
    ExponentOverflow(i64),
}

pub type Result<T, E = DimensionalityError> = std::result::Result<T, E>;

/// Construct a quantity from a magnitude and a unit string.
///
/// ```rust
/// use ionpulse_units::q;
///
/// let f = q(100.0, "MHz").unwrap();
/// assert_eq!(f.m_as("Hz").unwrap(), 100e6);
/// ```
pub fn q(magnitude: f64, unit: &str) -> Result<Quantity> {
    Quantity::new(magnitude, unit)
}
