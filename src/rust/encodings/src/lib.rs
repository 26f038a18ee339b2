// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Mapping of physical quantities onto device words.
//!
//! Every [`Encoding`] describes how one quantity becomes one unsigned integer:
//! the value is converted into the encoding's unit, divided by the step and
//! rounded half-to-even, offset (for offset-binary), range checked and masked.

pub mod encoding;
pub mod ramp;
pub mod table;

use ionpulse_units::{DimensionalityError, Quantity, UnitExponents};

pub use encoding::{Encoding, Representation};
pub use table::lookup;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EncodingError {
    #[error("Value {value} is out of range [{min}, {max}) for encoding '{encoding}'")]
    OutOfRange {
        encoding: &'static str,
        value: String,
        min: f64,
        max: f64,
    },
    #[error("Unknown encoding '{0}'")]
    UnknownEncoding(String),
    #[error("No default encoding for a quantity of dimension {0}")]
    NoDefaultEncoding(UnitExponents),
    #[error("Value {0} is not finite")]
    NotFinite(f64),
    #[error(transparent)]
    Dimensionality(#[from] DimensionalityError),
}

pub type Result<T, E = EncodingError> = std::result::Result<T, E>;

/// Encoding used for dimensioned values that were declared without one.
fn default_encoding(dims: UnitExponents) -> Result<&'static Encoding> {
    if dims == UnitExponents::TIME {
        lookup(table::TIME)
    } else if dims == UnitExponents::FREQUENCY {
        lookup(table::AD9912_FRQ)
    } else {
        Err(EncodingError::NoDefaultEncoding(dims))
    }
}

fn resolve(value: &Quantity, name: Option<&str>) -> Result<&'static Encoding> {
    match name {
        Some(name) => lookup(name),
        None if value.is_dimensionless() => lookup(table::INT64),
        None => default_encoding(value.dims()),
    }
}

/// Encode a quantity into a device word.
///
/// Plain numbers are taken to be expressed in the encoding's unit already;
/// dimensioned values are converted first. Without an encoding name,
/// dimensionless values go through the 64-bit identity.
pub fn encode(value: &Quantity, name: Option<&str>) -> Result<u64> {
    resolve(value, name)?.encode(value)
}

/// Encode an integer without a round trip through `f64`.
pub fn encode_integer(value: i64, name: Option<&str>) -> Result<u64> {
    match name {
        Some(name) => lookup(name)?.encode_integer(value),
        None => lookup(table::INT64)?.encode_integer(value),
    }
}

/// Decode a device word into a magnitude expressed in the encoding's unit.
pub fn decode(word: u64, name: Option<&str>) -> Result<f64> {
    Ok(lookup(name.unwrap_or(table::INT64))?.decode(word))
}

/// Decode a device word into a quantity carrying the encoding's unit.
pub fn decode_q(word: u64, name: Option<&str>) -> Result<Quantity> {
    lookup(name.unwrap_or(table::INT64))?.decode_q(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ionpulse_units::q;

    #[test]
    fn test_adc7606_offset_range() {
        let name = Some("ADC7606_VOLTAGE_OFFSET");
        assert_eq!(encode(&q(-5.0, "V").unwrap(), name).unwrap(), 0);
        assert_eq!(encode(&q(0.0, "V").unwrap(), name).unwrap(), 0x8000);
        assert!(matches!(
            encode(&q(5.0, "V").unwrap(), name),
            Err(EncodingError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_identity_without_encoding() {
        assert_eq!(encode(&Quantity::dimensionless(42.0), None).unwrap(), 42);
        assert_eq!(
            encode(&Quantity::dimensionless(-1.0), None).unwrap(),
            u64::MAX
        );
        assert_eq!(encode_integer(-2, None).unwrap(), u64::MAX - 1);
        assert_eq!(decode(u64::MAX, None).unwrap(), -1.0);
    }

    #[test]
    fn test_default_encodings() {
        // 1 us in 5 ns ticks
        assert_eq!(encode(&q(1.0, "us").unwrap(), None).unwrap(), 200);
        assert_eq!(
            encode(&q(1.0, "GHz").unwrap(), None),
            Err(EncodingError::OutOfRange {
                encoding: "AD9912_FRQ",
                value: "1 GHz".to_string(),
                min: 0.0,
                max: 1e9,
            })
        );
        assert!(matches!(
            encode(&q(1.0, "V").unwrap(), None),
            Err(EncodingError::NoDefaultEncoding(_))
        ));
    }

    #[test]
    fn test_wrong_dimension() {
        assert!(matches!(
            encode(&q(1.0, "V").unwrap(), Some("AD9912_FRQ")),
            Err(EncodingError::Dimensionality(_))
        ));
    }

    #[test]
    fn test_decode_q_attaches_unit() {
        let word = encode(&q(100.0, "MHz").unwrap(), Some("AD9912_FRQ")).unwrap();
        let value = decode_q(word, Some("AD9912_FRQ")).unwrap();
        assert_eq!(value.unit().symbol(), "Hz");
        assert!((value.m_as("MHz").unwrap() - 100.0).abs() < 1e-5);
    }

    #[test]
    fn test_unknown_encoding() {
        assert_eq!(
            encode_integer(1, Some("NOPE")),
            Err(EncodingError::UnknownEncoding("NOPE".to_string()))
        );
    }
}
