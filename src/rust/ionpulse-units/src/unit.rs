// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use crate::dimension::UnitExponents;
use crate::{DimensionalityError, Result};

pub(crate) fn round_to_significant_digits(x: f64, n: u32) -> f64 {
    if x == 0.0 || !x.is_finite() {
        // normalizes -0.0 as well
        if x == 0.0 { 0.0 } else { x }
    } else {
        let order = x.abs().log10().floor();
        let scale = 10f64.powf((n as f64) - 1.0 - order);
        (x * scale).round() / scale
    }
}

/// A unit: printable symbol, scale to the SI base, and dimensions.
#[derive(Debug, Clone)]
pub struct Unit {
    symbol: String,
    scale: f64,
    dims: UnitExponents,
}

struct UnitDef {
    symbol: &'static str,
    scale: f64,
    dims: UnitExponents,
    prefixable: bool,
}

const fn def(symbol: &'static str, scale: f64, dims: UnitExponents, prefixable: bool) -> UnitDef {
    UnitDef {
        symbol,
        scale,
        dims,
        prefixable,
    }
}

// Longest symbols first, so that "min" is not read as milli-"in" etc.
static UNITS: &[UnitDef] = &[
    def("mol", 1.0, UnitExponents::AMOUNT, true),
    def("min", 60.0, UnitExponents::TIME, false),
    def("Ohm", 1.0, UnitExponents::RESISTANCE, true),
    def("deg", std::f64::consts::PI / 180.0, UnitExponents::DIMENSIONLESS, false),
    def("rad", 1.0, UnitExponents::DIMENSIONLESS, false),
    def("Hz", 1.0, UnitExponents::FREQUENCY, true),
    def("hr", 3600.0, UnitExponents::TIME, false),
    def("cd", 1.0, UnitExponents::LUMINOSITY, true),
    def("s", 1.0, UnitExponents::TIME, true),
    def("h", 3600.0, UnitExponents::TIME, false),
    def("m", 1.0, UnitExponents::LENGTH, true),
    def("g", 1e-3, UnitExponents::MASS, true),
    def("A", 1.0, UnitExponents::CURRENT, true),
    def("V", 1.0, UnitExponents::VOLTAGE, true),
    def("W", 1.0, UnitExponents::POWER, true),
    def("K", 1.0, UnitExponents::TEMPERATURE, true),
];

static PREFIXES: &[(&str, f64)] = &[
    ("da", 1e1),
    ("Y", 1e24),
    ("Z", 1e21),
    ("E", 1e18),
    ("P", 1e15),
    ("T", 1e12),
    ("G", 1e9),
    ("M", 1e6),
    ("k", 1e3),
    ("h", 1e2),
    ("d", 1e-1),
    ("c", 1e-2),
    ("m", 1e-3),
    ("u", 1e-6),
    ("µ", 1e-6),
    ("n", 1e-9),
    ("p", 1e-12),
    ("f", 1e-15),
    ("a", 1e-18),
];

fn lookup_simple(symbol: &str) -> Option<Unit> {
    for def in UNITS {
        if def.symbol == symbol {
            return Some(Unit {
                symbol: symbol.to_string(),
                scale: def.scale,
                dims: def.dims,
            });
        }
    }
    for (prefix, factor) in PREFIXES {
        if let Some(rest) = symbol.strip_prefix(prefix) {
            if let Some(def) = UNITS.iter().find(|d| d.symbol == rest && d.prefixable) {
                return Some(Unit {
                    symbol: symbol.to_string(),
                    scale: factor * def.scale,
                    dims: def.dims,
                });
            }
        }
    }
    None
}

impl Unit {
    pub fn dimensionless() -> Self {
        Unit {
            symbol: String::new(),
            scale: 1.0,
            dims: UnitExponents::DIMENSIONLESS,
        }
    }

    /// Parse a unit string such as `MHz`, `V/s`, `m^2` or `1/s`.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Unit::dimensionless());
        }
        if let Some(unit) = lookup_simple(text) {
            return Ok(unit);
        }
        let normalized: String = text.replace("**", "^").split_whitespace().collect();
        let mut unit = Unit::dimensionless();
        let mut divide = false;
        let mut term = String::new();
        for c in normalized.chars() {
            if c == '*' || c == '/' {
                unit = unit.apply_term(&term, divide, text)?;
                term.clear();
                divide = c == '/';
            } else {
                term.push(c);
            }
        }
        unit = unit.apply_term(&term, divide, text)?;
        unit.symbol = text.to_string();
        Ok(unit)
    }

    fn apply_term(self, term: &str, divide: bool, whole: &str) -> Result<Self> {
        let unknown = || DimensionalityError::UnknownUnit(whole.to_string());
        if term == "1" && !divide {
            return Ok(self);
        }
        if term.is_empty() {
            return Err(unknown());
        }
        let (base, exponent) = match term.split_once('^') {
            Some((base, exp)) => (base, exp.parse::<i64>().map_err(|_| unknown())?),
            None => (term, 1),
        };
        let factor = lookup_simple(base).ok_or_else(unknown)?.powi(exponent)?;
        if divide {
            self.checked_div(&factor)
        } else {
            self.checked_mul(&factor)
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn dims(&self) -> UnitExponents {
        self.dims
    }

    pub fn is_dimensionless(&self) -> bool {
        self.dims.is_dimensionless()
    }

    pub fn checked_mul(&self, other: &Unit) -> Result<Unit> {
        Ok(Unit {
            symbol: join_symbols(&self.symbol, "*", &other.symbol),
            scale: self.scale * other.scale,
            dims: self.dims.checked_mul(other.dims)?,
        })
    }

    pub fn checked_div(&self, other: &Unit) -> Result<Unit> {
        let symbol = if self.symbol.is_empty() && !other.symbol.is_empty() {
            format!("1/{}", other.symbol)
        } else {
            join_symbols(&self.symbol, "/", &other.symbol)
        };
        Ok(Unit {
            symbol,
            scale: self.scale / other.scale,
            dims: self.dims.checked_div(other.dims)?,
        })
    }

    pub fn powi(&self, n: i64) -> Result<Unit> {
        let symbol = match (self.symbol.is_empty(), n) {
            (true, _) | (false, 1) => self.symbol.clone(),
            _ => format!("{}^{}", self.symbol, n),
        };
        Ok(Unit {
            symbol,
            scale: self.scale.powi(n as i32),
            dims: self.dims.checked_pow(n)?,
        })
    }

    /// Factor that converts a magnitude in `self` into a magnitude in `other`.
    pub fn conversion_factor(&self, other: &Unit) -> Result<f64> {
        if self.dims != other.dims {
            return Err(DimensionalityError::Incompatible {
                from: self.symbol.clone(),
                from_dims: self.dims,
                to: other.symbol.clone(),
                to_dims: other.dims,
            });
        }
        Ok(self.scale / other.scale)
    }
}

fn join_symbols(a: &str, op: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => String::new(),
        (false, true) => a.to_string(),
        (true, false) => b.to_string(),
        (false, false) => format!("{a}{op}{b}"),
    }
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.dims == other.dims
            && round_to_significant_digits(self.scale, 12)
                == round_to_significant_digits(other.scale, 12)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

impl std::str::FromStr for Unit {
    type Err = DimensionalityError;

    fn from_str(s: &str) -> Result<Self> {
        Unit::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::BaseDimension;

    #[test]
    fn test_prefixes() {
        let mhz = Unit::parse("MHz").unwrap();
        assert_eq!(mhz.scale(), 1e6);
        assert_eq!(mhz.dims(), UnitExponents::FREQUENCY);

        let ms = Unit::parse("ms").unwrap();
        assert_eq!(ms.scale(), 1e-3);
        assert_eq!(ms.dims(), UnitExponents::TIME);

        let mm = Unit::parse("mm").unwrap();
        assert_eq!(mm.dims(), UnitExponents::LENGTH);
    }

    #[test]
    fn test_special_symbols() {
        assert_eq!(Unit::parse("min").unwrap().scale(), 60.0);
        assert_eq!(Unit::parse("hr").unwrap().scale(), 3600.0);
        assert_eq!(Unit::parse("mol").unwrap().dims(), UnitExponents::AMOUNT);
        assert!(Unit::parse("deg").unwrap().is_dimensionless());
        assert!(Unit::parse("kmin").is_err());
    }

    #[test]
    fn test_compound() {
        let rate = Unit::parse("V/us").unwrap();
        assert_eq!(
            rate.dims(),
            UnitExponents::VOLTAGE
                .checked_div(UnitExponents::TIME)
                .unwrap()
        );
        assert_eq!(rate.scale(), 1e6);
        assert_eq!(rate.symbol(), "V/us");

        let inverse = Unit::parse("1/s").unwrap();
        assert_eq!(inverse, Unit::parse("Hz").unwrap());

        let area = Unit::parse("m^2").unwrap();
        assert_eq!(area.dims().exponent(BaseDimension::Length), 2);
        assert_eq!(Unit::parse("m**2").unwrap(), area);
    }

    #[test]
    fn test_unknown() {
        assert!(matches!(
            Unit::parse("furlong"),
            Err(DimensionalityError::UnknownUnit(_))
        ));
    }

    #[test]
    fn test_conversion_factor() {
        let ghz = Unit::parse("GHz").unwrap();
        let mhz = Unit::parse("MHz").unwrap();
        assert_eq!(ghz.conversion_factor(&mhz).unwrap(), 1e3);
        assert!(ghz.conversion_factor(&Unit::parse("V").unwrap()).is_err());
    }

    #[test]
    fn test_round_to_significant_digits() {
        assert_eq!(round_to_significant_digits(1.0000000000000002, 12), 1.0);
        assert_eq!(round_to_significant_digits(-0.0, 12), 0.0);
        assert_eq!(round_to_significant_digits(123456.0, 3), 123000.0);
    }
}
