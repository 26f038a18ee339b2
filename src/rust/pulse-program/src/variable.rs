// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use ionpulse_units::Quantity;

/// Top 16 bits of every user exit code.
pub const EXITCODE_PREFIX: u64 = 0xfffe_0000_0000_0000;
/// Exit code of a program that ran to its `END`.
pub const END_OF_RUN: u64 = u64::MAX;
/// Bytes per data-memory word.
pub const DATA_WORD_BYTES: usize = 8;
const EXITCODE_PAYLOAD_MASK: u64 = 0x0000_ffff_ffff_ffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableType {
    Parameter,
    Shutter,
    Trigger,
    /// Mask selecting the active counters.
    Counter,
    /// Storage for a counter reading.
    Count,
    Exitcode,
    Address,
    Const,
}

impl VariableType {
    pub fn as_str(self) -> &'static str {
        match self {
            VariableType::Parameter => "parameter",
            VariableType::Shutter => "shutter",
            VariableType::Trigger => "trigger",
            VariableType::Counter => "counter",
            VariableType::Count => "count",
            VariableType::Exitcode => "exitcode",
            VariableType::Address => "address",
            VariableType::Const => "const",
        }
    }

    /// Types whose value is a bit pattern rather than a physical quantity.
    pub fn is_mask(self) -> bool {
        matches!(
            self,
            VariableType::Shutter | VariableType::Trigger | VariableType::Counter
        )
    }
}

impl FromStr for VariableType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "parameter" => VariableType::Parameter,
            "shutter" | "masked_shutter" => VariableType::Shutter,
            "trigger" => VariableType::Trigger,
            "counter" => VariableType::Counter,
            "count" => VariableType::Count,
            "exitcode" => VariableType::Exitcode,
            "address" => VariableType::Address,
            "const" => VariableType::Const,
            other => return Err(format!("unknown variable type '{other}'")),
        })
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named data-memory cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub var_type: VariableType,
    pub unit: Option<String>,
    pub encoding: Option<String>,
    pub value: Quantity,
    /// Exact bit pattern of a shutter, trigger or counter variable.
    ///
    /// Takes precedence over `value`, which cannot hold all 64 bits.
    pub mask: Option<u64>,
    /// Index of the variable's word in the data image.
    pub slot: usize,
    /// Data-memory byte address, as used in operands and update streams.
    pub address: usize,
    pub enabled: bool,
    pub comment: Option<String>,
    /// Text of the expression that produced `value`, if any.
    pub expression: Option<String>,
}

impl Variable {
    pub fn new(name: &str, var_type: VariableType, value: Quantity) -> Self {
        Variable {
            name: name.to_string(),
            var_type,
            unit: None,
            encoding: None,
            value,
            mask: None,
            slot: 0,
            address: 0,
            enabled: true,
            comment: None,
            expression: None,
        }
    }

    /// Encode the current value into its data-memory word.
    pub fn encode(&self) -> encodings::Result<u64> {
        match self.mask {
            Some(mask) if self.var_type.is_mask() => Ok(mask),
            _ => self.encode_value(&self.value),
        }
    }

    pub(crate) fn place(&mut self, slot: usize) {
        self.slot = slot;
        self.address = slot * DATA_WORD_BYTES;
    }

    pub fn encode_value(&self, value: &Quantity) -> encodings::Result<u64> {
        let encoding = self.encoding.as_deref();
        match self.var_type {
            VariableType::Parameter | VariableType::Const => encodings::encode(value, encoding),
            VariableType::Exitcode => {
                let code = match integral(value) {
                    Some(n) => encodings::encode_integer(n, None)?,
                    None => encodings::encode(value, None)?,
                };
                Ok(EXITCODE_PREFIX | (code & EXITCODE_PAYLOAD_MASK))
            }
            _ => match integral(value) {
                Some(n) => encodings::encode_integer(n, encoding),
                None => encodings::encode(value, encoding),
            },
        }
    }
}

fn integral(value: &Quantity) -> Option<i64> {
    let magnitude = value.magnitude();
    (value.is_plain_number() && magnitude.fract() == 0.0 && magnitude.abs() < 9.2e18)
        .then_some(magnitude as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ionpulse_units::q;

    #[test]
    fn test_exitcode_prefix() {
        let var = Variable::new("done", VariableType::Exitcode, Quantity::dimensionless(3.0));
        assert_eq!(var.encode().unwrap(), 0xfffe_0000_0000_0003);
        let soft_stop = Variable::new(
            "stop",
            VariableType::Exitcode,
            Quantity::dimensionless(0x1000_0000_0000_u64 as f64),
        );
        assert_eq!(soft_stop.encode().unwrap(), 0xfffe_1000_0000_0000);
    }

    #[test]
    fn test_parameter_uses_encoding() {
        let mut var = Variable::new("f", VariableType::Parameter, q(250.0, "MHz").unwrap());
        var.encoding = Some("AD9912_FRQ".to_string());
        assert_eq!(var.encode().unwrap(), 1 << 46);
    }

    #[test]
    fn test_mask_keeps_all_bits() {
        let mut var = Variable::new("shutters", VariableType::Shutter, Quantity::dimensionless(0.0));
        var.mask = Some(0x8000_0000_0000_0001);
        assert_eq!(var.encode().unwrap(), 0x8000_0000_0000_0001);
        var.var_type = VariableType::Parameter;
        assert_eq!(var.encode().unwrap(), 0);
    }

    #[test]
    fn test_type_names_round_trip() {
        for t in ["parameter", "shutter", "trigger", "counter", "count", "exitcode", "address", "const"] {
            assert_eq!(t.parse::<VariableType>().unwrap().as_str(), t);
        }
        assert!("bogus".parse::<VariableType>().is_err());
    }
}
