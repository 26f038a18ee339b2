// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use crate::encoding::{Encoding, Representation};
use crate::{EncodingError, Result};

pub const AD9912_FRQ: &str = "AD9912_FRQ";
pub const TIME: &str = "TIME";
pub const INT64: &str = "INT64";

const GHZ: f64 = 1e9;

pub static ENCODINGS: [Encoding; 16] = [
    Encoding::unsigned(AD9912_FRQ, 48, "Hz", GHZ),
    Encoding::signed(
        "AD9912_FRQ_SIGNED",
        48,
        "Hz",
        GHZ / 2.0,
        Representation::TwosComplement,
    )
    .with_mask_bits(64),
    Encoding::unsigned("AD9910_FRQ", 32, "Hz", GHZ),
    Encoding::unsigned("AD9912_PHASE", 14, "deg", 360.0).periodic(),
    Encoding::unsigned("AD9910_PHASE", 16, "deg", 360.0).periodic(),
    Encoding::unsigned("AD9910_AMPLITUDE", 14, "", 1.0),
    Encoding::unsigned("ADC_VOLTAGE", 12, "V", 5.0),
    Encoding::unsigned("ADCTI122S101_VOLTAGE", 12, "V", 3.33),
    Encoding::unsigned("DAC8568_VOLTAGE", 16, "V", 5.0),
    Encoding::signed("AD5791_VOLTAGE", 20, "V", 5.0, Representation::TwosComplement),
    Encoding::signed("ADC24_VOLTAGE", 24, "V", 5.0, Representation::TwosComplement),
    Encoding::signed("ADC7606_VOLTAGE", 16, "V", 5.0, Representation::TwosComplement),
    Encoding::signed(
        "ADC7606_VOLTAGE_OFFSET",
        16,
        "V",
        5.0,
        Representation::Offset,
    ),
    // 48 bit timer counting 5 ns clock cycles
    Encoding::unsigned(TIME, 48, "ns", 5.0 * 281_474_976_710_656.0).with_step(5.0),
    Encoding::unsigned("UINT64", 64, "", 18_446_744_073_709_551_616.0).with_step(1.0),
    Encoding::signed(
        INT64,
        64,
        "",
        9_223_372_036_854_775_808.0,
        Representation::TwosComplement,
    )
    .with_step(1.0),
];

pub fn lookup(name: &str) -> Result<&'static Encoding> {
    ENCODINGS
        .iter()
        .find(|enc| enc.name == name)
        .ok_or_else(|| EncodingError::UnknownEncoding(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_unique() {
        for (i, enc) in ENCODINGS.iter().enumerate() {
            assert!(ENCODINGS[i + 1..].iter().all(|other| other.name != enc.name));
        }
    }

    #[test]
    fn test_steps() {
        assert_eq!(lookup(TIME).unwrap().step, 5.0);
        assert_eq!(lookup("ADC_VOLTAGE").unwrap().step, 5.0 / 4096.0);
        assert_eq!(lookup("AD9910_PHASE").unwrap().step, 360.0 / 65536.0);
    }
}
