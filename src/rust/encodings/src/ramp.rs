// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Parameters of the AD9910 digital ramp generator.

use ionpulse_units::Quantity;

use crate::{EncodingError, Result, lookup};

/// Which DDS parameter the ramp generator drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampTarget {
    Frequency,
    Phase,
    Amplitude,
}

/// Period of the AD9910 sync clock driving the ramp rate counter.
const SYNC_CLOCK_NS: f64 = 4.0;

/// 32-bit step size word for a ramp driving `target`.
///
/// Frequency steps use the 32-bit frequency tuning word; phase and amplitude
/// steps are left-aligned in the 32-bit register. A plain integer step is
/// written to the register untouched, for every target.
pub fn ramp_step_word(step: &Quantity, target: RampTarget) -> Result<u32> {
    let magnitude = step.magnitude();
    if step.is_plain_number() && magnitude.fract() == 0.0 {
        return u32::try_from(magnitude as i64).map_err(|_| EncodingError::OutOfRange {
            encoding: "AD9910_RAMP_STEP",
            value: step.to_string(),
            min: 0.0,
            max: u32::MAX as f64 + 1.0,
        });
    }
    let word = match target {
        RampTarget::Frequency => lookup("AD9910_FRQ")?.encode(step)?,
        RampTarget::Phase => lookup("AD9910_PHASE")?.encode(step)? << 16,
        RampTarget::Amplitude => lookup("AD9910_AMPLITUDE")?.encode(step)? << 18,
    };
    Ok(word as u32)
}

/// 16-bit ramp rate word: the number of sync clock cycles per ramp step.
pub fn ramp_rate_word(interval: &Quantity) -> Result<u16> {
    let ns = interval.m_as("ns")?;
    let cycles = (ns / SYNC_CLOCK_NS).round_ties_even();
    if !(1.0..=u16::MAX as f64).contains(&cycles) {
        return Err(EncodingError::OutOfRange {
            encoding: "AD9910_RAMP_RATE",
            value: interval.to_string(),
            min: SYNC_CLOCK_NS,
            max: SYNC_CLOCK_NS * (u16::MAX as f64 + 1.0),
        });
    }
    Ok(cycles as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ionpulse_units::q;

    #[test]
    fn test_frequency_step() {
        let word = ramp_step_word(&q(1.0, "MHz").unwrap(), RampTarget::Frequency).unwrap();
        assert_eq!(word, 4_294_967);
    }

    #[test]
    fn test_phase_step_left_aligned() {
        let word = ramp_step_word(&q(90.0, "deg").unwrap(), RampTarget::Phase).unwrap();
        assert_eq!(word, 0x4000 << 16);
    }

    #[test]
    fn test_integer_step_overrides_formula() {
        for target in [RampTarget::Frequency, RampTarget::Phase, RampTarget::Amplitude] {
            let word = ramp_step_word(&Quantity::dimensionless(7.0), target).unwrap();
            assert_eq!(word, 7);
        }
    }

    #[test]
    fn test_ramp_rate() {
        assert_eq!(ramp_rate_word(&q(1.0, "us").unwrap()).unwrap(), 250);
        assert!(ramp_rate_word(&q(1.0, "s").unwrap()).is_err());
    }
}
