// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Scan descriptions and the ordered list of values they visit.

use std::fmt;
use std::str::FromStr;

use ionpulse_units::Quantity;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScanType {
    #[default]
    LinearUp,
    LinearDown,
    Randomized,
    CenterOut,
    LinearUpDown,
    LinearDownUp,
}

impl ScanType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanType::LinearUp => "LinearUp",
            ScanType::LinearDown => "LinearDown",
            ScanType::Randomized => "Randomized",
            ScanType::CenterOut => "CenterOut",
            ScanType::LinearUpDown => "LinearUpDown",
            ScanType::LinearDownUp => "LinearDownUp",
        }
    }
}

impl FromStr for ScanType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "LinearUp" => ScanType::LinearUp,
            "LinearDown" => ScanType::LinearDown,
            "Randomized" => ScanType::Randomized,
            "CenterOut" => ScanType::CenterOut,
            "LinearUpDown" => ScanType::LinearUpDown,
            "LinearDownUp" => ScanType::LinearDownUp,
            other => return Err(Error::InvalidScan(format!("unknown scan type '{other}'"))),
        })
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of points, or distance between points.
#[derive(Debug, Clone, PartialEq)]
pub enum Steps {
    Count(usize),
    Size(Quantity),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    pub parameter: String,
    pub start: Quantity,
    pub stop: Quantity,
    pub steps: Steps,
    pub scan_type: ScanType,
    /// Shuffle seed for [`ScanType::Randomized`]; fresh entropy when `None`.
    pub seed: Option<u64>,
    /// Maps the scanned value `x` to the plotted x value.
    pub x_expression: Option<String>,
}

impl Scan {
    pub fn new(parameter: &str, start: Quantity, stop: Quantity, steps: Steps) -> Self {
        Scan {
            parameter: parameter.to_string(),
            start,
            stop,
            steps,
            scan_type: ScanType::default(),
            seed: None,
            x_expression: None,
        }
    }

    pub fn with_type(mut self, scan_type: ScanType) -> Self {
        self.scan_type = scan_type;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_x_expression(mut self, expression: &str) -> Self {
        self.x_expression = Some(expression.to_string());
        self
    }

    /// The ascending-index progression from `start` to `stop`.
    pub fn progression(&self) -> Result<Vec<Quantity>> {
        let unit = self.start.unit().clone();
        let start = self.start.magnitude();
        let stop = self.stop.to(&unit)?.magnitude();
        let count = match &self.steps {
            Steps::Count(count) => *count,
            Steps::Size(size) => {
                let size = size.to(&unit)?.magnitude().abs();
                if size == 0.0 || !size.is_finite() {
                    return Err(Error::InvalidScan(format!("invalid step size {size}")));
                }
                // Tolerate rounding so that 1 MHz in 0.1 MHz steps has 11 points.
                ((stop - start).abs() / size + 1e-9).floor() as usize + 1
            }
        };
        if count == 0 {
            return Err(Error::InvalidScan("a scan needs at least one point".to_string()));
        }
        if count == 1 {
            return Ok(vec![self.start.clone()]);
        }
        let increment = match &self.steps {
            Steps::Count(_) => (stop - start) / (count - 1) as f64,
            Steps::Size(size) => size.to(&unit)?.magnitude().abs().copysign(stop - start),
        };
        Ok((0..count)
            .map(|i| {
                let value = if i + 1 == count && matches!(self.steps, Steps::Count(_)) {
                    stop
                } else {
                    start + i as f64 * increment
                };
                Quantity::with_unit(value, unit.clone())
            })
            .collect())
    }

    /// Values in visiting order.
    pub fn values(&self) -> Result<Vec<Quantity>> {
        let mut values = self.progression()?;
        match self.scan_type {
            ScanType::LinearUp => {}
            ScanType::LinearDown => values.reverse(),
            ScanType::Randomized => {
                let mut rng = match self.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                values.shuffle(&mut rng);
            }
            ScanType::CenterOut => {
                values = center_out_order(values.len())
                    .into_iter()
                    .map(|i| values[i].clone())
                    .collect();
            }
            ScanType::LinearUpDown => values = there_and_back(values),
            ScanType::LinearDownUp => {
                values.reverse();
                values = there_and_back(values);
            }
        }
        Ok(values)
    }
}

/// `[mid, mid+1, mid-1, mid+2, mid-2, ...]`, starting in the upper half for even lengths.
pub fn center_out_order(len: usize) -> Vec<usize> {
    let mid = len / 2;
    let mut order = Vec::with_capacity(len);
    if len == 0 {
        return order;
    }
    order.push(mid);
    for distance in 1..=mid + 1 {
        if mid + distance < len {
            order.push(mid + distance);
        }
        if distance <= mid {
            order.push(mid - distance);
        }
    }
    order
}

/// Forward then reverse, visiting the turning point once when both ends
/// of the fold agree within one step.
fn there_and_back(forward: Vec<Quantity>) -> Vec<Quantity> {
    let step = match forward.as_slice() {
        [first, second, ..] => (second.magnitude() - first.magnitude()).abs(),
        _ => return forward,
    };
    let mut backward: Vec<Quantity> = forward.iter().rev().cloned().collect();
    let turn_matches = match (forward.last(), backward.first()) {
        (Some(a), Some(b)) => (a.magnitude() - b.magnitude()).abs() < step,
        _ => false,
    };
    if turn_matches {
        backward.remove(0);
    }
    let mut values = forward;
    values.extend(backward);
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use ionpulse_units::q;
    use proptest::prelude::*;

    fn mhz(values: &[Quantity]) -> Vec<f64> {
        values.iter().map(|v| v.m_as("MHz").unwrap()).collect()
    }

    fn scan(steps: usize, scan_type: ScanType) -> Scan {
        Scan::new(
            "freq",
            q(100.0, "MHz").unwrap(),
            q(110.0, "MHz").unwrap(),
            Steps::Count(steps),
        )
        .with_type(scan_type)
    }

    #[test]
    fn test_linear() {
        let values = scan(11, ScanType::LinearUp).values().unwrap();
        assert_eq!(
            mhz(&values),
            (100..=110).map(f64::from).collect::<Vec<_>>()
        );
        let down = scan(11, ScanType::LinearDown).values().unwrap();
        assert_eq!(mhz(&down)[0], 110.0);
        assert_eq!(mhz(&down)[10], 100.0);
        assert_eq!(scan(1, ScanType::LinearUp).values().unwrap().len(), 1);
    }

    #[test]
    fn test_step_size() {
        let scan = Scan::new(
            "t",
            q(0.0, "us").unwrap(),
            q(1.0, "us").unwrap(),
            Steps::Size(q(100.0, "ns").unwrap()),
        );
        let values = scan.values().unwrap();
        assert_eq!(values.len(), 11);
        assert_eq!(values[10], q(1.0, "us").unwrap());
    }

    #[test]
    fn test_center_out() {
        assert_eq!(center_out_order(10), vec![5, 6, 4, 7, 3, 8, 2, 9, 1, 0]);
        assert_eq!(center_out_order(5), vec![2, 3, 1, 4, 0]);
        assert_eq!(center_out_order(1), vec![0]);
        assert!(center_out_order(0).is_empty());
    }

    #[test]
    fn test_up_down() {
        let values = scan(3, ScanType::LinearUpDown).values().unwrap();
        assert_eq!(mhz(&values), vec![100.0, 105.0, 110.0, 105.0, 100.0]);
        let values = scan(3, ScanType::LinearDownUp).values().unwrap();
        assert_eq!(mhz(&values), vec![110.0, 105.0, 100.0, 105.0, 110.0]);
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let a = scan(20, ScanType::Randomized).with_seed(7).values().unwrap();
        let b = scan(20, ScanType::Randomized).with_seed(7).values().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_scan_type_names() {
        for scan_type in [
            ScanType::LinearUp,
            ScanType::LinearDown,
            ScanType::Randomized,
            ScanType::CenterOut,
            ScanType::LinearUpDown,
            ScanType::LinearDownUp,
        ] {
            assert_eq!(scan_type.as_str().parse::<ScanType>().unwrap(), scan_type);
        }
        assert!("Sideways".parse::<ScanType>().is_err());
    }

    fn any_scan_type() -> impl Strategy<Value = ScanType> {
        prop_oneof![
            Just(ScanType::LinearUp),
            Just(ScanType::LinearDown),
            Just(ScanType::Randomized),
            Just(ScanType::CenterOut),
            Just(ScanType::LinearUpDown),
            Just(ScanType::LinearDownUp),
        ]
    }

    proptest! {
        #[test]
        fn test_visits_every_point(steps in 1usize..60, scan_type in any_scan_type(), seed in any::<u64>()) {
            let scan = scan(steps, scan_type).with_seed(seed);
            let expected = mhz(&scan.progression().unwrap());
            let mut visited = mhz(&scan.values().unwrap());
            visited.sort_by(f64::total_cmp);
            if matches!(scan_type, ScanType::LinearUpDown | ScanType::LinearDownUp) {
                visited.dedup();
            }
            prop_assert_eq!(visited, expected);
        }
    }
}
