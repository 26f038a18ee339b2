// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Reshaping of measurement records into x/y traces.

use std::collections::{HashMap, VecDeque};

use expression::{Evaluator, Value};
use ionpulse_units::Quantity;

use crate::Result;

/// Read access to one measurement record.
pub trait Measurement {
    /// Count values of `channel` in this record.
    fn counts(&self, channel: usize) -> &[u64];
    /// Number of timestamps recorded on `channel`.
    fn timestamp_count(&self, channel: usize) -> usize;
    fn is_final(&self) -> bool;
    fn exitcode(&self) -> Option<u64>;
}

/// How a record is reduced to a y value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvaluation {
    /// Mean of the counts on a channel.
    MeanCount { channel: usize },
    /// Number of timestamps on a channel.
    TimestampCount { channel: usize },
}

impl TraceEvaluation {
    /// `None` when the record has no data for the channel.
    pub fn evaluate(&self, record: &dyn Measurement) -> Option<f64> {
        match *self {
            TraceEvaluation::MeanCount { channel } => {
                let counts = record.counts(channel);
                if counts.is_empty() {
                    return None;
                }
                Some(counts.iter().map(|&c| c as f64).sum::<f64>() / counts.len() as f64)
            }
            TraceEvaluation::TimestampCount { channel } => Some(record.timestamp_count(channel) as f64),
        }
    }
}

/// Maps a scanned value to the plotted x value.
#[derive(Debug, Clone, PartialEq)]
pub struct XTransform {
    expression: Option<String>,
    /// Unit in which untransformed values are plotted.
    unit: Option<String>,
}

impl XTransform {
    pub fn new(expression: Option<&str>) -> Self {
        XTransform {
            expression: expression.map(str::to_string),
            unit: None,
        }
    }

    pub fn in_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    /// Evaluate with `x` bound to `value`.
    pub fn apply(&self, value: &Quantity) -> Result<f64> {
        let value = match &self.expression {
            Some(text) => {
                let scope = HashMap::from([("x".to_string(), Value::Quantity(value.clone()))]);
                match Evaluator::new().evaluate(text, &scope)?.value {
                    Value::Quantity(q) => q,
                    other => Quantity::dimensionless(other.to_f64("x expression")?),
                }
            }
            None => value.clone(),
        };
        match &self.unit {
            Some(unit) if !value.is_plain_number() => Ok(value.m_as(unit)?),
            _ => Ok(value.magnitude()),
        }
    }
}

/// Parallel x and y arrays, optionally keeping only the newest points.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trace {
    x: VecDeque<f64>,
    y: VecDeque<f64>,
    max_points: Option<usize>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    /// A trace that drops its oldest point beyond `max_points`.
    pub fn rolling(max_points: usize) -> Self {
        Trace {
            max_points: Some(max_points),
            ..Self::default()
        }
    }

    pub fn push(&mut self, x: f64, y: f64) {
        self.x.push_back(x);
        self.y.push_back(y);
        if let Some(max) = self.max_points {
            while self.x.len() > max {
                self.x.pop_front();
                self.y.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn x(&self) -> Vec<f64> {
        self.x.iter().copied().collect()
    }

    pub fn y(&self) -> Vec<f64> {
        self.y.iter().copied().collect()
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }

    pub fn clear(&mut self) {
        self.x.clear();
        self.y.clear();
    }
}
