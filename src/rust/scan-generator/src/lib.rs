// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Scans over pulse-program parameters.
//!
//! A [`Scan`] describes which values a parameter takes and in what order.
//! The generators turn that into bursts of `(address, value)` update words
//! sized to the device input FIFO, optionally followed by gate sequences,
//! and fold the records coming back into
//! an x/y [`Trace`].

pub mod gates;
pub mod generator;
pub mod scan;
pub mod stop;
pub mod stream;
pub mod trace;

use expression::ExpressionError;
use ionpulse_units::DimensionalityError;

pub use gates::GateSequences;
pub use generator::{Generator, ScanGenerator, StepInPlaceGenerator};
pub use scan::{Scan, ScanType, Steps, center_out_order};
pub use stop::{StopHandler, StopReason};
pub use stream::{MAX_WORDS_IN_FIFO, UpdateStream, ZERO_UPDATE, update_pairs};
pub use trace::{Measurement, Trace, TraceEvaluation, XTransform};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid scan: {0}")]
    InvalidScan(String),
    #[error(transparent)]
    Dimensionality(#[from] DimensionalityError),
    #[error(transparent)]
    Expression(#[from] ExpressionError),
    #[error(transparent)]
    Program(#[from] pulse_program::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
