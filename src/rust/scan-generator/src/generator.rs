// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use ionpulse_units::Quantity;
use pulse_program::{END_OF_RUN, PulseProgram};

use crate::gates::GateSequences;
use crate::scan::Scan;
use crate::stop::{StopHandler, StopReason};
use crate::stream::{UpdateStream, WORDS_PER_UPDATE, ZERO_UPDATE, update_pairs};
use crate::trace::{Measurement, Trace, TraceEvaluation, XTransform};
use crate::Result;

/// Drives one measurement: feeds updates to the device and turns the
/// records coming back into a trace.
pub trait Generator {
    /// Update words that fit into the device FIFO right now.
    fn next_burst(&mut self) -> Vec<u8>;

    /// Limit the words kept in the device FIFO.
    fn set_fifo_capacity(&mut self, words: usize);

    /// Account for a record; returns the point added to the trace, if any.
    fn on_record(&mut self, record: &dyn Measurement) -> Result<Option<(f64, f64)>>;

    fn request_stop(&mut self);

    fn trace(&self) -> &Trace;

    fn is_finished(&self) -> bool;
}

fn stop_reason(record: &dyn Measurement) -> StopReason {
    match record.exitcode() {
        Some(code) if code != END_OF_RUN => StopReason::Exitcode(code),
        _ => StopReason::Completed,
    }
}

/// Scans one parameter over the values of a [`Scan`].
#[derive(Debug)]
pub struct ScanGenerator {
    scan: Scan,
    values: Vec<Quantity>,
    updates: Vec<u64>,
    stream: UpdateStream,
    transform: XTransform,
    evaluation: TraceEvaluation,
    trace: Trace,
    received: usize,
    stop: StopHandler,
}

impl ScanGenerator {
    pub fn new(
        scan: Scan,
        program: &PulseProgram,
        evaluation: TraceEvaluation,
        stop: StopHandler,
    ) -> Result<Self> {
        let values = scan.values()?;
        let words = update_pairs(program, &scan.parameter, &values)?;
        let mut transform = XTransform::new(scan.x_expression.as_deref());
        if !scan.start.unit().symbol().is_empty() {
            transform = transform.in_unit(scan.start.unit().symbol());
        }
        Ok(ScanGenerator {
            scan,
            values,
            stream: UpdateStream::new(words.clone(), WORDS_PER_UPDATE),
            updates: words,
            transform,
            evaluation,
            trace: Trace::new(),
            received: 0,
            stop,
        })
    }

    /// Send a gate sequence after the update of every step.
    ///
    /// Takes either one sequence for all steps or one per step in visiting order.
    pub fn with_gate_sequences(mut self, sequences: &GateSequences) -> Result<Self> {
        let steps = sequences.interleave(&self.updates, WORDS_PER_UPDATE)?;
        let capacity = self.stream.max_in_flight();
        self.stream = UpdateStream::from_steps(steps).with_max_in_flight(capacity);
        Ok(self)
    }

    pub fn scan(&self) -> &Scan {
        &self.scan
    }

    /// Values in the order they are visited.
    pub fn values(&self) -> &[Quantity] {
        &self.values
    }

    pub fn stream(&self) -> &UpdateStream {
        &self.stream
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop.reason()
    }
}

impl Generator for ScanGenerator {
    fn next_burst(&mut self) -> Vec<u8> {
        if self.stop.is_stopped() {
            return Vec::new();
        }
        self.stream.next_burst()
    }

    fn set_fifo_capacity(&mut self, words: usize) {
        self.stream.set_max_in_flight(words);
    }

    fn on_record(&mut self, record: &dyn Measurement) -> Result<Option<(f64, f64)>> {
        if self.stop.is_stopped() {
            return Ok(None);
        }
        let mut point = None;
        if self.received < self.values.len() {
            let y = self.evaluation.evaluate(record);
            if y.is_some() || !record.is_final() {
                let x = self.transform.apply(&self.values[self.received])?;
                let y = y.unwrap_or(f64::NAN);
                self.trace.push(x, y);
                self.stream.step_completed();
                self.received += 1;
                point = Some((x, y));
            }
        }
        if record.is_final() {
            self.stop.stop(stop_reason(record));
        } else if self.received == self.values.len() {
            self.stop.stop(StopReason::Completed);
        }
        Ok(point)
    }

    fn request_stop(&mut self) {
        self.stop.stop(StopReason::UserRequest);
    }

    fn trace(&self) -> &Trace {
        &self.trace
    }

    fn is_finished(&self) -> bool {
        self.stop.is_stopped()
    }
}

/// Repeats a measurement at a fixed setpoint, keeping the newest points.
#[derive(Debug)]
pub struct StepInPlaceGenerator {
    stream: UpdateStream,
    evaluation: TraceEvaluation,
    trace: Trace,
    step: usize,
    stop: StopHandler,
}

impl StepInPlaceGenerator {
    pub fn new(max_points: usize, evaluation: TraceEvaluation, stop: StopHandler) -> Self {
        StepInPlaceGenerator {
            stream: UpdateStream::repeating(ZERO_UPDATE.to_vec()),
            evaluation,
            trace: Trace::rolling(max_points),
            step: 0,
            stop,
        }
    }

    pub fn stream(&self) -> &UpdateStream {
        &self.stream
    }
}

impl Generator for StepInPlaceGenerator {
    fn next_burst(&mut self) -> Vec<u8> {
        if self.stop.is_stopped() {
            return Vec::new();
        }
        self.stream.next_burst()
    }

    fn set_fifo_capacity(&mut self, words: usize) {
        self.stream.set_max_in_flight(words);
    }

    fn on_record(&mut self, record: &dyn Measurement) -> Result<Option<(f64, f64)>> {
        if self.stop.is_stopped() {
            return Ok(None);
        }
        let point = self.evaluation.evaluate(record).map(|y| {
            let x = self.step as f64;
            self.trace.push(x, y);
            self.step += 1;
            self.stream.step_completed();
            (x, y)
        });
        if record.is_final() {
            self.stop.stop(stop_reason(record));
        }
        Ok(point)
    }

    fn request_stop(&mut self) {
        self.stop.stop(StopReason::UserRequest);
    }

    fn trace(&self) -> &Trace {
        &self.trace
    }

    fn is_finished(&self) -> bool {
        self.stop.is_stopped()
    }
}
