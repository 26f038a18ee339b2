// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use ionpulse_units::q;
use pulse_program::{END_OF_RUN, PulseProgram};
use scan_generator::{
    Generator, Measurement, Scan, ScanGenerator, ScanType, StopHandler, StopReason, Steps,
    TraceEvaluation,
};
use std::sync::{Arc, Mutex};

struct Counts {
    values: Vec<u64>,
    exitcode: Option<u64>,
}

impl Measurement for Counts {
    fn counts(&self, channel: usize) -> &[u64] {
        if channel == 0 { &self.values } else { &[] }
    }

    fn timestamp_count(&self, _channel: usize) -> usize {
        0
    }

    fn is_final(&self) -> bool {
        self.exitcode.is_some()
    }

    fn exitcode(&self) -> Option<u64> {
        self.exitcode
    }
}

fn program() -> PulseProgram {
    let mut program = PulseProgram::default();
    program
        .load_text(
            "scan.pp",
            "var duration 10 us, parameter, us, TIME\nvar freq 100 MHz, parameter, MHz, AD9912_FRQ\nUPDATE duration\nDDSFRQ 0, freq\nEND\n",
        )
        .unwrap();
    program.assemble().unwrap();
    program
}

fn words(burst: &[u8]) -> Vec<u64> {
    burst
        .chunks_exact(8)
        .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

#[test]
fn test_frequency_scan_updates_and_trace() {
    let program = program();
    let address = program.variable("freq").unwrap().address as u64;
    let scan = Scan::new(
        "freq",
        q(100.0, "MHz").unwrap(),
        q(110.0, "MHz").unwrap(),
        Steps::Count(11),
    );
    let reasons = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reasons);
    let mut generator = ScanGenerator::new(
        scan,
        &program,
        TraceEvaluation::MeanCount { channel: 0 },
        StopHandler::new(move |reason| sink.lock().unwrap().push(reason)),
    )
    .unwrap();

    let words = words(&generator.next_burst());
    assert_eq!(words.len(), 22);
    let expected = program
        .variable_scan_code("freq", generator.values())
        .unwrap();
    assert_eq!(words, expected);
    assert!(words.iter().step_by(2).all(|&a| a == address));
    assert!(generator.next_burst().is_empty());

    for step in 0..10 {
        let record = Counts {
            values: vec![step, step + 2],
            exitcode: None,
        };
        generator.on_record(&record).unwrap();
    }
    assert!(!generator.is_finished());
    // The last step arrives together with the end of the run.
    let last = Counts {
        values: vec![40],
        exitcode: Some(END_OF_RUN),
    };
    assert_eq!(generator.on_record(&last).unwrap(), Some((110.0, 40.0)));
    assert!(generator.is_finished());
    assert_eq!(*reasons.lock().unwrap(), vec![StopReason::Completed]);

    let trace = generator.trace();
    assert_eq!(trace.len(), 11);
    assert_eq!(trace.x()[..3], [100.0, 101.0, 102.0]);
    assert_eq!(trace.y()[..3], [1.0, 2.0, 3.0]);
}

#[test]
fn test_randomized_scan_is_reproducible() {
    let scan = Scan::new(
        "freq",
        q(100.0, "MHz").unwrap(),
        q(110.0, "MHz").unwrap(),
        Steps::Size(q(1.0, "MHz").unwrap()),
    )
    .with_type(ScanType::Randomized)
    .with_seed(7);
    let first = scan.values().unwrap();
    let second = scan.values().unwrap();
    assert_eq!(first, second);
    let mut sorted: Vec<f64> = first.iter().map(|v| v.m_as("MHz").unwrap()).collect();
    sorted.sort_by(f64::total_cmp);
    let expected: Vec<f64> = (100..=110).map(f64::from).collect();
    for (a, b) in sorted.iter().zip(&expected) {
        assert!((a - b).abs() < 1e-9);
    }
}
