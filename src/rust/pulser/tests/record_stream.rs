// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use proptest::prelude::*;
use pulser::telemetry::words;
use pulser::{EngineSettings, RecordAssembler, TelemetryRecord};

fn run_stream(counts: &[Vec<u64>], exitcode: Option<u64>) -> Vec<u64> {
    let mut stream = Vec::new();
    for (step, step_counts) in counts.iter().enumerate() {
        stream.extend(words::scan_value(step as u64));
        stream.extend(step_counts.iter().map(|&count| words::count(0, count)));
    }
    stream.push(exitcode.map_or_else(words::end_of_run, words::exitcode));
    stream
}

fn assemble(bytes: &[u8], chunk: usize) -> (Vec<TelemetryRecord>, usize) {
    let mut assembler = RecordAssembler::new(&EngineSettings::default());
    let records = bytes.chunks(chunk).flat_map(|piece| assembler.feed(piece)).collect();
    (records, assembler.residual_len())
}

proptest! {
    #[test]
    fn test_one_final_record_per_run(
        counts in prop::collection::vec(prop::collection::vec(0u64..1 << 40, 0..5), 1..20),
        exitcode in prop::option::of(0u64..1 << 48),
        chunk in 1usize..64,
    ) {
        let bytes = words::to_bytes(&run_stream(&counts, exitcode));
        let (records, residual) = assemble(&bytes, chunk);
        prop_assert_eq!(residual, 0);
        prop_assert_eq!(records.len(), counts.len());
        prop_assert_eq!(records.iter().filter(|record| record.is_final).count(), 1);
        prop_assert!(records.last().is_some_and(|record| record.is_final));
        for (record, expected) in records.iter().zip(&counts) {
            prop_assert_eq!(record.counts.first().cloned().unwrap_or_default(), expected.clone());
        }
    }

    #[test]
    fn test_chunking_does_not_change_records(
        counts in prop::collection::vec(prop::collection::vec(0u64..1000, 0..5), 1..10),
        chunk in 1usize..32,
    ) {
        let bytes = words::to_bytes(&run_stream(&counts, None));
        let (whole, _) = assemble(&bytes, bytes.len());
        let (split, _) = assemble(&bytes, chunk);
        let strip = |records: Vec<TelemetryRecord>| -> Vec<_> {
            records.into_iter().map(|record| (record.scan_value, record.counts, record.is_final)).collect()
        };
        prop_assert_eq!(strip(whole), strip(split));
    }
}
