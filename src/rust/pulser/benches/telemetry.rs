// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use pulser::telemetry::words;
use pulser::{EngineSettings, RecordAssembler, TelemetryDecoder};

fn stream(steps: u64) -> Vec<u8> {
    let mut telemetry = Vec::new();
    for step in 0..steps {
        telemetry.extend(words::scan_value(step));
        for tick in 0..20 {
            telemetry.push(words::timestamp(1, step * 1000 + tick));
        }
        telemetry.push(words::count(0, step));
        telemetry.extend(words::result(2, -(step as i64)));
    }
    telemetry.push(words::end_of_run());
    words::to_bytes(&telemetry)
}

fn telemetry_decoding(c: &mut Criterion) {
    let bytes = stream(1000);
    c.bench_function("decode_tokens", |b| {
        b.iter(|| {
            let mut decoder = TelemetryDecoder::new();
            let mut tokens = Vec::new();
            decoder.feed(black_box(&bytes), &mut tokens);
            tokens
        })
    });
    c.bench_function("assemble_records", |b| {
        b.iter(|| {
            let mut assembler = RecordAssembler::new(&EngineSettings::default());
            black_box(&bytes)
                .chunks(4096)
                .map(|chunk| assembler.feed(chunk).len())
                .sum::<usize>()
        })
    });
}

criterion_group!(benches, telemetry_decoding);
criterion_main!(benches);
