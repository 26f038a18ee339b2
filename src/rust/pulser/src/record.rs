// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Reassembly of telemetry tokens into measurement records.

use std::time::{Duration, Instant, SystemTime};

use ionpulse_log::{diagnostic, warn};
use pulse_program::END_OF_RUN;
use scan_generator::Measurement;

use crate::clock::{TimeSync, now_ns};
use crate::settings::EngineSettings;
use crate::telemetry::{TelemetryDecoder, Token};

/// Everything the device reported between two record boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub counts: Vec<Vec<u64>>,
    /// Per channel, one list of timestamps (ns) per gate window.
    pub timestamps: Vec<Vec<Vec<u64>>>,
    pub results: Vec<Vec<i64>>,
    pub dedicated_results: Vec<Vec<u64>>,
    pub adc: Vec<Option<f64>>,
    /// Wall-clock ticks, host time in ns.
    pub time_ticks: Vec<Vec<u64>>,
    pub other: Vec<u64>,
    /// Raw scan tag value of this step.
    pub scan_value: Option<u64>,
    pub dependent_values: Vec<u64>,
    pub is_final: bool,
    pub exitcode: Option<u64>,
    pub overrun: bool,
    pub timing_violations: Vec<u16>,
    pub external_status: Option<u16>,
    pub created: SystemTime,
}

impl Default for TelemetryRecord {
    fn default() -> Self {
        TelemetryRecord {
            counts: Vec::new(),
            timestamps: Vec::new(),
            results: Vec::new(),
            dedicated_results: Vec::new(),
            adc: Vec::new(),
            time_ticks: Vec::new(),
            other: Vec::new(),
            scan_value: None,
            dependent_values: Vec::new(),
            is_final: false,
            exitcode: None,
            overrun: false,
            timing_violations: Vec::new(),
            external_status: None,
            created: SystemTime::now(),
        }
    }
}

impl TelemetryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// No data arrived since the record was opened.
    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(Vec::is_empty)
            && self.timestamps.iter().flatten().all(Vec::is_empty)
            && self.results.iter().all(Vec::is_empty)
            && self.dedicated_results.iter().all(Vec::is_empty)
            && self.adc.iter().all(Option::is_none)
            && self.other.is_empty()
    }
}

impl Measurement for TelemetryRecord {
    fn counts(&self, channel: usize) -> &[u64] {
        self.counts.get(channel).map_or(&[][..], Vec::as_slice)
    }

    fn timestamp_count(&self, channel: usize) -> usize {
        self.timestamps
            .get(channel)
            .map_or(0, |windows| windows.iter().map(Vec::len).sum())
    }

    fn is_final(&self) -> bool {
        self.is_final
    }

    fn exitcode(&self) -> Option<u64> {
        self.exitcode
    }
}

fn channel<T: Default>(items: &mut Vec<T>, channel: u8) -> &mut T {
    let index = usize::from(channel);
    if items.len() <= index {
        items.resize_with(index + 1, T::default);
    }
    &mut items[index]
}

/// Whether a device timestamp is further from the host clock than allowed.
pub(crate) fn drift_exceeded(tick_ns: u64, host_ns: u64, max_drift: Duration) -> bool {
    u128::from(tick_ns.abs_diff(host_ns)) > max_drift.as_nanos()
}

/// Builds [`TelemetryRecord`]s from the telemetry byte stream.
///
/// A record is emitted when a new scan value starts, when the run ends
/// (end-of-run or exit code marker), and when the device reports an
/// overrun.
#[derive(Debug)]
pub struct RecordAssembler {
    decoder: TelemetryDecoder,
    current: TelemetryRecord,
    time_sync: TimeSync,
    drift_check_period: Duration,
    max_clock_drift: Duration,
    last_drift_check: Option<Instant>,
    tokens: Vec<Token>,
}

impl RecordAssembler {
    pub fn new(settings: &EngineSettings) -> Self {
        RecordAssembler {
            decoder: TelemetryDecoder::new(),
            current: TelemetryRecord::new(),
            time_sync: TimeSync::default(),
            drift_check_period: settings.drift_check_period,
            max_clock_drift: settings.max_clock_drift,
            last_drift_check: None,
            tokens: Vec::new(),
        }
    }

    pub fn set_time_sync(&mut self, time_sync: TimeSync) {
        self.time_sync = time_sync;
    }

    pub fn time_sync(&self) -> TimeSync {
        self.time_sync
    }

    /// The record being filled.
    pub fn current(&self) -> &TelemetryRecord {
        &self.current
    }

    pub fn residual_len(&self) -> usize {
        self.decoder.residual_len()
    }

    /// Drop all partial state, e.g. before a new run is started.
    pub fn reset(&mut self) {
        self.decoder.reset();
        self.current = TelemetryRecord::new();
    }

    /// Decode `bytes` and return the records they complete.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<TelemetryRecord> {
        let mut tokens = std::mem::take(&mut self.tokens);
        tokens.clear();
        self.decoder.feed(bytes, &mut tokens);
        let records = tokens.iter().filter_map(|token| self.apply(*token)).collect();
        self.tokens = tokens;
        records
    }

    /// Close the current record because the device FIFO overran.
    pub fn overrun(&mut self) -> TelemetryRecord {
        let mut record = self.take();
        record.overrun = true;
        record
    }

    fn take(&mut self) -> TelemetryRecord {
        std::mem::take(&mut self.current)
    }

    fn finish(&mut self, exitcode: u64) -> TelemetryRecord {
        self.decoder.restart_run();
        let mut record = self.take();
        record.is_final = true;
        record.exitcode = Some(exitcode);
        record
    }

    /// Account for one token; returns a record if the token closed one.
    pub fn apply(&mut self, token: Token) -> Option<TelemetryRecord> {
        let record = &mut self.current;
        match token {
            Token::EndOfRun => return Some(self.finish(END_OF_RUN)),
            Token::Exitcode(code) => return Some(self.finish(code)),
            Token::ScanValue(value) => {
                let emitted = record.scan_value.is_some().then(|| self.take());
                self.current.scan_value = Some(value);
                return emitted;
            }
            Token::DependentScanValue(value) => record.dependent_values.push(value),
            Token::TimingViolation(address) => {
                warn!("Timing violation at UPDATE address {}", address);
                record.timing_violations.push(address);
            }
            Token::Count { channel: ch, count } => channel(&mut record.counts, ch).push(count),
            Token::Timestamp { channel: ch, time_ns } => {
                let windows = channel(&mut record.timestamps, ch);
                match windows.last_mut() {
                    Some(window) => window.push(time_ns),
                    None => windows.push(vec![time_ns]),
                }
            }
            Token::GateStart { channel: ch, .. } => channel(&mut record.timestamps, ch).push(Vec::new()),
            Token::Other(value) => record.other.push(value),
            Token::AdcAverage { channel: ch, mean } => *channel(&mut record.adc, ch) = Some(mean),
            Token::TimeTick { channel: ch, time_ns } => {
                let host_ns = self.time_sync.to_host_ns(time_ns);
                channel(&mut record.time_ticks, ch).push(host_ns);
                self.check_clock_drift(Instant::now(), now_ns());
            }
            Token::Result { channel: ch, value } => channel(&mut record.results, ch).push(value),
            Token::DedicatedResult { channel: ch, value } => {
                channel(&mut record.dedicated_results, ch).push(value);
            }
            Token::Unknown(word) => diagnostic!("Ignoring unknown telemetry word {:#018x}", word),
        }
        None
    }

    /// Compare the first time tick of every channel with the host clock, at
    /// most once per check period. Returns whether a check ran and found drift.
    pub(crate) fn check_clock_drift(&mut self, now: Instant, host_ns: u64) -> bool {
        if self
            .last_drift_check
            .is_some_and(|last| now.duration_since(last) < self.drift_check_period)
        {
            return false;
        }
        self.last_drift_check = Some(now);
        let drifted = self
            .current
            .time_ticks
            .iter()
            .filter_map(|ticks| ticks.first())
            .any(|&tick| drift_exceeded(tick, host_ns, self.max_clock_drift));
        if drifted {
            warn!(
                "Device time ticks are more than {:?} away from the host clock, time synchronization was lost or a counter wrap was missed",
                self.max_clock_drift
            );
        }
        drifted
    }
}
