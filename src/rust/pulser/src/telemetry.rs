// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Decoder of the device to host telemetry stream.
//!
//! The stream is a sequence of 64-bit little-endian words. The top byte
//! selects the meaning of a word; the `0xff` family carries run markers.
//! Two markers are followed by a second word: the scan tag (value follows)
//! and the high half of a 64-bit result (low half follows).

use ionpulse_log::diagnostic;
use pulse_program::END_OF_RUN;

/// Length of one device clock tick.
pub const TICK_NS: u64 = 5;
/// Ticks added by every timestamp overflow marker.
pub const OVERFLOW_TICKS: u64 = 1 << 40;

const PAYLOAD_40: u64 = (1 << 40) - 1;
const PAYLOAD_48: u64 = (1 << 48) - 1;

const MARKER_EXITCODE: u64 = 0xfffe;
const MARKER_OVERFLOW: u64 = 0xfffd;
const MARKER_SCAN: u64 = 0xfffc;
const MARKER_TIMING_VIOLATION: u64 = 0xfffb;
const DEPENDENT_SCAN_BIT: u64 = 0x8000;

const KEY_MARKER: u8 = 0xff;
const KEY_COUNT: u8 = 0x01;
const KEY_TIMESTAMP: u8 = 0x02;
const KEY_GATE_START: u8 = 0x03;
const KEY_OTHER: u8 = 0x04;
const KEY_ADC: u8 = 0x05;
const KEY_TIME_TICK: u8 = 0x06;
const KEY_DEDICATED: u8 = 0xee;
const KEY_RESULT_HIGH: u8 = 0x50;
const KEY_RESULT_LOW: u8 = 0x51;

/// One decoded telemetry item. Times are nanoseconds since the start of
/// the run, with overflows already applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token {
    EndOfRun,
    /// The full exit code word, `0xfffe` prefix included.
    Exitcode(u64),
    ScanValue(u64),
    DependentScanValue(u64),
    /// Address of an `UPDATE` that was reached too late.
    TimingViolation(u16),
    Count { channel: u8, count: u64 },
    Timestamp { channel: u8, time_ns: u64 },
    GateStart { channel: u8, time_ns: u64 },
    Other(u64),
    AdcAverage { channel: u8, mean: f64 },
    TimeTick { channel: u8, time_ns: u64 },
    Result { channel: u8, value: i64 },
    DedicatedResult { channel: u8, value: u64 },
    Unknown(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Normal,
    ScanParam,
    DependentScanParam,
    ResultLow {
        channel: u8,
        high: u16,
    },
}

/// Telemetry state machine with a residual buffer for partial words.
#[derive(Debug, Clone, Default)]
pub struct TelemetryDecoder {
    state: State,
    residual: Vec<u8>,
    overflow_ticks: u64,
}

impl TelemetryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of an incomplete word kept for the next call.
    pub fn residual_len(&self) -> usize {
        self.residual.len()
    }

    /// Forget the state of the previous run, including partial words.
    pub fn reset(&mut self) {
        self.state = State::Normal;
        self.residual.clear();
        self.overflow_ticks = 0;
    }

    /// Start of a new run: overflows count from zero again.
    pub(crate) fn restart_run(&mut self) {
        self.state = State::Normal;
        self.overflow_ticks = 0;
    }

    /// Decode all complete words of `bytes`, appending tokens to `tokens`.
    pub fn feed(&mut self, bytes: &[u8], tokens: &mut Vec<Token>) {
        let mut rest = bytes;
        if !self.residual.is_empty() {
            let missing = (8 - self.residual.len()).min(rest.len());
            self.residual.extend_from_slice(&rest[..missing]);
            rest = &rest[missing..];
            if self.residual.len() < 8 {
                return;
            }
            let word = le_word(&self.residual);
            self.residual.clear();
            tokens.extend(self.next(word));
        }
        let mut chunks = rest.chunks_exact(8);
        for chunk in &mut chunks {
            tokens.extend(self.next(le_word(chunk)));
        }
        self.residual.extend_from_slice(chunks.remainder());
    }

    /// Transition on the next word.
    pub fn next(&mut self, word: u64) -> Option<Token> {
        match std::mem::take(&mut self.state) {
            State::Normal => self.normal(word),
            State::ScanParam => Some(Token::ScanValue(word)),
            State::DependentScanParam => Some(Token::DependentScanValue(word)),
            State::ResultLow { channel, high } => {
                if key(word) == KEY_RESULT_LOW {
                    let value = (u64::from(high) << 48 | (word & PAYLOAD_48)) as i64;
                    Some(Token::Result { channel, value })
                } else {
                    diagnostic!("Result on channel {} lost its low half", channel);
                    self.normal(word)
                }
            }
        }
    }

    fn time_ns(&self, word: u64) -> u64 {
        ((word & PAYLOAD_40) + self.overflow_ticks) * TICK_NS
    }

    fn normal(&mut self, word: u64) -> Option<Token> {
        let channel = (word >> 48) as u8;
        let token = match key(word) {
            KEY_MARKER => match word >> 48 {
                _ if word == END_OF_RUN => Token::EndOfRun,
                MARKER_EXITCODE => Token::Exitcode(word),
                MARKER_OVERFLOW => {
                    self.overflow_ticks += OVERFLOW_TICKS;
                    return None;
                }
                MARKER_SCAN => {
                    self.state = if word & DEPENDENT_SCAN_BIT != 0 {
                        State::DependentScanParam
                    } else {
                        State::ScanParam
                    };
                    return None;
                }
                MARKER_TIMING_VIOLATION => Token::TimingViolation(word as u16),
                _ => Token::Unknown(word),
            },
            KEY_COUNT => Token::Count {
                channel,
                count: word & PAYLOAD_40,
            },
            KEY_TIMESTAMP => Token::Timestamp {
                channel,
                time_ns: self.time_ns(word),
            },
            KEY_GATE_START => Token::GateStart {
                channel,
                time_ns: self.time_ns(word),
            },
            KEY_OTHER => Token::Other(word & PAYLOAD_40),
            KEY_ADC => {
                let samples = (word >> 28) & 0xfff;
                let sum = word & 0x0fff_ffff;
                let mean = if samples == 0 {
                    0.0
                } else {
                    sum as f64 / samples as f64
                };
                Token::AdcAverage { channel, mean }
            }
            KEY_TIME_TICK => Token::TimeTick {
                channel,
                time_ns: self.time_ns(word),
            },
            KEY_DEDICATED => Token::DedicatedResult {
                channel,
                value: word & PAYLOAD_48,
            },
            KEY_RESULT_HIGH => {
                self.state = State::ResultLow {
                    channel,
                    high: word as u16,
                };
                return None;
            }
            _ => Token::Unknown(word),
        };
        Some(token)
    }
}

fn key(word: u64) -> u8 {
    (word >> 56) as u8
}

fn le_word(bytes: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(word)
}

/// Builders for telemetry words, used by the simulated device and tests.
pub mod words {
    use super::*;

    pub use pulse_program::words_to_bytes as to_bytes;

    pub fn count(channel: u8, count: u64) -> u64 {
        u64::from(KEY_COUNT) << 56 | u64::from(channel) << 48 | (count & PAYLOAD_40)
    }

    pub fn timestamp(channel: u8, ticks: u64) -> u64 {
        u64::from(KEY_TIMESTAMP) << 56 | u64::from(channel) << 48 | (ticks & PAYLOAD_40)
    }

    pub fn gate_start(channel: u8, ticks: u64) -> u64 {
        u64::from(KEY_GATE_START) << 56 | u64::from(channel) << 48 | (ticks & PAYLOAD_40)
    }

    pub fn time_tick(channel: u8, ticks: u64) -> u64 {
        u64::from(KEY_TIME_TICK) << 56 | u64::from(channel) << 48 | (ticks & PAYLOAD_40)
    }

    pub fn adc(channel: u8, samples: u64, sum: u64) -> u64 {
        u64::from(KEY_ADC) << 56 | u64::from(channel) << 48 | (samples & 0xfff) << 28 | (sum & 0x0fff_ffff)
    }

    /// Scan tag followed by its value.
    pub fn scan_value(value: u64) -> [u64; 2] {
        [MARKER_SCAN << 48, value]
    }

    pub fn dependent_scan_value(value: u64) -> [u64; 2] {
        [MARKER_SCAN << 48 | DEPENDENT_SCAN_BIT, value]
    }

    pub fn result(channel: u8, value: i64) -> [u64; 2] {
        let value = value as u64;
        [
            u64::from(KEY_RESULT_HIGH) << 56 | u64::from(channel) << 48 | value >> 48,
            u64::from(KEY_RESULT_LOW) << 56 | (value & PAYLOAD_48),
        ]
    }

    pub fn dedicated(channel: u8, value: u64) -> u64 {
        u64::from(KEY_DEDICATED) << 56 | u64::from(channel) << 48 | (value & PAYLOAD_48)
    }

    pub fn overflow() -> u64 {
        MARKER_OVERFLOW << 48
    }

    pub fn timing_violation(address: u16) -> u64 {
        MARKER_TIMING_VIOLATION << 48 | u64::from(address)
    }

    pub fn exitcode(code: u64) -> u64 {
        MARKER_EXITCODE << 48 | (code & PAYLOAD_48)
    }

    pub fn end_of_run() -> u64 {
        END_OF_RUN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(words: &[u64]) -> Vec<Token> {
        let mut decoder = TelemetryDecoder::new();
        let mut tokens = Vec::new();
        decoder.feed(&words::to_bytes(words), &mut tokens);
        assert_eq!(decoder.residual_len(), 0);
        tokens
    }

    #[test]
    fn test_markers() {
        let tokens = decode(&[
            words::timing_violation(0x1234),
            words::exitcode(7),
            words::end_of_run(),
        ]);
        assert_eq!(
            tokens,
            vec![
                Token::TimingViolation(0x1234),
                Token::Exitcode(0xfffe_0000_0000_0007),
                Token::EndOfRun
            ]
        );
    }

    #[test]
    fn test_two_word_items() {
        let mut stream = Vec::new();
        stream.extend(words::scan_value(42));
        stream.extend(words::dependent_scan_value(0xffff_ffff_ffff_ffff));
        stream.extend(words::result(2, -5));
        stream.push(words::count(1, 3));
        assert_eq!(
            decode(&stream),
            vec![
                Token::ScanValue(42),
                Token::DependentScanValue(u64::MAX),
                Token::Result { channel: 2, value: -5 },
                Token::Count { channel: 1, count: 3 },
            ]
        );
    }

    #[test]
    fn test_overflow_shifts_times() {
        let tokens = decode(&[
            words::timestamp(0, 10),
            words::overflow(),
            words::timestamp(0, 10),
            words::time_tick(3, 1),
        ]);
        assert_eq!(tokens[0], Token::Timestamp { channel: 0, time_ns: 50 });
        assert_eq!(
            tokens[1],
            Token::Timestamp {
                channel: 0,
                time_ns: (OVERFLOW_TICKS + 10) * TICK_NS
            }
        );
        assert_eq!(
            tokens[2],
            Token::TimeTick {
                channel: 3,
                time_ns: (OVERFLOW_TICKS + 1) * TICK_NS
            }
        );
    }

    #[test]
    fn test_adc_average() {
        assert_eq!(
            decode(&[words::adc(4, 4, 10), words::adc(1, 0, 0)]),
            vec![
                Token::AdcAverage { channel: 4, mean: 2.5 },
                Token::AdcAverage { channel: 1, mean: 0.0 }
            ]
        );
    }

    #[test]
    fn test_split_words() {
        let bytes = words::to_bytes(&[words::count(3, 1), words::count(3, 2), words::end_of_run()]);
        let mut decoder = TelemetryDecoder::new();
        let mut tokens = Vec::new();
        for piece in bytes.chunks(3) {
            decoder.feed(piece, &mut tokens);
        }
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[2], Token::EndOfRun);
        assert_eq!(decoder.residual_len(), 0);

        decoder.feed(&[1, 2, 3], &mut tokens);
        assert_eq!(decoder.residual_len(), 3);
        decoder.reset();
        assert_eq!(decoder.residual_len(), 0);
    }

    #[test]
    fn test_lost_result_low_half() {
        let [high, _] = words::result(0, 1 << 50);
        assert_eq!(
            decode(&[high, words::count(0, 9)]),
            vec![Token::Count { channel: 0, count: 9 }]
        );
    }
}
