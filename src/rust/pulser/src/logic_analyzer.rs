// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Logic-analyzer stream decoding.
//!
//! Every event is one 64-bit little-endian word: header byte `0x80 | kind`
//! on top, a 24-bit tick delta to the previous event, and the 32-bit pin
//! pattern. A word whose top byte is not a header means the stream slipped;
//! the decoder drops two bytes and tries again.

use ionpulse_log::diagnostic;

use crate::telemetry::TICK_NS;
use crate::{Error, Result};

const HEADER_BIT: u8 = 0x80;
const DELTA_MASK: u64 = (1 << 24) - 1;
const REALIGN_STEP: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicAnalyzerKind {
    /// Output pin pattern changed.
    Data,
    Trigger,
    Auxiliary,
    Gate,
}

impl LogicAnalyzerKind {
    fn from_header(header: u8) -> Option<Self> {
        match header {
            0x80 => Some(LogicAnalyzerKind::Data),
            0x81 => Some(LogicAnalyzerKind::Trigger),
            0x82 => Some(LogicAnalyzerKind::Auxiliary),
            0x83 => Some(LogicAnalyzerKind::Gate),
            _ => None,
        }
    }

    fn header(self) -> u8 {
        HEADER_BIT
            | match self {
                LogicAnalyzerKind::Data => 0,
                LogicAnalyzerKind::Trigger => 1,
                LogicAnalyzerKind::Auxiliary => 2,
                LogicAnalyzerKind::Gate => 3,
            }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicAnalyzerEvent {
    pub kind: LogicAnalyzerKind,
    /// Time since the start of the capture.
    pub time_ns: u64,
    pub pattern: u32,
}

impl LogicAnalyzerEvent {
    /// Wire word of an event `delta_ticks` after the previous one.
    pub fn word(kind: LogicAnalyzerKind, delta_ticks: u64, pattern: u32) -> u64 {
        u64::from(kind.header()) << 56 | (delta_ticks & DELTA_MASK) << 32 | u64::from(pattern)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub records: usize,
    pub realignments: usize,
    pub skipped_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct LogicAnalyzerDecoder {
    residual: Vec<u8>,
    ticks: u64,
    consecutive_misalignments: usize,
    max_misalignments: usize,
    stats: DecoderStats,
}

impl LogicAnalyzerDecoder {
    pub fn new(max_misalignments: usize) -> Self {
        LogicAnalyzerDecoder {
            residual: Vec::new(),
            ticks: 0,
            consecutive_misalignments: 0,
            max_misalignments,
            stats: DecoderStats::default(),
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    pub fn residual_len(&self) -> usize {
        self.residual.len()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<LogicAnalyzerEvent>> {
        self.residual.extend_from_slice(bytes);
        let mut events = Vec::new();
        let mut position = 0;
        let realignments = self.stats.realignments;
        while self.residual.len() - position >= 8 {
            let mut word = [0u8; 8];
            word.copy_from_slice(&self.residual[position..position + 8]);
            let word = u64::from_le_bytes(word);
            let Some(kind) = LogicAnalyzerKind::from_header((word >> 56) as u8) else {
                position += REALIGN_STEP;
                self.stats.realignments += 1;
                self.stats.skipped_bytes += REALIGN_STEP;
                self.consecutive_misalignments += 1;
                if self.consecutive_misalignments > self.max_misalignments {
                    self.residual.drain(..position);
                    return Err(Error::Hardware(format!(
                        "Logic analyzer stream lost alignment after {} records",
                        self.stats.records
                    )));
                }
                continue;
            };
            position += 8;
            self.consecutive_misalignments = 0;
            self.ticks += (word >> 32) & DELTA_MASK;
            self.stats.records += 1;
            events.push(LogicAnalyzerEvent {
                kind,
                time_ns: self.ticks * TICK_NS,
                pattern: word as u32,
            });
        }
        self.residual.drain(..position);
        if self.stats.realignments > realignments {
            diagnostic!(
                "Logic analyzer stream realigned {} times, {} records decoded",
                self.stats.realignments - realignments,
                self.stats.records
            );
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_program::words_to_bytes;

    #[test]
    fn test_decode_events() {
        let words = [
            LogicAnalyzerEvent::word(LogicAnalyzerKind::Data, 2, 0b101),
            LogicAnalyzerEvent::word(LogicAnalyzerKind::Gate, 3, 0),
        ];
        let mut decoder = LogicAnalyzerDecoder::new(4);
        let events = decoder.feed(&words_to_bytes(&words)).unwrap();
        assert_eq!(
            events,
            vec![
                LogicAnalyzerEvent {
                    kind: LogicAnalyzerKind::Data,
                    time_ns: 10,
                    pattern: 0b101
                },
                LogicAnalyzerEvent {
                    kind: LogicAnalyzerKind::Gate,
                    time_ns: 25,
                    pattern: 0
                },
            ]
        );
        assert_eq!(decoder.residual_len(), 0);
    }

    #[test]
    fn test_stray_bytes_are_skipped() {
        let first = LogicAnalyzerEvent::word(LogicAnalyzerKind::Trigger, 1, 0xdead_beef);
        let second = LogicAnalyzerEvent::word(LogicAnalyzerKind::Data, 1, 0x0000_00ff);
        let mut bytes = first.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0x12, 0x34]);
        bytes.extend_from_slice(&second.to_le_bytes());

        let mut decoder = LogicAnalyzerDecoder::new(4);
        let events = decoder.feed(&bytes).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].pattern, 0xdead_beef);
        assert_eq!(events[1].pattern, 0xff);
        assert_eq!(events[1].time_ns, 10);
        assert_eq!(
            decoder.stats(),
            DecoderStats {
                records: 2,
                realignments: 1,
                skipped_bytes: 2
            }
        );
        assert_eq!(decoder.residual_len(), 0);
    }

    #[test]
    fn test_partial_word_waits() {
        let word = LogicAnalyzerEvent::word(LogicAnalyzerKind::Auxiliary, 0, 1).to_le_bytes();
        let mut decoder = LogicAnalyzerDecoder::new(4);
        assert!(decoder.feed(&word[..5]).unwrap().is_empty());
        assert_eq!(decoder.residual_len(), 5);
        assert_eq!(decoder.feed(&word[5..]).unwrap().len(), 1);
    }

    #[test]
    fn test_garbage_fails_after_limit() {
        let mut decoder = LogicAnalyzerDecoder::new(3);
        let result = decoder.feed(&[0u8; 32]);
        assert!(matches!(result, Err(Error::Hardware(_))));
        assert_eq!(decoder.stats().records, 0);
    }
}
