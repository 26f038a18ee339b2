// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Update-pair streams and the window of words resident in the device FIFO.

use ionpulse_log::warn;
use ionpulse_units::Quantity;
use pulse_program::PulseProgram;

use crate::{Error, Result};

/// Capacity of the device input FIFO in 64-bit words.
pub const MAX_WORDS_IN_FIFO: usize = 2040;

/// Words pushed for one step: an address and an encoded value.
pub const WORDS_PER_UPDATE: usize = 2;

/// The update submitted when a step changes nothing.
pub const ZERO_UPDATE: [u64; WORDS_PER_UPDATE] = [0, 0];

/// `[address, word, address, word, ...]` for scanning `parameter` over `values`.
///
/// A parameter the program does not declare is not an error: the scan still
/// steps through its points, with zero updates in place of the writes.
pub fn update_pairs(program: &PulseProgram, parameter: &str, values: &[Quantity]) -> Result<Vec<u64>> {
    if program.variable(parameter).is_none() {
        warn!(
            "Scan parameter '{}' is not a variable of the pulse program, no updates are sent",
            parameter
        );
        return Ok(ZERO_UPDATE.repeat(values.len()));
    }
    program
        .variable_scan_code(parameter, values)
        .map_err(Error::from)
}

/// Where the words of an update stream come from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    /// Steps laid out back to back; step `i` is `words[offsets[i]..offsets[i + 1]]`.
    Finite { words: Vec<u64>, offsets: Vec<usize> },
    /// The same step, repeated until stopped.
    Repeat(Vec<u64>),
}

/// Feeds an update stream into the device FIFO without overflowing it.
///
/// Every burst is a whole number of steps. A step leaves the FIFO when the
/// device reports it done through [`UpdateStream::step_completed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateStream {
    source: Source,
    max_in_flight: usize,
    sent_steps: usize,
    completed_steps: usize,
}

impl UpdateStream {
    /// Split `words` into steps of `words_per_step` words each.
    pub fn new(words: Vec<u64>, words_per_step: usize) -> Self {
        let words_per_step = words_per_step.max(1);
        let mut offsets: Vec<usize> = (0..words.len()).step_by(words_per_step).collect();
        offsets.push(words.len());
        Self::finite(words, offsets)
    }

    /// A stream whose steps may differ in length.
    pub fn from_steps(steps: Vec<Vec<u64>>) -> Self {
        let mut offsets = Vec::with_capacity(steps.len() + 1);
        offsets.push(0);
        for step in &steps {
            offsets.push(offsets[offsets.len() - 1] + step.len());
        }
        Self::finite(steps.concat(), offsets)
    }

    fn finite(words: Vec<u64>, offsets: Vec<usize>) -> Self {
        UpdateStream {
            source: Source::Finite { words, offsets },
            max_in_flight: MAX_WORDS_IN_FIFO,
            sent_steps: 0,
            completed_steps: 0,
        }
    }

    /// An endless stream of `step`.
    pub fn repeating(step: Vec<u64>) -> Self {
        UpdateStream {
            source: Source::Repeat(step),
            max_in_flight: MAX_WORDS_IN_FIFO,
            sent_steps: 0,
            completed_steps: 0,
        }
    }

    pub fn with_max_in_flight(mut self, words: usize) -> Self {
        self.set_max_in_flight(words);
        self
    }

    pub fn set_max_in_flight(&mut self, words: usize) {
        self.max_in_flight = words;
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Total number of steps, `None` for a repeating stream.
    pub fn total_steps(&self) -> Option<usize> {
        match &self.source {
            Source::Finite { offsets, .. } => Some(offsets.len() - 1),
            Source::Repeat(_) => None,
        }
    }

    pub fn sent_steps(&self) -> usize {
        self.sent_steps
    }

    pub fn completed_steps(&self) -> usize {
        self.completed_steps
    }

    fn step(&self, index: usize) -> &[u64] {
        match &self.source {
            Source::Finite { words, offsets } => &words[offsets[index]..offsets[index + 1]],
            Source::Repeat(words) => words,
        }
    }

    /// Words sent but not yet consumed by the device.
    pub fn words_in_flight(&self) -> usize {
        match &self.source {
            Source::Finite { offsets, .. } => offsets[self.sent_steps] - offsets[self.completed_steps],
            Source::Repeat(words) => (self.sent_steps - self.completed_steps) * words.len(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.total_steps().is_some_and(|total| self.sent_steps >= total)
    }

    pub fn is_complete(&self) -> bool {
        self.total_steps().is_some_and(|total| self.completed_steps >= total)
    }

    /// The next words that fit into the FIFO, as little-endian bytes.
    ///
    /// A step longer than the whole window is sent alone once the FIFO is empty.
    pub fn next_burst(&mut self) -> Vec<u8> {
        let mut in_flight = self.words_in_flight();
        let mut burst = Vec::new();
        while !self.is_exhausted() {
            let step = self.step(self.sent_steps);
            let fits = in_flight + step.len() <= self.max_in_flight;
            if !fits && in_flight > 0 {
                break;
            }
            if step.is_empty() && self.total_steps().is_none() {
                break;
            }
            burst.extend(step.iter().flat_map(|word| word.to_le_bytes()));
            in_flight += step.len();
            self.sent_steps += 1;
            if !fits {
                break;
            }
        }
        burst
    }

    /// The device finished a step; returns false if none was outstanding.
    pub fn step_completed(&mut self) -> bool {
        if self.completed_steps < self.sent_steps {
            self.completed_steps += 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(burst: &[u8]) -> Vec<u64> {
        burst
            .chunks_exact(8)
            .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn test_window_refills_one_step_at_a_time() {
        let pairs: Vec<u64> = (0..3000u64).flat_map(|i| [7, i]).collect();
        let mut stream = UpdateStream::new(pairs, WORDS_PER_UPDATE);
        let first = words(&stream.next_burst());
        assert_eq!(first.len(), MAX_WORDS_IN_FIFO);
        assert_eq!(&first[..4], &[7, 0, 7, 1]);
        assert!(stream.next_burst().is_empty());

        assert!(stream.step_completed());
        let refill = words(&stream.next_burst());
        assert_eq!(refill, vec![7, 1020]);
        assert_eq!(stream.words_in_flight(), MAX_WORDS_IN_FIFO);
    }

    #[test]
    fn test_finite_stream_ends() {
        let mut stream = UpdateStream::new(vec![1, 10, 1, 20], WORDS_PER_UPDATE);
        assert_eq!(stream.total_steps(), Some(2));
        assert_eq!(words(&stream.next_burst()), vec![1, 10, 1, 20]);
        assert!(stream.is_exhausted());
        assert!(!stream.is_complete());
        assert!(stream.step_completed());
        assert!(stream.step_completed());
        assert!(!stream.step_completed());
        assert!(stream.is_complete());
        assert!(stream.next_burst().is_empty());
    }

    #[test]
    fn test_steps_of_different_length() {
        let mut stream = UpdateStream::from_steps(vec![vec![1, 10, 2, 5, 6], vec![1, 20, 0], vec![1, 30, 1, 9]])
            .with_max_in_flight(8);
        assert_eq!(stream.total_steps(), Some(3));
        assert_eq!(words(&stream.next_burst()), vec![1, 10, 2, 5, 6, 1, 20, 0]);
        assert_eq!(stream.words_in_flight(), 8);
        assert!(stream.next_burst().is_empty());
        assert!(stream.step_completed());
        assert_eq!(stream.words_in_flight(), 3);
        assert_eq!(words(&stream.next_burst()), vec![1, 30, 1, 9]);
        assert!(stream.is_exhausted());
    }

    #[test]
    fn test_oversized_step_waits_for_empty_fifo() {
        let mut stream = UpdateStream::from_steps(vec![vec![1, 2], vec![3; 5]]).with_max_in_flight(4);
        assert_eq!(words(&stream.next_burst()), vec![1, 2]);
        assert!(stream.next_burst().is_empty());
        stream.step_completed();
        assert_eq!(words(&stream.next_burst()), vec![3; 5]);
    }

    #[test]
    fn test_repeating_stream() {
        let mut stream = UpdateStream::repeating(ZERO_UPDATE.to_vec()).with_max_in_flight(6);
        assert_eq!(words(&stream.next_burst()), vec![0; 6]);
        assert!(!stream.is_exhausted());
        stream.step_completed();
        assert_eq!(words(&stream.next_burst()), vec![0, 0]);
        assert_eq!(stream.total_steps(), None);
    }
}
