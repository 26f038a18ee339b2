// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Gate sequences streamed with the steps of a scan.
//!
//! Every step of a scan may carry a gate sequence after its update pair. In
//! the FIFO the payload is the number of gates followed by one word per gate:
//! `[address, value, n, gate_0, ..., gate_{n-1}]`.

use indexmap::IndexMap;

use crate::{Error, Result};

/// Encoded gate sequences, one per scan step or one shared by all steps.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GateSequences {
    sequences: Vec<Vec<u64>>,
}

impl GateSequences {
    pub fn new(sequences: Vec<Vec<u64>>) -> Self {
        GateSequences { sequences }
    }

    /// Translate gate names through `gates`.
    pub fn from_names<S: AsRef<str>>(gates: &IndexMap<String, u64>, sequences: &[Vec<S>]) -> Result<Self> {
        let sequences = sequences
            .iter()
            .map(|sequence| {
                sequence
                    .iter()
                    .map(|name| {
                        let name = name.as_ref();
                        gates
                            .get(name)
                            .copied()
                            .ok_or_else(|| Error::InvalidScan(format!("unknown gate '{name}'")))
                    })
                    .collect::<Result<Vec<u64>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(GateSequences { sequences })
    }

    /// One sequence per line, gates separated by commas or whitespace.
    ///
    /// Text after `#` is ignored; a line holding only `-` is the empty sequence.
    pub fn parse(gates: &IndexMap<String, u64>, text: &str) -> Result<Self> {
        let sequences: Vec<Vec<&str>> = text
            .lines()
            .map(|line| line.split('#').next().unwrap_or_default().trim())
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|name| !name.is_empty() && *name != "-")
                    .collect()
            })
            .collect();
        Self::from_names(gates, &sequences)
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// FIFO payload of the sequence sent with `step`.
    ///
    /// A single sequence is sent with every step.
    pub fn payload(&self, step: usize) -> Option<Vec<u64>> {
        let sequence = match self.sequences.as_slice() {
            [only] => only,
            many => many.get(step)?,
        };
        let mut payload = Vec::with_capacity(sequence.len() + 1);
        payload.push(sequence.len() as u64);
        payload.extend_from_slice(sequence);
        Some(payload)
    }

    /// Append the payload of each step to its update words.
    pub fn interleave(&self, updates: &[u64], words_per_update: usize) -> Result<Vec<Vec<u64>>> {
        let steps = updates.len().div_ceil(words_per_update.max(1));
        if self.sequences.len() != 1 && self.sequences.len() != steps {
            return Err(Error::InvalidScan(format!(
                "{} gate sequences for a scan of {} steps",
                self.sequences.len(),
                steps
            )));
        }
        Ok(updates
            .chunks(words_per_update.max(1))
            .enumerate()
            .map(|(step, update)| {
                let mut words = update.to_vec();
                words.extend(self.payload(step).unwrap_or_default());
                words
            })
            .collect())
    }
}
