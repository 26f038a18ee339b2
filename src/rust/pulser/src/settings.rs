// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use scan_generator::MAX_WORDS_IN_FIFO;

/// Tunables of the I/O engine and its worker.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// How long the worker waits for a command before polling telemetry.
    pub poll_interval: Duration,
    /// Chunk size of large-RAM transfers, in bytes.
    pub ram_quantum: usize,
    /// Words of scan updates allowed in the device input FIFO at once.
    pub max_words_in_fifo: usize,
    /// Minimum wall time between two time-tick drift checks.
    pub drift_check_period: Duration,
    /// Largest tolerated offset between device and host clock.
    pub max_clock_drift: Duration,
    /// Consecutive realignments of the logic-analyzer stream before giving up.
    pub max_misalignments: usize,
    /// Telemetry polls spent looking for the end of a stopped run.
    pub stop_drain_polls: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            poll_interval: Duration::from_millis(10),
            ram_quantum: 1 << 20,
            max_words_in_fifo: MAX_WORDS_IN_FIFO,
            drift_check_period: Duration::from_secs(60),
            max_clock_drift: Duration::from_secs(60),
            max_misalignments: 16,
            stop_drain_polls: 100,
        }
    }
}
