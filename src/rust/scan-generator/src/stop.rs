// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Why a scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every point was measured.
    Completed,
    UserRequest,
    /// The program reported this exit code.
    Exitcode(u64),
}

type Callback = Box<dyn FnOnce(StopReason) + Send>;

/// Runs the experiment's stop callback at most once.
#[derive(Default)]
pub struct StopHandler {
    callback: Option<Callback>,
    reason: Option<StopReason>,
}

impl StopHandler {
    pub fn new(callback: impl FnOnce(StopReason) + Send + 'static) -> Self {
        StopHandler {
            callback: Some(Box::new(callback)),
            reason: None,
        }
    }

    /// Invoke the callback; later calls are ignored and return false.
    pub fn stop(&mut self, reason: StopReason) -> bool {
        if self.reason.is_some() {
            return false;
        }
        self.reason = Some(reason);
        if let Some(callback) = self.callback.take() {
            callback(reason);
        }
        true
    }

    pub fn is_stopped(&self) -> bool {
        self.reason.is_some()
    }

    /// The reason given to the first [`StopHandler::stop`].
    pub fn reason(&self) -> Option<StopReason> {
        self.reason
    }
}

impl fmt::Debug for StopHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopHandler")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}
