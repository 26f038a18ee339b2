// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::time::{SystemTime, UNIX_EPOCH};

/// Host wall-clock time in nanoseconds since the Unix epoch.
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos() as u64)
}

/// Maps device time onto host wall-clock time.
///
/// The device clock starts when the firmware is loaded, so the offset is
/// taken when the device is opened and again after every firmware upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeSync {
    host_offset_ns: u64,
}

impl TimeSync {
    pub fn synchronized() -> Self {
        TimeSync {
            host_offset_ns: now_ns(),
        }
    }

    pub fn synchronize(&mut self) {
        self.host_offset_ns = now_ns();
    }

    pub fn offset_ns(&self) -> u64 {
        self.host_offset_ns
    }

    pub fn to_host_ns(&self, device_ns: u64) -> u64 {
        self.host_offset_ns.saturating_add(device_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_reference() {
        let before = now_ns();
        let sync = TimeSync::synchronized();
        assert!(sync.offset_ns() >= before);
        assert_eq!(sync.to_host_ns(25), sync.offset_ns() + 25);
        assert_eq!(TimeSync::default().to_host_ns(5), 5);
    }
}
