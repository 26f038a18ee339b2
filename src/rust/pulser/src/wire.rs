// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Endpoint map of the pulser firmware and the extended-wire framing.

/// Hardware id of the loaded firmware.
pub const WIRE_HARDWARE_ID: u8 = 0x20;
/// Telemetry FIFO status: 16-bit words waiting and the overrun bit.
pub const WIRE_TELEMETRY_STATUS: u8 = 0x25;
/// Number of 16-bit words waiting in the logic-analyzer FIFO.
pub const WIRE_LOGIC_ANALYZER_STATUS: u8 = 0x27;
/// External status bits, as named by the device configuration.
pub const WIRE_EXTERNAL_STATUS: u8 = 0x30;

pub const TELEMETRY_WAITING_MASK: u16 = 0x3fff;
pub const TELEMETRY_OVERRUN_BIT: u16 = 0x4000;

pub const TRIGGER_CONTROL: u8 = 0x40;
pub const BIT_START: u8 = 0;
pub const BIT_STOP: u8 = 1;
pub const BIT_CLEAR_OVERRUN: u8 = 2;
pub const BIT_INTERRUPT: u8 = 3;
pub const BIT_PAUSE: u8 = 4;
pub const BIT_RESUME: u8 = 5;
pub const BIT_CLEAR_INPUT_FIFO: u8 = 6;

pub const PIPE_EXTENDED_WIRE: u8 = 0x80;
pub const PIPE_CODE: u8 = 0x81;
pub const PIPE_DATA: u8 = 0x82;
pub const PIPE_INPUT_FIFO: u8 = 0x83;
pub const PIPE_RAM_WRITE: u8 = 0x84;
pub const PIPE_TELEMETRY: u8 = 0xa0;
pub const PIPE_RAM_READ: u8 = 0xa1;
pub const PIPE_LOGIC_ANALYZER: u8 = 0xa2;

/// Extended-wire registers. Addresses from [`EXT_DATA_BASE`] on map the
/// data memory word by word.
pub const EXT_CODE_ADDRESS: u16 = 0x0001;
pub const EXT_DATA_ADDRESS: u16 = 0x0002;
pub const EXT_RAM_WRITE_ADDRESS: u16 = 0x0003;
pub const EXT_RAM_READ_ADDRESS: u16 = 0x0004;
pub const EXT_RAM_READ_LENGTH: u16 = 0x0005;
pub const EXT_DATA_BASE: u16 = 0x1000;

/// Size of one extended-wire frame: 2 address bytes, 8 payload bytes.
pub const EXTENDED_FRAME_SIZE: usize = 10;

/// Pack `(address, value)` writes into one extended-wire pipe transfer.
pub fn extended_frames(writes: &[(u16, u64)]) -> Vec<u8> {
    let mut frames = Vec::with_capacity(writes.len() * EXTENDED_FRAME_SIZE);
    for (address, value) in writes {
        frames.extend_from_slice(&address.to_le_bytes());
        frames.extend_from_slice(&value.to_le_bytes());
    }
    frames
}

/// Inverse of [`extended_frames`]; a trailing partial frame is ignored.
pub fn parse_extended_frames(bytes: &[u8]) -> Vec<(u16, u64)> {
    bytes
        .chunks_exact(EXTENDED_FRAME_SIZE)
        .map(|frame| {
            let mut address = [0u8; 2];
            let mut value = [0u8; 8];
            address.copy_from_slice(&frame[..2]);
            value.copy_from_slice(&frame[2..]);
            (u16::from_le_bytes(address), u64::from_le_bytes(value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_frame_layout() {
        let frames = extended_frames(&[(0x1002, 0x0102_0304_0506_0708), (EXT_RAM_READ_ADDRESS, 1)]);
        assert_eq!(frames.len(), 2 * EXTENDED_FRAME_SIZE);
        assert_eq!(&frames[..4], &[0x02, 0x10, 0x08, 0x07]);
        assert_eq!(
            parse_extended_frames(&frames),
            vec![(0x1002, 0x0102_0304_0506_0708), (EXT_RAM_READ_ADDRESS, 1)]
        );
    }
}
