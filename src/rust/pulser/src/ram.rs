// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Large-RAM paging and RAM files.

use std::ops::Range;
use std::path::Path;

use encodings::EncodingError;
use ionpulse_units::q;
use serde::Deserialize;

use crate::device::Device;
use crate::wire::{
    EXT_RAM_READ_ADDRESS, EXT_RAM_READ_LENGTH, EXT_RAM_WRITE_ADDRESS, PIPE_EXTENDED_WIRE, PIPE_RAM_READ,
    PIPE_RAM_WRITE, extended_frames,
};
use crate::{Error, Result};

/// Size of the RAM address space.
pub const RAM_SIZE: u64 = 1 << 27;
/// Bytes per RAM line.
pub const LINE_BYTES: u64 = 8;

fn checked_range(address: u64, length: usize) -> Result<Range<u64>> {
    let end = address
        .checked_add(length as u64)
        .filter(|end| *end <= RAM_SIZE)
        .ok_or_else(|| {
            Error::Hardware(format!(
                "RAM access of {length} bytes at {address:#x} exceeds the address space of {RAM_SIZE:#x}"
            ))
        })?;
    Ok(address..end)
}

fn read_chunk<D: Device + ?Sized>(device: &mut D, address: u64, length: usize) -> Result<Vec<u8>> {
    device.write_pipe(
        PIPE_EXTENDED_WIRE,
        &extended_frames(&[(EXT_RAM_READ_ADDRESS, address), (EXT_RAM_READ_LENGTH, length as u64)]),
    )?;
    let mut buffer = vec![0u8; length];
    let read = device.read_pipe(PIPE_RAM_READ, &mut buffer)?;
    if read != length {
        return Err(Error::Hardware(format!(
            "RAM read at {address:#x} returned {read} of {length} bytes"
        )));
    }
    Ok(buffer)
}

/// Write `data` in chunks of `quantum` bytes, reading every chunk back.
pub fn write_ram<D: Device + ?Sized>(device: &mut D, address: u64, data: &[u8], quantum: usize) -> Result<()> {
    checked_range(address, data.len())?;
    let mut chunk_address = address;
    for chunk in data.chunks(quantum.max(1)) {
        device.write_pipe(PIPE_EXTENDED_WIRE, &extended_frames(&[(EXT_RAM_WRITE_ADDRESS, chunk_address)]))?;
        device.write_pipe(PIPE_RAM_WRITE, chunk)?;
        let readback = read_chunk(device, chunk_address, chunk.len())?;
        if let Some(offset) = readback.iter().zip(chunk).position(|(a, b)| a != b) {
            return Err(Error::Hardware(format!(
                "RAM verification failed at address {:#x}",
                chunk_address + offset as u64
            )));
        }
        chunk_address += chunk.len() as u64;
    }
    Ok(())
}

/// Read `length` bytes in chunks of `quantum` bytes.
pub fn read_ram<D: Device + ?Sized>(device: &mut D, address: u64, length: usize, quantum: usize) -> Result<Vec<u8>> {
    let range = checked_range(address, length)?;
    let mut data = Vec::with_capacity(length);
    let quantum = quantum.max(1) as u64;
    let mut chunk_address = range.start;
    while chunk_address < range.end {
        let chunk_length = quantum.min(range.end - chunk_address) as usize;
        data.extend(read_chunk(device, chunk_address, chunk_length)?);
        chunk_address += chunk_length as u64;
    }
    Ok(data)
}

/// One waveform point of a RAM file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RamPoint {
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub encoding: Option<String>,
}

impl RamPoint {
    pub fn encode(&self) -> Result<u64> {
        let value = q(self.value, &self.unit).map_err(EncodingError::from)?;
        Ok(encodings::encode(&value, self.encoding.as_deref())?)
    }
}

/// A waveform segment of the RAM, addressed by line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ShuttleEdge {
    pub start_line: u64,
    pub stop_line: u64,
    /// Idle cycles between two lines.
    pub idle_count: u64,
}

impl ShuttleEdge {
    pub fn byte_range(&self) -> Range<u64> {
        self.start_line * LINE_BYTES..(self.stop_line + 1) * LINE_BYTES
    }
}

/// Waveform description loaded into RAM before a run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RamFile {
    pub points: Vec<RamPoint>,
    #[serde(default)]
    pub edges: Vec<ShuttleEdge>,
}

impl RamFile {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: RamFile =
            serde_yaml::from_str(text).map_err(|err| Error::Config(format!("Invalid RAM file: {err}")))?;
        for edge in &file.edges {
            if edge.start_line > edge.stop_line || edge.stop_line >= file.points.len() as u64 {
                return Err(Error::Config(format!(
                    "Shuttle edge {}..{} is outside of the {} RAM lines",
                    edge.start_line,
                    edge.stop_line,
                    file.points.len()
                )));
            }
        }
        Ok(file)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    /// One little-endian word per point.
    pub fn image(&self) -> Result<Vec<u8>> {
        let mut image = Vec::with_capacity(self.points.len() * LINE_BYTES as usize);
        for point in &self.points {
            image.extend_from_slice(&point.encode()?.to_le_bytes());
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedDevice;

    const RAM_FILE: &str = "
points:
  - {value: 0, unit: V, encoding: DAC8568_VOLTAGE}
  - {value: 2.5, unit: V, encoding: DAC8568_VOLTAGE}
  - {value: 7}
edges:
  - {start_line: 0, stop_line: 1, idle_count: 3}
";

    #[test]
    fn test_ram_file_image() {
        let file = RamFile::from_yaml(RAM_FILE).unwrap();
        assert_eq!(file.edges[0].byte_range(), 0..16);
        let image = file.image().unwrap();
        assert_eq!(image.len(), 24);
        assert_eq!(&image[8..16], &0x8000u64.to_le_bytes());
        assert_eq!(&image[16..], &7u64.to_le_bytes());
    }

    #[test]
    fn test_ram_file_errors() {
        let bad_edge = "points: [{value: 1}]\nedges: [{start_line: 0, stop_line: 4, idle_count: 0}]\n";
        assert!(matches!(RamFile::from_yaml(bad_edge), Err(Error::Config(_))));
        assert!(RamFile::from_yaml("points: 3").is_err());
        let out_of_range = RamFile::from_yaml("points: [{value: 9, unit: V, encoding: DAC8568_VOLTAGE}]").unwrap();
        assert!(matches!(out_of_range.image(), Err(Error::Encoding(_))));
    }

    #[test]
    fn test_paged_round_trip() {
        let mut device = SimulatedDevice::new(1);
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        write_ram(&mut device, 0x100, &data, 1024).unwrap();
        assert_eq!(read_ram(&mut device, 0x100, data.len(), 1000).unwrap(), data);
        assert_eq!(device.ram_writes(), 3);
    }

    #[test]
    fn test_verify_mismatch() {
        let mut device = SimulatedDevice::new(1);
        device.corrupt_ram_at(0x205);
        let result = write_ram(&mut device, 0x100, &[1u8; 0x200], 0x80);
        match result {
            Err(Error::Hardware(message)) => assert!(message.contains("0x205")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_wrap_is_rejected() {
        let mut device = SimulatedDevice::new(1);
        assert!(write_ram(&mut device, RAM_SIZE - 4, &[0u8; 8], 1024).is_err());
        assert_eq!(device.ram_writes(), 0);
        assert!(read_ram(&mut device, u64::MAX, 1, 1024).is_err());
    }
}
