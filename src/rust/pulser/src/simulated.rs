// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! In-memory stand-in for the FPGA board.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::Device;
use crate::telemetry::words;
use crate::wire::*;
use crate::{Error, Result};

/// Exit code the firmware reports after a soft stop.
pub const SOFT_STOP_EXITCODE: u64 = 0xfffe_1000_0000_0000;

#[derive(Debug, Default)]
struct State {
    hardware_id: u16,
    external_status: u16,
    bitfile: Option<Vec<u8>>,
    configurations: usize,
    code: Vec<u8>,
    data: Vec<u8>,
    code_address: u64,
    data_address: u64,
    ram: Vec<u8>,
    ram_write_address: u64,
    ram_read_address: u64,
    ram_read_length: u64,
    ram_writes: usize,
    corrupt_ram_at: Option<u64>,
    input_fifo: Vec<u8>,
    telemetry: VecDeque<u8>,
    run_telemetry: Vec<u8>,
    overrun: bool,
    logic_analyzer: VecDeque<u8>,
    triggers: Vec<u8>,
    extended: Vec<(u16, u64)>,
    running: bool,
    paused: bool,
}

impl State {
    fn extended_write(&mut self, address: u16, value: u64) {
        self.extended.push((address, value));
        match address {
            EXT_CODE_ADDRESS => self.code_address = value,
            EXT_DATA_ADDRESS => self.data_address = value,
            EXT_RAM_WRITE_ADDRESS => self.ram_write_address = value,
            EXT_RAM_READ_ADDRESS => self.ram_read_address = value,
            EXT_RAM_READ_LENGTH => self.ram_read_length = value,
            _ if address >= EXT_DATA_BASE => {
                let offset = usize::from(address - EXT_DATA_BASE) * 8;
                store(&mut self.data, offset as u64, &value.to_le_bytes());
            }
            _ => {}
        }
    }

    fn trigger(&mut self, bit: u8) {
        self.triggers.push(bit);
        match bit {
            BIT_START => {
                self.running = true;
                self.paused = false;
                let script = self.run_telemetry.clone();
                self.telemetry.extend(script);
            }
            BIT_STOP if self.running => {
                self.running = false;
                self.telemetry.extend(words::end_of_run().to_le_bytes());
            }
            BIT_CLEAR_OVERRUN => self.overrun = false,
            BIT_INTERRUPT if self.running => {
                self.running = false;
                self.telemetry.extend(SOFT_STOP_EXITCODE.to_le_bytes());
            }
            BIT_PAUSE => self.paused = true,
            BIT_RESUME => self.paused = false,
            BIT_CLEAR_INPUT_FIFO => self.input_fifo.clear(),
            _ => {}
        }
    }
}

fn store(memory: &mut Vec<u8>, address: u64, bytes: &[u8]) {
    let start = address as usize;
    if memory.len() < start + bytes.len() {
        memory.resize(start + bytes.len(), 0);
    }
    memory[start..start + bytes.len()].copy_from_slice(bytes);
}

fn words_of(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            u64::from_le_bytes(word)
        })
        .collect()
}

/// Scriptable [`Device`] backed by memory.
///
/// Clones share the same board, so a test can keep one handle to script
/// telemetry and inspect writes while the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDevice {
    state: Arc<Mutex<State>>,
}

impl SimulatedDevice {
    pub fn new(hardware_id: u16) -> Self {
        let device = SimulatedDevice::default();
        device.state.lock().hardware_id = hardware_id;
        device
    }

    /// Hardware id reported from now on, e.g. after a firmware change.
    pub fn set_hardware_id(&self, hardware_id: u16) {
        self.state.lock().hardware_id = hardware_id;
    }

    pub fn set_external_status(&self, status: u16) {
        self.state.lock().external_status = status;
    }

    /// Telemetry the board emits every time a run is started.
    pub fn set_run_telemetry(&self, telemetry: &[u64]) {
        self.state.lock().run_telemetry = words::to_bytes(telemetry);
    }

    /// Telemetry that is available right away.
    pub fn push_telemetry(&self, telemetry: &[u64]) {
        self.push_telemetry_bytes(&words::to_bytes(telemetry));
    }

    pub fn push_telemetry_bytes(&self, bytes: &[u8]) {
        self.state.lock().telemetry.extend(bytes);
    }

    pub fn set_overrun(&self) {
        self.state.lock().overrun = true;
    }

    pub fn push_logic_analyzer(&self, bytes: &[u8]) {
        self.state.lock().logic_analyzer.extend(bytes);
    }

    /// Flip the byte at `address` whenever it is read back.
    pub fn corrupt_ram_at(&self, address: u64) {
        self.state.lock().corrupt_ram_at = Some(address);
    }

    pub fn ram_writes(&self) -> usize {
        self.state.lock().ram_writes
    }

    pub fn bitfile(&self) -> Option<Vec<u8>> {
        self.state.lock().bitfile.clone()
    }

    pub fn configurations(&self) -> usize {
        self.state.lock().configurations
    }

    pub fn code(&self) -> Vec<u8> {
        self.state.lock().code.clone()
    }

    pub fn data_words(&self) -> Vec<u64> {
        words_of(&self.state.lock().data)
    }

    pub fn input_fifo_words(&self) -> Vec<u64> {
        words_of(&self.state.lock().input_fifo)
    }

    pub fn triggers(&self) -> Vec<u8> {
        self.state.lock().triggers.clone()
    }

    pub fn extended_writes(&self) -> Vec<(u16, u64)> {
        self.state.lock().extended.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }
}

impl Device for SimulatedDevice {
    fn configure(&mut self, bitfile: &[u8]) -> Result<()> {
        if bitfile.is_empty() {
            return Err(Error::Fpga {
                code: "InvalidBitstream".to_string(),
            });
        }
        let mut state = self.state.lock();
        state.bitfile = Some(bitfile.to_vec());
        state.configurations += 1;
        state.running = false;
        state.telemetry.clear();
        Ok(())
    }

    fn wire_out(&mut self, address: u8) -> Result<u16> {
        let state = self.state.lock();
        match address {
            WIRE_HARDWARE_ID => Ok(state.hardware_id),
            WIRE_TELEMETRY_STATUS => {
                let waiting = (state.telemetry.len() / 2).min(usize::from(TELEMETRY_WAITING_MASK)) as u16;
                Ok(waiting | if state.overrun { TELEMETRY_OVERRUN_BIT } else { 0 })
            }
            WIRE_LOGIC_ANALYZER_STATUS => {
                Ok((state.logic_analyzer.len() / 2).min(usize::from(u16::MAX)) as u16)
            }
            WIRE_EXTERNAL_STATUS => Ok(state.external_status),
            _ => Err(Error::Fpga {
                code: "InvalidEndpoint".to_string(),
            }),
        }
    }

    fn trigger_in(&mut self, address: u8, bit: u8) -> Result<()> {
        if address != TRIGGER_CONTROL {
            return Err(Error::Fpga {
                code: "InvalidEndpoint".to_string(),
            });
        }
        self.state.lock().trigger(bit);
        Ok(())
    }

    fn write_pipe(&mut self, address: u8, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        match address {
            PIPE_EXTENDED_WIRE => {
                for (register, value) in parse_extended_frames(data) {
                    state.extended_write(register, value);
                }
            }
            PIPE_CODE => {
                let offset = state.code_address * 4;
                store(&mut state.code, offset, data);
            }
            PIPE_DATA => {
                let offset = state.data_address * 8;
                store(&mut state.data, offset, data);
            }
            PIPE_INPUT_FIFO => state.input_fifo.extend_from_slice(data),
            PIPE_RAM_WRITE => {
                let address = state.ram_write_address;
                store(&mut state.ram, address, data);
                state.ram_write_address += data.len() as u64;
                state.ram_writes += 1;
            }
            _ => {
                return Err(Error::Fpga {
                    code: "InvalidEndpoint".to_string(),
                });
            }
        }
        Ok(())
    }

    fn read_pipe(&mut self, address: u8, buffer: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock();
        match address {
            PIPE_TELEMETRY => {
                let length = buffer.len().min(state.telemetry.len());
                for (slot, byte) in buffer.iter_mut().zip(state.telemetry.drain(..length)) {
                    *slot = byte;
                }
                Ok(length)
            }
            PIPE_LOGIC_ANALYZER => {
                let length = buffer.len().min(state.logic_analyzer.len());
                for (slot, byte) in buffer.iter_mut().zip(state.logic_analyzer.drain(..length)) {
                    *slot = byte;
                }
                Ok(length)
            }
            PIPE_RAM_READ => {
                let start = state.ram_read_address;
                let length = buffer.len().min(state.ram_read_length as usize);
                for (i, slot) in buffer[..length].iter_mut().enumerate() {
                    let address = start + i as u64;
                    let byte = state.ram.get(address as usize).copied().unwrap_or(0);
                    *slot = if state.corrupt_ram_at == Some(address) {
                        !byte
                    } else {
                        byte
                    };
                }
                Ok(length)
            }
            _ => Err(Error::Fpga {
                code: "InvalidEndpoint".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire() {
        let mut device = SimulatedDevice::new(7);
        assert_eq!(device.wire_out(WIRE_HARDWARE_ID).unwrap(), 7);
        device.push_telemetry(&[1, 2]);
        assert_eq!(device.wire_out(WIRE_TELEMETRY_STATUS).unwrap(), 8);
        device.set_overrun();
        assert_eq!(
            device.wire_out(WIRE_TELEMETRY_STATUS).unwrap(),
            8 | TELEMETRY_OVERRUN_BIT
        );
        device.trigger_in(TRIGGER_CONTROL, BIT_CLEAR_OVERRUN).unwrap();
        assert_eq!(device.wire_out(WIRE_TELEMETRY_STATUS).unwrap(), 8);
        assert!(matches!(device.wire_out(0x01), Err(Error::Fpga { .. })));
    }

    #[test]
    fn test_data_words_through_extended_wire() {
        let mut device = SimulatedDevice::new(1);
        device
            .write_pipe(PIPE_EXTENDED_WIRE, &extended_frames(&[(EXT_DATA_BASE + 2, 0xabc)]))
            .unwrap();
        assert_eq!(device.data_words(), vec![0, 0, 0xabc]);
        assert!(device.configure(&[]).is_err());
    }
}
