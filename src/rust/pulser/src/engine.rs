// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! The hardware I/O engine.
//!
//! [`HardwareEngine`] is single threaded and owns its [`Device`]. The
//! [`crate::worker`] runs it on a dedicated thread; tests drive it directly.

use std::fmt;

use indexmap::IndexMap;
use ionpulse_log::{info, warn};
use ionpulse_units::Quantity;

use crate::bitfile::BitfileInfo;
use crate::clock::TimeSync;
use crate::config::{DeviceConfig, DeviceConfigs};
use crate::device::Device;
use crate::logic_analyzer::{DecoderStats, LogicAnalyzerDecoder, LogicAnalyzerEvent};
use crate::ram;
use crate::record::{RecordAssembler, TelemetryRecord};
use crate::settings::EngineSettings;
use crate::wire::*;
use crate::{Error, Result};

/// Life cycle of one pulse-program run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Starting,
    Running,
    Paused,
    Stopping,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Starting => "starting",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

pub struct HardwareEngine<D: Device> {
    device: D,
    settings: EngineSettings,
    configs: DeviceConfigs,
    config: DeviceConfig,
    assembler: RecordAssembler,
    logic_analyzer: LogicAnalyzerDecoder,
    state: RunState,
    buffer: Vec<u8>,
}

impl<D: Device> fmt::Debug for HardwareEngine<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareEngine")
            .field("config", &self.config.name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<D: Device> HardwareEngine<D> {
    /// Identify the firmware and synchronize the clocks.
    ///
    /// Fails if no configuration matches the reported hardware id.
    pub fn open(mut device: D, configs: DeviceConfigs, settings: EngineSettings) -> Result<Self> {
        let hardware_id = device.wire_out(WIRE_HARDWARE_ID)?;
        let config = configs.for_hardware_id(hardware_id)?.clone();
        info!("Opened pulser '{}' with hardware id {:#x}", config.name, hardware_id);
        let mut assembler = RecordAssembler::new(&settings);
        assembler.set_time_sync(TimeSync::synchronized());
        Ok(HardwareEngine {
            device,
            logic_analyzer: LogicAnalyzerDecoder::new(settings.max_misalignments),
            settings,
            configs,
            config,
            assembler,
            state: RunState::Idle,
            buffer: Vec::new(),
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn time_sync(&self) -> TimeSync {
        self.assembler.time_sync()
    }

    pub fn logic_analyzer_stats(&self) -> DecoderStats {
        self.logic_analyzer.stats()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Replace the firmware. The clock restarts, so time is synchronized again.
    pub fn upload_bitfile(&mut self, image: &[u8]) -> Result<BitfileInfo> {
        let info = BitfileInfo::parse(image)?;
        info!(
            "Uploading bitfile '{}' for {} built {} {}, md5 {}",
            info.design,
            info.part,
            info.date,
            info.time,
            info.md5
        );
        self.device.configure(image)?;
        self.state = RunState::Idle;
        self.assembler.reset();
        self.assembler.set_time_sync(TimeSync::synchronized());
        let hardware_id = self.device.wire_out(WIRE_HARDWARE_ID)?;
        if hardware_id != self.config.id {
            self.config = self.configs.for_hardware_id(hardware_id)?.clone();
            info!("Firmware reports hardware id {:#x}, using '{}'", hardware_id, self.config.name);
        }
        Ok(info)
    }

    /// Load instruction and data memory.
    pub fn upload_program(&mut self, code: &[u8], data: &[u8]) -> Result<()> {
        let limits = self.config.memory_limits();
        if code.len() / 4 > limits.code_words {
            return Err(Error::Hardware(format!(
                "Code image of {} words exceeds the command memory of {} words",
                code.len() / 4,
                limits.code_words
            )));
        }
        if data.len() / 8 > limits.data_words {
            return Err(Error::Hardware(format!(
                "Data image of {} words exceeds the data memory of {} words",
                data.len() / 8,
                limits.data_words
            )));
        }
        self.write_extended(&[(EXT_CODE_ADDRESS, 0), (EXT_DATA_ADDRESS, 0)])?;
        self.device.write_pipe(PIPE_CODE, code)?;
        self.device.write_pipe(PIPE_DATA, data)
    }

    /// Overwrite single data-memory words, given as `(slot, word)`.
    pub fn write_data_words(&mut self, words: &[(usize, u64)]) -> Result<()> {
        if words.is_empty() {
            return Ok(());
        }
        let data_words = self.config.memory_limits().data_words;
        let mut writes = Vec::with_capacity(words.len());
        for &(slot, value) in words {
            let register = u16::try_from(slot)
                .ok()
                .filter(|_| slot < data_words)
                .and_then(|slot| slot.checked_add(EXT_DATA_BASE))
                .ok_or_else(|| Error::Hardware(format!("Data slot {slot} is outside of the data memory")))?;
            writes.push((register, value));
        }
        self.write_extended(&writes)
    }

    /// Several register writes in one pipe transfer.
    pub fn write_extended(&mut self, writes: &[(u16, u64)]) -> Result<()> {
        self.device.write_pipe(PIPE_EXTENDED_WIRE, &extended_frames(writes))
    }

    /// Write a parameter listed in the device configuration.
    pub fn set_extended_parameter(&mut self, name: &str, value: &Quantity) -> Result<()> {
        let parameter = self
            .config
            .extended_wires
            .iter()
            .find(|wire| wire.name == name)
            .ok_or_else(|| Error::Config(format!("Unknown extended-wire parameter '{name}'")))?;
        let word = encodings::encode(value, parameter.encoding.as_deref())?;
        let address = parameter.address;
        self.write_extended(&[(address, word)])
    }

    /// Append scan updates to the input FIFO.
    pub fn write_fifo(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.device.write_pipe(PIPE_INPUT_FIFO, bytes)
    }

    fn trigger(&mut self, bit: u8) -> Result<()> {
        self.device.trigger_in(TRIGGER_CONTROL, bit)
    }

    fn expect_state(&self, action: &str, allowed: &[RunState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::Hardware(format!("Cannot {action} while the pulser is {}", self.state)))
        }
    }

    pub fn start(&mut self) -> Result<()> {
        self.expect_state("start", &[RunState::Idle])?;
        self.state = RunState::Starting;
        self.assembler.reset();
        if let Err(err) = self.trigger(BIT_START) {
            self.state = RunState::Idle;
            return Err(err);
        }
        self.state = RunState::Running;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.expect_state("pause", &[RunState::Running])?;
        self.trigger(BIT_PAUSE)?;
        self.state = RunState::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        self.expect_state("resume", &[RunState::Paused])?;
        self.trigger(BIT_RESUME)?;
        self.state = RunState::Running;
        Ok(())
    }

    /// Ask the program to finish at its next checkpoint. The run ends with
    /// the soft-stop exit code.
    pub fn interrupt(&mut self) -> Result<()> {
        self.expect_state("interrupt", &[RunState::Running, RunState::Paused])?;
        self.trigger(BIT_INTERRUPT)
    }

    /// Stop the run, flush the input FIFO and drain telemetry up to the end
    /// of the run. Returns the records drained on the way.
    pub fn stop(&mut self) -> Result<Vec<TelemetryRecord>> {
        if self.state == RunState::Idle {
            return Ok(Vec::new());
        }
        self.state = RunState::Stopping;
        self.trigger(BIT_STOP)?;
        self.trigger(BIT_CLEAR_INPUT_FIFO)?;
        let mut records = Vec::new();
        for _ in 0..self.settings.stop_drain_polls {
            let drained = self.poll()?;
            let finished = drained.iter().any(|record| record.is_final);
            records.extend(drained);
            if finished {
                break;
            }
        }
        if self.state != RunState::Idle {
            warn!("No end of run seen after stopping the pulser");
            self.abandon_run();
        }
        Ok(records)
    }

    /// Give up on the current run without talking to the device.
    pub fn abandon_run(&mut self) {
        self.state = RunState::Idle;
        self.assembler.reset();
    }

    /// Read waiting telemetry and return the records it completes.
    pub fn poll(&mut self) -> Result<Vec<TelemetryRecord>> {
        let status = self.device.wire_out(WIRE_TELEMETRY_STATUS)?;
        let waiting = usize::from(status & TELEMETRY_WAITING_MASK) * 2;
        let length = waiting / 8 * 8;
        let mut records = Vec::new();
        if length > 0 {
            self.buffer.resize(length, 0);
            let read = self.device.read_pipe(PIPE_TELEMETRY, &mut self.buffer)?;
            records = self.assembler.feed(&self.buffer[..read]);
        }
        if status & TELEMETRY_OVERRUN_BIT != 0 {
            warn!("Telemetry FIFO overrun, the current record is incomplete");
            records.push(self.assembler.overrun());
            self.trigger(BIT_CLEAR_OVERRUN)?;
        }
        if records.is_empty() {
            return Ok(records);
        }
        let external_status = self.device.wire_out(WIRE_EXTERNAL_STATUS)?;
        for record in &mut records {
            record.external_status = Some(external_status);
        }
        if records.iter().any(|record| record.is_final) {
            self.state = RunState::Idle;
        }
        Ok(records)
    }

    /// Decode waiting logic-analyzer data.
    pub fn read_logic_analyzer(&mut self) -> Result<Vec<LogicAnalyzerEvent>> {
        let waiting = usize::from(self.device.wire_out(WIRE_LOGIC_ANALYZER_STATUS)?) * 2;
        if waiting == 0 {
            return Ok(Vec::new());
        }
        let mut buffer = vec![0u8; waiting];
        let read = self.device.read_pipe(PIPE_LOGIC_ANALYZER, &mut buffer)?;
        self.logic_analyzer.feed(&buffer[..read])
    }

    pub fn write_ram(&mut self, address: u64, data: &[u8]) -> Result<()> {
        ram::write_ram(&mut self.device, address, data, self.settings.ram_quantum)
    }

    pub fn read_ram(&mut self, address: u64, length: usize) -> Result<Vec<u8>> {
        ram::read_ram(&mut self.device, address, length, self.settings.ram_quantum)
    }

    /// External status bits by name.
    pub fn external_status(&mut self) -> Result<IndexMap<String, bool>> {
        let word = self.device.wire_out(WIRE_EXTERNAL_STATUS)?;
        Ok(self.config.status(word))
    }
}
