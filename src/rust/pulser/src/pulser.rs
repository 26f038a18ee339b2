// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use indexmap::IndexMap;
use ionpulse_log::info;
use ionpulse_units::Quantity;
use pulse_program::ResolvedContext;
use scan_generator::Generator;

use crate::bitfile::BitfileInfo;
use crate::config::{DeviceConfig, DeviceConfigs};
use crate::controller::PulseProgramController;
use crate::device::Device;
use crate::dispatch::Dispatcher;
use crate::engine::{HardwareEngine, RunState};
use crate::logic_analyzer::LogicAnalyzerEvent;
use crate::ram::RamFile;
use crate::record::TelemetryRecord;
use crate::settings::EngineSettings;
use crate::worker::{Command, Reply, Worker};
use crate::{Error, Result};

fn unexpected(reply: Reply) -> Error {
    Error::Hardware(format!("unexpected reply from worker: {reply:?}"))
}

/// Client handle of one pulser.
///
/// Every device command is a blocking round trip to the worker thread.
/// Telemetry arrives independently through [`Pulser::subscribe_telemetry`].
#[derive(Debug)]
pub struct Pulser {
    controller: PulseProgramController,
    config: DeviceConfig,
    max_words_in_fifo: usize,
    // Declared before the dispatcher: the worker must stop first.
    worker: Worker,
    dispatcher: Dispatcher,
}

impl Pulser {
    /// Open a device with the embedded configuration descriptor.
    pub fn open<D: Device + 'static>(device: D, settings: EngineSettings) -> Result<Self> {
        Self::open_with_configs(device, DeviceConfigs::embedded()?, settings, true)
    }

    /// Open a device; with `backpressure` the dispatcher waits for
    /// [`Pulser::acknowledge`] after every record.
    pub fn open_with_configs<D: Device + 'static>(
        device: D,
        configs: DeviceConfigs,
        settings: EngineSettings,
        backpressure: bool,
    ) -> Result<Self> {
        let max_words_in_fifo = settings.max_words_in_fifo;
        let engine = HardwareEngine::open(device, configs, settings)?;
        let config = engine.config().clone();
        let (sender, receiver) = crossbeam_channel::unbounded();
        let worker = Worker::spawn(engine, sender)?;
        let dispatcher = Dispatcher::spawn(receiver, backpressure)?;
        Ok(Pulser {
            controller: PulseProgramController::new(config.memory_limits()),
            config,
            max_words_in_fifo,
            worker,
            dispatcher,
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn hardware_id(&self) -> u16 {
        self.config.id
    }

    pub fn controller(&self) -> &PulseProgramController {
        &self.controller
    }

    pub fn load(&mut self, name: &str, text: &str) -> Result<()> {
        self.controller.load(name, text)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        self.controller.load_file(path)
    }

    pub fn assemble(&mut self) -> Result<()> {
        self.controller.assemble()
    }

    pub fn set_context(&mut self, context: Option<ResolvedContext>) {
        self.controller.set_context(context);
    }

    /// Upload the code and data images of the loaded program.
    pub fn upload(&mut self) -> Result<()> {
        self.upload_with(&IndexMap::new())
    }

    /// Upload with additional one-off overrides, e.g. the first point of a scan.
    pub fn upload_with(&mut self, overrides: &IndexMap<String, Quantity>) -> Result<()> {
        let images = self.controller.pulse_program_binary(overrides);
        self.done(Command::UploadProgram {
            code: images.code,
            data: images.data,
        })
    }

    fn done(&self, command: Command) -> Result<()> {
        match self.worker.call(command)? {
            Reply::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub fn start(&self) -> Result<()> {
        self.done(Command::Start)
    }

    /// Stop the run; telemetry up to the end-of-run marker is still delivered.
    pub fn stop(&self) -> Result<()> {
        self.done(Command::Stop)
    }

    /// Ask the program to finish at its next checkpoint.
    pub fn interrupt(&self) -> Result<()> {
        self.done(Command::Interrupt)
    }

    pub fn pause(&self) -> Result<()> {
        self.done(Command::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.done(Command::Resume)
    }

    pub fn run_state(&self) -> Result<RunState> {
        match self.worker.call(Command::RunState)? {
            Reply::RunState(state) => Ok(state),
            other => Err(unexpected(other)),
        }
    }

    /// Write only the data words whose encoded value changed.
    pub fn update_variables(&mut self, values: &IndexMap<String, Quantity>) -> Result<()> {
        let changed = self.controller.update_variables(values);
        if changed.is_empty() {
            return Ok(());
        }
        self.done(Command::WriteDataWords(changed))
    }

    pub fn variable_scan_code(&self, name: &str, values: &[Quantity]) -> Result<Vec<u8>> {
        self.controller.variable_scan_code(name, values)
    }

    pub fn write_fifo(&self, bytes: &[u8]) -> Result<()> {
        self.done(Command::WriteFifo(bytes.to_vec()))
    }

    /// Push the generator's next burst of updates; returns the bytes written.
    ///
    /// The burst is limited to [`EngineSettings::max_words_in_fifo`] words in flight.
    pub fn feed_scan(&self, generator: &mut dyn Generator) -> Result<usize> {
        generator.set_fifo_capacity(self.max_words_in_fifo);
        let burst = generator.next_burst();
        if !burst.is_empty() {
            self.write_fifo(&burst)?;
        }
        Ok(burst.len())
    }

    pub fn set_extended_parameter(&self, name: &str, value: Quantity) -> Result<()> {
        self.done(Command::SetExtendedParameter {
            name: name.to_string(),
            value,
        })
    }

    pub fn subscribe_telemetry(&self, handler: impl FnMut(&TelemetryRecord) + Send + 'static) {
        self.dispatcher.subscribe(handler);
    }

    /// Release the next telemetry record to the subscribers.
    pub fn acknowledge(&self) {
        self.dispatcher.acknowledge();
    }

    pub fn write_ram(&self, address: u64, data: &[u8]) -> Result<()> {
        self.done(Command::WriteRam {
            address,
            data: data.to_vec(),
        })
    }

    pub fn read_ram(&self, address: u64, length: usize) -> Result<Vec<u8>> {
        match self.worker.call(Command::ReadRam { address, length })? {
            Reply::Ram(data) => Ok(data),
            other => Err(unexpected(other)),
        }
    }

    /// Encode a RAM file and write it at `address`.
    pub fn upload_ram_file(&self, address: u64, file: &RamFile) -> Result<()> {
        self.write_ram(address, &file.image()?)
    }

    pub fn read_logic_analyzer(&self) -> Result<Vec<LogicAnalyzerEvent>> {
        match self.worker.call(Command::ReadLogicAnalyzer)? {
            Reply::LogicAnalyzer(events) => Ok(events),
            other => Err(unexpected(other)),
        }
    }

    pub fn external_status(&self) -> Result<IndexMap<String, bool>> {
        match self.worker.call(Command::ExternalStatus)? {
            Reply::ExternalStatus(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    /// Replace the firmware and pick up the configuration it reports.
    pub fn upload_bitfile(&mut self, path: &Path) -> Result<BitfileInfo> {
        let (_, image) = BitfileInfo::load(path)?;
        let info = match self.worker.call(Command::UploadBitfile(image))? {
            Reply::Bitfile(info) => info,
            other => return Err(unexpected(other)),
        };
        match self.worker.call(Command::Configuration)? {
            Reply::Configuration(config) => {
                if config.id != self.config.id {
                    info!("Switching to configuration '{}'", config.name);
                    self.controller.set_limits(config.memory_limits());
                }
                self.config = *config;
            }
            other => return Err(unexpected(other)),
        }
        Ok(info)
    }

    pub fn exitcode(&self, code: u64) -> String {
        self.controller.exitcode(code)
    }
}
