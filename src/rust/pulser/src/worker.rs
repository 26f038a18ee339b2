// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Device worker thread.
//!
//! The worker owns the [`HardwareEngine`]. Clients send one [`Command`] at a
//! time and block for its reply; telemetry records travel on a separate
//! channel in the order the device emitted them.

use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use indexmap::IndexMap;
use ionpulse_log::error;
use ionpulse_units::Quantity;

use crate::bitfile::BitfileInfo;
use crate::config::DeviceConfig;
use crate::device::Device;
use crate::engine::{HardwareEngine, RunState};
use crate::logic_analyzer::LogicAnalyzerEvent;
use crate::record::TelemetryRecord;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    UploadBitfile(Vec<u8>),
    UploadProgram { code: Vec<u8>, data: Vec<u8> },
    WriteDataWords(Vec<(usize, u64)>),
    WriteFifo(Vec<u8>),
    Start,
    Stop,
    Interrupt,
    Pause,
    Resume,
    WriteRam { address: u64, data: Vec<u8> },
    ReadRam { address: u64, length: usize },
    ReadLogicAnalyzer,
    SetExtendedParameter { name: String, value: Quantity },
    ExternalStatus,
    RunState,
    Configuration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Done,
    Bitfile(BitfileInfo),
    Ram(Vec<u8>),
    LogicAnalyzer(Vec<LogicAnalyzerEvent>),
    ExternalStatus(IndexMap<String, bool>),
    RunState(RunState),
    Configuration(Box<DeviceConfig>),
}

struct Request {
    command: Command,
    reply: Sender<Result<Reply>>,
}

/// Handle to the worker thread; dropping it stops the thread.
#[derive(Debug)]
pub struct Worker {
    requests: Option<Sender<Request>>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn<D: Device + 'static>(engine: HardwareEngine<D>, telemetry: Sender<TelemetryRecord>) -> Result<Self> {
        let (requests, receiver) = crossbeam_channel::unbounded();
        let thread = std::thread::Builder::new()
            .name("pulser-worker".to_string())
            .spawn(move || run(engine, &receiver, &telemetry))?;
        Ok(Worker {
            requests: Some(requests),
            thread: Some(thread),
        })
    }

    /// Send a command and wait for its reply.
    pub fn call(&self, command: Command) -> Result<Reply> {
        let requests = self.requests.as_ref().ok_or(Error::Disconnected)?;
        let (reply, response) = crossbeam_channel::bounded(1);
        requests
            .send(Request { command, reply })
            .map_err(|_| Error::Disconnected)?;
        response.recv().map_err(|_| Error::Disconnected)?
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.requests.take();
        if self.thread.take().is_some_and(|thread| thread.join().is_err()) {
            error!("Pulser worker thread panicked");
        }
    }
}

fn forward(records: Vec<TelemetryRecord>, telemetry: &Sender<TelemetryRecord>) {
    for record in records {
        // Nobody listens any more; the records have nowhere to go.
        if telemetry.send(record).is_err() {
            return;
        }
    }
}

fn handle<D: Device>(
    engine: &mut HardwareEngine<D>,
    command: Command,
    telemetry: &Sender<TelemetryRecord>,
) -> Result<Reply> {
    match command {
        Command::UploadBitfile(image) => return engine.upload_bitfile(&image).map(Reply::Bitfile),
        Command::UploadProgram { code, data } => engine.upload_program(&code, &data)?,
        Command::WriteDataWords(words) => engine.write_data_words(&words)?,
        Command::WriteFifo(bytes) => engine.write_fifo(&bytes)?,
        Command::Start => engine.start()?,
        Command::Stop => forward(engine.stop()?, telemetry),
        Command::Interrupt => engine.interrupt()?,
        Command::Pause => engine.pause()?,
        Command::Resume => engine.resume()?,
        Command::WriteRam { address, data } => engine.write_ram(address, &data)?,
        Command::ReadRam { address, length } => return engine.read_ram(address, length).map(Reply::Ram),
        Command::ReadLogicAnalyzer => return engine.read_logic_analyzer().map(Reply::LogicAnalyzer),
        Command::SetExtendedParameter { name, value } => engine.set_extended_parameter(&name, &value)?,
        Command::ExternalStatus => return engine.external_status().map(Reply::ExternalStatus),
        Command::RunState => return Ok(Reply::RunState(engine.state())),
        Command::Configuration => return Ok(Reply::Configuration(Box::new(engine.config().clone()))),
    }
    Ok(Reply::Done)
}

fn run<D: Device>(
    mut engine: HardwareEngine<D>,
    requests: &Receiver<Request>,
    telemetry: &Sender<TelemetryRecord>,
) {
    let poll_interval = engine.settings().poll_interval;
    loop {
        match requests.recv_timeout(poll_interval) {
            Ok(Request { command, reply }) => {
                let result = handle(&mut engine, command, telemetry);
                // The client may have given up waiting.
                reply.send(result).ok();
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if engine.state() == RunState::Idle {
            continue;
        }
        match engine.poll() {
            Ok(records) => forward(records, telemetry),
            Err(err) => {
                error!("Reading telemetry failed, stopping the run: {}", err);
                engine.abandon_run();
            }
        }
    }
}
