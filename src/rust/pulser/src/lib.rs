// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Host side of the FPGA pulser.
//!
//! The [`engine::HardwareEngine`] owns a [`Device`] and speaks the wire
//! protocol: firmware, code and data uploads, extended-wire register writes,
//! the input FIFO for scan updates, large-RAM paging and the telemetry stream
//! that the [`record::RecordAssembler`] turns into [`TelemetryRecord`]s.
//!
//! [`Pulser`] is the client facing surface. It runs the engine on a worker
//! thread, hands telemetry to subscribers and keeps the
//! [`PulseProgramController`] with the loaded program.

pub mod bitfile;
pub mod clock;
pub mod config;
pub mod controller;
pub mod device;
pub mod dispatch;
pub mod engine;
pub mod logic_analyzer;
pub mod pulser;
pub mod ram;
pub mod record;
pub mod settings;
pub mod simulated;
pub mod telemetry;
pub mod wire;
pub mod worker;

pub use bitfile::BitfileInfo;
pub use config::{DeviceConfig, DeviceConfigs};
pub use controller::{ProgramImages, PulseProgramController};
pub use device::Device;
pub use engine::{HardwareEngine, RunState};
pub use logic_analyzer::{DecoderStats, LogicAnalyzerDecoder, LogicAnalyzerEvent};
pub use pulser::Pulser;
pub use ram::{RamFile, ShuttleEdge};
pub use record::{RecordAssembler, TelemetryRecord};
pub use settings::EngineSettings;
pub use simulated::SimulatedDevice;
pub use telemetry::{TelemetryDecoder, Token};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Pulser hardware error: {0}")]
    Hardware(String),
    #[error("FPGA error: {code}")]
    Fpga { code: String },
    #[error("Device configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Program(#[from] pulse_program::Error),
    #[error(transparent)]
    Compile(#[from] ppp_compiler::CompileError),
    #[error(transparent)]
    Encoding(#[from] encodings::EncodingError),
    #[error("Pulser worker is not running")]
    Disconnected,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
