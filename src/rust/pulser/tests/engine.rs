// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use pulse_program::END_OF_RUN;
use pulser::simulated::SOFT_STOP_EXITCODE;
use pulser::telemetry::words;
use pulser::wire::{BIT_CLEAR_INPUT_FIFO, BIT_CLEAR_OVERRUN, BIT_STOP};
use pulser::{
    DeviceConfigs, EngineSettings, Error, HardwareEngine, PulseProgramController, RunState,
    SimulatedDevice,
};

fn open(device: &SimulatedDevice) -> HardwareEngine<SimulatedDevice> {
    HardwareEngine::open(
        device.clone(),
        DeviceConfigs::embedded().unwrap(),
        EngineSettings::default(),
    )
    .unwrap()
}

fn bitfile(design: &str) -> Vec<u8> {
    let mut image = vec![0x00, 0x09, 0x0f, 0xf0, 0x0f, 0xf0, 0x0f, 0xf0, 0x0f, 0xf0, 0x00, 0x00, 0x01];
    for (key, text) in [(b'a', design), (b'b', "6slx150fgg484"), (b'c', "2024/05/02"), (b'd', "12:00:00")] {
        image.push(key);
        image.extend_from_slice(&((text.len() + 1) as u16).to_be_bytes());
        image.extend_from_slice(text.as_bytes());
        image.push(0);
    }
    let bitstream = [0xaa_u8; 32];
    image.push(b'e');
    image.extend_from_slice(&(bitstream.len() as u32).to_be_bytes());
    image.extend_from_slice(&bitstream);
    image
}

#[test]
fn test_constant_output_run() {
    let device = SimulatedDevice::new(1);
    let mut engine = open(&device);
    let mut controller = PulseProgramController::new(engine.config().memory_limits());
    controller
        .load(
            "constant.ppp",
            "var x = 0 ; update(1 us) ; DDSFRQ 0, x ; update(1 us) ; END",
        )
        .unwrap();
    let images = controller.pulse_program_binary(&Default::default());
    engine.upload_program(&images.code, &images.data).unwrap();
    assert_eq!(device.code(), images.code);

    device.set_run_telemetry(&[
        words::time_tick(0, 200),
        words::time_tick(1, 200),
        words::time_tick(2, 200),
        words::time_tick(3, 200),
        words::end_of_run(),
    ]);
    engine.start().unwrap();
    assert_eq!(engine.state(), RunState::Running);
    let records = engine.poll().unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(record.is_final);
    assert_eq!(record.exitcode, Some(END_OF_RUN));
    assert!(record.counts.iter().all(Vec::is_empty));
    assert_eq!(record.time_ticks.len(), 4);
    assert!(record.time_ticks.iter().all(|ticks| ticks.len() == 1));
    assert_eq!(engine.state(), RunState::Idle);
}

#[test]
fn test_overrun_keeps_buffered_counts() {
    let device = SimulatedDevice::new(1);
    let mut engine = open(&device);
    engine.start().unwrap();
    device.push_telemetry(&[words::count(3, 1); 7]);
    device.set_overrun();
    let records = engine.poll().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].overrun);
    assert!(!records[0].is_final);
    assert_eq!(records[0].counts[3].len(), 7);
    assert!(device.triggers().contains(&BIT_CLEAR_OVERRUN));

    device.push_telemetry(&[words::end_of_run()]);
    let records = engine.poll().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].is_final);
    assert!(!records[0].overrun);
    assert!(records[0].is_empty());
}

#[test]
fn test_ram_round_trip_and_verify() {
    let device = SimulatedDevice::new(1);
    let mut engine = open(&device);
    let data: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
    engine.write_ram(0x100, &data).unwrap();
    assert_eq!(engine.read_ram(0x100, data.len()).unwrap(), data);

    device.corrupt_ram_at(0x2000 + 17);
    let err = engine.write_ram(0x2000, &data).unwrap_err();
    assert!(matches!(err, Error::Hardware(_)), "{err}");
}

#[test]
fn test_stop_drains_to_end_of_run() {
    let device = SimulatedDevice::new(1);
    let mut engine = open(&device);
    device.set_run_telemetry(&[words::count(0, 5)]);
    engine.start().unwrap();
    let records = engine.stop().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].is_final);
    assert_eq!(records[0].counts[0], [5]);
    assert_eq!(engine.state(), RunState::Idle);
    let triggers = device.triggers();
    assert!(triggers.contains(&BIT_STOP));
    assert!(triggers.contains(&BIT_CLEAR_INPUT_FIFO));
}

#[test]
fn test_interrupt_ends_with_soft_stop() {
    let device = SimulatedDevice::new(1);
    let mut engine = open(&device);
    engine.start().unwrap();
    engine.pause().unwrap();
    assert!(device.is_paused());
    engine.resume().unwrap();
    engine.interrupt().unwrap();
    let records = engine.poll().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].exitcode, Some(SOFT_STOP_EXITCODE));
    assert!(engine.resume().is_err());
}

#[test]
fn test_program_larger_than_memory() {
    let device = SimulatedDevice::new(1);
    let mut engine = open(&device);
    let words = engine.config().memory_limits().code_words;
    let code = vec![0u8; (words + 1) * 4];
    assert!(matches!(engine.upload_program(&code, &[]), Err(Error::Hardware(_))));
}

#[test]
fn test_bitfile_upload_switches_configuration() {
    let device = SimulatedDevice::new(1);
    let mut engine = open(&device);
    let before = engine.time_sync();
    device.set_hardware_id(2);
    let info = engine.upload_bitfile(&bitfile("pulser_ad9910")).unwrap();
    assert_eq!(info.design, "pulser_ad9910");
    assert_eq!(device.configurations(), 1);
    assert_eq!(engine.config().id, 2);
    assert!(engine.time_sync().offset_ns() >= before.offset_ns());

    device.set_hardware_id(0x7777);
    assert!(matches!(
        engine.upload_bitfile(&bitfile("unknown")),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_external_status_names() {
    let device = SimulatedDevice::new(1);
    let mut engine = open(&device);
    device.set_external_status(0b011);
    let status = engine.external_status().unwrap();
    assert_eq!(status.get("ExternalTrigger"), Some(&true));
    assert_eq!(status.get("ClockLocked"), Some(&true));
    assert_eq!(status.get("PowerGood"), Some(&false));
}
