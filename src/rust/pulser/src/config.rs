// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Device configuration descriptor.
//!
//! One XML document lists every known firmware configuration. The
//! configuration in use is the one whose id equals the hardware id the
//! firmware reports.

use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexMap;
use pulse_program::MemoryLimits;
use serde::Deserialize;

use crate::{Error, Result};

const EMBEDDED: &str = include_str!("../config/devices.xml");
const DDS_CHIPS: [&str; 2] = ["AD9912", "AD9910"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MemorySize {
    #[serde(rename = "@words")]
    pub words: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DdsChannel {
    #[serde(rename = "@channel")]
    pub channel: u8,
    #[serde(rename = "@chip")]
    pub chip: String,
}

/// DAC or ADC block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Converter {
    #[serde(rename = "@channels")]
    pub channels: usize,
    #[serde(rename = "@encoding")]
    pub encoding: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamedBit {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@bit")]
    pub bit: u8,
}

/// Parameter written through an extended-wire register.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtendedWireParameter {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@address")]
    pub address: u16,
    #[serde(rename = "@encoding", default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceConfig {
    #[serde(rename = "@id")]
    pub id: u16,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "CommandMemory")]
    pub command_memory: MemorySize,
    #[serde(rename = "DataMemory")]
    pub data_memory: MemorySize,
    #[serde(rename = "Dds", default)]
    pub dds: Vec<DdsChannel>,
    #[serde(rename = "Dac", default)]
    pub dac: Option<Converter>,
    #[serde(rename = "Adc", default)]
    pub adc: Option<Converter>,
    #[serde(rename = "StatusBit", default)]
    pub status_bits: Vec<NamedBit>,
    #[serde(rename = "ShutterBit", default)]
    pub shutter_bits: Vec<NamedBit>,
    #[serde(rename = "TriggerBit", default)]
    pub trigger_bits: Vec<NamedBit>,
    #[serde(rename = "CounterBit", default)]
    pub counter_bits: Vec<NamedBit>,
    #[serde(rename = "ExtendedWire", default)]
    pub extended_wires: Vec<ExtendedWireParameter>,
}

fn bit_mask(bits: &[NamedBit], names: &[&str]) -> Option<u64> {
    names.iter().try_fold(0u64, |mask, name| {
        let bit = bits.iter().find(|bit| bit.name == *name)?;
        Some(mask | 1 << bit.bit)
    })
}

impl DeviceConfig {
    pub fn memory_limits(&self) -> MemoryLimits {
        MemoryLimits {
            code_words: self.command_memory.words,
            data_words: self.data_memory.words,
        }
    }

    pub fn dds_chip(&self, channel: u8) -> Option<&str> {
        self.dds
            .iter()
            .find(|dds| dds.channel == channel)
            .map(|dds| dds.chip.as_str())
    }

    /// Mask of the named shutters, `None` if a name is unknown.
    pub fn shutter_mask(&self, names: &[&str]) -> Option<u64> {
        bit_mask(&self.shutter_bits, names)
    }

    pub fn trigger_mask(&self, names: &[&str]) -> Option<u64> {
        bit_mask(&self.trigger_bits, names)
    }

    pub fn counter_mask(&self, names: &[&str]) -> Option<u64> {
        bit_mask(&self.counter_bits, names)
    }

    /// Named view of the external status wire.
    pub fn status(&self, word: u16) -> IndexMap<String, bool> {
        self.status_bits
            .iter()
            .map(|bit| (bit.name.clone(), (word >> bit.bit) & 1 == 1))
            .collect()
    }

    fn validate(&self) -> Result<()> {
        let fail = |message: String| Err(Error::Config(format!("Configuration {}: {message}", self.id)));
        if self.command_memory.words == 0 || self.data_memory.words == 0 {
            return fail("memory sizes must not be zero".to_string());
        }
        if let Some(dds) = self.dds.iter().find(|dds| !DDS_CHIPS.contains(&dds.chip.as_str())) {
            return fail(format!("unknown DDS chip '{}'", dds.chip));
        }
        let encodings = self
            .dac
            .iter()
            .chain(&self.adc)
            .map(|converter| converter.encoding.as_str())
            .chain(self.extended_wires.iter().filter_map(|wire| wire.encoding.as_deref()));
        for encoding in encodings {
            if encodings::lookup(encoding).is_err() {
                return fail(format!("unknown encoding '{encoding}'"));
            }
        }
        if let Some(bit) = self.status_bits.iter().find(|bit| bit.bit >= 16) {
            return fail(format!("status bit '{}' is outside of the status wire", bit.name));
        }
        let mut mask_bits = self.shutter_bits.iter().chain(&self.trigger_bits).chain(&self.counter_bits);
        if let Some(bit) = mask_bits.find(|bit| bit.bit >= 64) {
            return fail(format!("bit '{}' is outside of a 64-bit mask", bit.name));
        }
        Ok(())
    }
}

/// All configurations of one descriptor document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceConfigs {
    #[serde(rename = "Configuration", default)]
    pub configurations: Vec<DeviceConfig>,
}

impl DeviceConfigs {
    pub fn parse(xml: &str) -> Result<Self> {
        let configs: DeviceConfigs = quick_xml::de::from_str(xml)
            .map_err(|err| Error::Config(format!("Invalid device configuration: {err}")))?;
        let mut ids = HashSet::new();
        for config in &configs.configurations {
            if !ids.insert(config.id) {
                return Err(Error::Config(format!("Configuration id {} is not unique", config.id)));
            }
            config.validate()?;
        }
        Ok(configs)
    }

    /// The descriptor compiled into the binary.
    pub fn embedded() -> Result<Self> {
        Self::parse(EMBEDDED)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    pub fn for_hardware_id(&self, id: u16) -> Result<&DeviceConfig> {
        self.configurations
            .iter()
            .find(|config| config.id == id)
            .ok_or_else(|| Error::Config(format!("No configuration for hardware id {id:#x}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_descriptor() {
        let configs = DeviceConfigs::embedded().unwrap();
        let config = configs.for_hardware_id(1).unwrap();
        assert_eq!(config.memory_limits(), MemoryLimits::default());
        assert_eq!(config.dds.len(), 4);
        assert_eq!(config.dds_chip(3), Some("AD9912"));
        assert_eq!(config.dac.as_ref().unwrap().encoding, "DAC8568_VOLTAGE");
        assert_eq!(config.shutter_mask(&["Cooling", "Raman"]), Some(0b1001));
        assert_eq!(config.counter_mask(&["Timestamps"]), Some(1 << 8));
        assert_eq!(config.trigger_mask(&["Nope"]), None);
        assert_eq!(config.extended_wires[0].encoding.as_deref(), Some("TIME"));
        assert_eq!(config.extended_wires[1].encoding, None);
        let status = config.status(0b101);
        assert!(status["ExternalTrigger"]);
        assert!(!status["ClockLocked"]);
        assert!(status["PowerGood"]);

        assert_eq!(configs.for_hardware_id(2).unwrap().memory_limits().code_words, 16384);
        assert!(matches!(configs.for_hardware_id(9), Err(Error::Config(_))));
    }

    fn single(body: &str) -> String {
        format!(
            r#"<DeviceConfigurations><Configuration id="5" name="test"><CommandMemory words="16"/><DataMemory words="16"/>{body}</Configuration></DeviceConfigurations>"#
        )
    }

    #[test]
    fn test_validation() {
        assert!(DeviceConfigs::parse(&single("")).is_ok());
        assert!(DeviceConfigs::parse(&single(r#"<Dac channels="1" encoding="NOPE"/>"#)).is_err());
        assert!(DeviceConfigs::parse(&single(r#"<Dds channel="0" chip="AD1234"/>"#)).is_err());
        assert!(DeviceConfigs::parse(&single(r#"<StatusBit name="x" bit="16"/>"#)).is_err());
        assert!(DeviceConfigs::parse("<DeviceConfigurations><Configuration/></DeviceConfigurations>").is_err());
        let twice = r#"<DeviceConfigurations>
            <Configuration id="1" name="a"><CommandMemory words="1"/><DataMemory words="1"/></Configuration>
            <Configuration id="1" name="b"><CommandMemory words="1"/><DataMemory words="1"/></Configuration>
        </DeviceConfigurations>"#;
        assert!(matches!(DeviceConfigs::parse(twice), Err(Error::Config(_))));
    }
}
