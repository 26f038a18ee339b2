// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Bookkeeping of the loaded pulse program and the values it runs with.

use std::path::Path;

use indexmap::IndexMap;
use ionpulse_log::{info, warn};
use ionpulse_units::Quantity;
use pulse_program::{MemoryLimits, PulseProgram, ResolvedContext, words_to_bytes};

use crate::Result;

/// Code and data images ready for upload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramImages {
    pub code: Vec<u8>,
    pub data: Vec<u8>,
}

/// Owns the current [`PulseProgram`] and merges variable values into it.
///
/// Values are applied in increasing priority: the declaration defaults, the
/// active context and finally the overrides set by
/// [`PulseProgramController::update_variables`] or passed to
/// [`PulseProgramController::pulse_program_binary`].
#[derive(Debug, Clone, Default)]
pub struct PulseProgramController {
    program: PulseProgram,
    defaults: IndexMap<String, Quantity>,
    default_masks: IndexMap<String, u64>,
    context: Option<ResolvedContext>,
    overrides: IndexMap<String, Quantity>,
}

impl PulseProgramController {
    pub fn new(limits: MemoryLimits) -> Self {
        PulseProgramController {
            program: PulseProgram::new(limits),
            ..Default::default()
        }
    }

    pub fn program(&self) -> &PulseProgram {
        &self.program
    }

    pub fn set_limits(&mut self, limits: MemoryLimits) {
        self.program.set_limits(limits);
    }

    /// Load ppp or assembly source; on error the previous program stays loaded.
    ///
    /// Sources whose name ends in `.ppp` are compiled first.
    pub fn load(&mut self, name: &str, text: &str) -> Result<()> {
        let mut program = PulseProgram::new(self.program.limits());
        if name.ends_with(".ppp") {
            let compiled = ppp_compiler::compile(text)?;
            program.load_text(name, &compiled.assembly)?;
            program.set_reverse_line_lookup(compiled.reverse_line_lookup);
        } else {
            program.load_text(name, text)?;
        }
        self.install(program);
        Ok(())
    }

    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        if path.extension().is_some_and(|ext| ext == "ppp") {
            let text = std::fs::read_to_string(path)?;
            let name = path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
            return self.load(&name, &text);
        }
        let mut program = PulseProgram::new(self.program.limits());
        program.load_file(path)?;
        self.install(program);
        Ok(())
    }

    fn install(&mut self, program: PulseProgram) {
        self.defaults = program
            .variables()
            .iter()
            .map(|(name, var)| (name.clone(), var.value.clone()))
            .collect();
        self.default_masks = program
            .variables()
            .iter()
            .filter_map(|(name, var)| var.mask.map(|mask| (name.clone(), mask)))
            .collect();
        self.overrides.retain(|name, _| self.defaults.contains_key(name));
        info!(
            "Loaded pulse program with {} instructions and {} variables",
            program.code().len(),
            program.variables().len()
        );
        self.program = program;
    }

    /// Reassemble the loaded sources.
    pub fn assemble(&mut self) -> Result<()> {
        self.program.assemble()?;
        Ok(())
    }

    pub fn set_context(&mut self, context: Option<ResolvedContext>) {
        self.context = context;
    }

    pub fn context(&self) -> Option<&ResolvedContext> {
        self.context.as_ref()
    }

    pub fn overrides(&self) -> &IndexMap<String, Quantity> {
        &self.overrides
    }

    /// Remember new override values and return the data words that changed.
    ///
    /// Unknown names are logged and ignored.
    pub fn update_variables(&mut self, values: &IndexMap<String, Quantity>) -> Vec<(usize, u64)> {
        for (name, value) in values {
            if self.defaults.contains_key(name) {
                self.overrides.insert(name.clone(), value.clone());
            }
        }
        self.program.update_variables(values)
    }

    /// Code and data images with all value sources merged.
    pub fn pulse_program_binary(&mut self, overrides: &IndexMap<String, Quantity>) -> ProgramImages {
        self.program.update_variables(&self.defaults);
        self.program.update_masks(&self.default_masks);
        for name in self.defaults.keys() {
            self.program.set_enabled(name, true);
        }
        if let Some(context) = &self.context {
            context.apply(&mut self.program);
        }
        self.program.update_variables(&self.overrides);
        for name in overrides.keys().filter(|name| !self.defaults.contains_key(*name)) {
            warn!("Ignoring override of unknown variable '{}'", name);
        }
        let known: IndexMap<String, Quantity> = overrides
            .iter()
            .filter(|(name, _)| self.defaults.contains_key(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        self.program.update_variables(&known);
        ProgramImages {
            code: self.program.code_image(),
            data: self.program.data_image(),
        }
    }

    /// Update stream scanning `name` over `values`, as bytes for the input FIFO.
    pub fn variable_scan_code(&self, name: &str, values: &[Quantity]) -> Result<Vec<u8>> {
        let words = self.program.variable_scan_code(name, values)?;
        Ok(words_to_bytes(&words))
    }

    /// Name of the exit code `code`.
    pub fn exitcode(&self, code: u64) -> String {
        self.program.exitcode_name(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ionpulse_units::q;

    const SOURCE: &str = "\
var freq 100, parameter, MHz, AD9912_FRQ
var gain 2, parameter
var done 3, exitcode # Cooling lost
DDSFRQ 0, freq
END
";

    fn word(controller: &PulseProgramController, name: &str, images: &ProgramImages) -> u64 {
        let slot = controller.program().variable(name).unwrap().slot;
        let bytes: [u8; 8] = images.data[8 * slot..8 * slot + 8].try_into().unwrap();
        u64::from_le_bytes(bytes)
    }

    fn loaded() -> PulseProgramController {
        let mut controller = PulseProgramController::default();
        controller.load("test.pp", SOURCE).unwrap();
        controller
    }

    #[test]
    fn test_override_priority() {
        let mut controller = loaded();
        let mut context = ResolvedContext::default();
        context.values.insert("gain".to_string(), q(5.0, "").unwrap());
        context.values.insert("freq".to_string(), q(120.0, "MHz").unwrap());
        controller.set_context(Some(context));
        controller.update_variables(&IndexMap::from([("freq".to_string(), q(130.0, "MHz").unwrap())]));

        let images = controller.pulse_program_binary(&IndexMap::new());
        assert_eq!(word(&controller, "gain", &images), 5);
        let freq = encodings::encode(&q(130.0, "MHz").unwrap(), Some("AD9912_FRQ")).unwrap();
        assert_eq!(word(&controller, "freq", &images), freq);

        let images = controller.pulse_program_binary(&IndexMap::from([("gain".to_string(), q(7.0, "").unwrap())]));
        assert_eq!(word(&controller, "gain", &images), 7);
    }

    #[test]
    fn test_unknown_override_ignored() {
        let mut controller = loaded();
        let before = controller.pulse_program_binary(&IndexMap::new());
        let changed = controller.update_variables(&IndexMap::from([("bogus".to_string(), q(1.0, "").unwrap())]));
        assert!(changed.is_empty());
        let after = controller.pulse_program_binary(&IndexMap::from([("bogus".to_string(), q(1.0, "").unwrap())]));
        assert_eq!(before, after);
        assert!(controller.overrides().is_empty());
    }

    #[test]
    fn test_failed_load_keeps_program() {
        let mut controller = loaded();
        assert!(controller.load("broken.pp", "BOGUS 1\n").is_err());
        assert!(controller.load("broken.ppp", "if x > :\n    pass\n").is_err());
        assert!(controller.program().variable("freq").is_some());
    }

    #[test]
    fn test_declared_mask_survives_merge() {
        let mut controller = PulseProgramController::default();
        controller
            .load("masks.pp", "var shutters 0x4000000000000001, shutter\nSHUTTERMASK shutters\n")
            .unwrap();
        let images = controller.pulse_program_binary(&IndexMap::new());
        assert_eq!(word(&controller, "shutters", &images), 0x4000_0000_0000_0001);
    }

    #[test]
    fn test_exitcode_names() {
        let controller = loaded();
        assert_eq!(controller.exitcode(0xfffe_0000_0000_0003), "Cooling lost");
        assert_eq!(controller.exitcode(0x42), "Exitcode 0x42 Not found");
    }

    #[test]
    fn test_scan_code_bytes() {
        let controller = loaded();
        let values = [q(100.0, "MHz").unwrap(), q(101.0, "MHz").unwrap()];
        let bytes = controller.variable_scan_code("freq", &values).unwrap();
        assert_eq!(bytes.len(), 32);
        assert!(controller.variable_scan_code("missing", &values).is_err());
    }
}
