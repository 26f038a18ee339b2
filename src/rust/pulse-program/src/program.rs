// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Two-pass assembler producing instruction and data memory images.

use std::path::Path;

use expression::{Evaluator, Value};
use indexmap::IndexMap;
use ionpulse_log::warn;
use ionpulse_units::Quantity;

use crate::opcode::{Instruction, OperandKind, Opcode};
use crate::source::{FileLoader, SourceLine, SourceLoader, SourceSet};
use crate::variable::{DATA_WORD_BYTES, Variable, VariableType};
use crate::{Error, PpError, Result};

/// Bit set on every address of a multi-variable update except the last.
pub const MORE_FOLLOWS: u64 = 1 << 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLimits {
    pub code_words: usize,
    pub data_words: usize,
}

impl Default for MemoryLimits {
    fn default() -> Self {
        MemoryLimits {
            code_words: 4096,
            data_words: 4096,
        }
    }
}

/// One row of [`PulseProgram::listing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRow {
    pub address: usize,
    pub word: u32,
    pub mnemonic: &'static str,
    pub operand: String,
    pub source: String,
}

/// Where an instruction came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    /// Line of the ppp source the assembly was generated from.
    pub ppp_line: Option<usize>,
}

#[derive(Debug, Clone)]
struct PendingInstruction {
    opcode: Opcode,
    args: Vec<String>,
    line: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PulseProgram {
    sources: SourceSet,
    limits: MemoryLimits,
    constants: IndexMap<String, Value>,
    variables: IndexMap<String, Variable>,
    labels: IndexMap<String, usize>,
    code: Vec<Instruction>,
    /// Index into the source lines for every instruction.
    code_lines: Vec<usize>,
    data: Vec<u64>,
    /// Assembly line number (in the main file) to ppp line.
    reverse_line_lookup: IndexMap<usize, usize>,
}

impl PulseProgram {
    pub fn new(limits: MemoryLimits) -> Self {
        PulseProgram {
            limits,
            ..Default::default()
        }
    }

    pub fn limits(&self) -> MemoryLimits {
        self.limits
    }

    pub fn set_limits(&mut self, limits: MemoryLimits) {
        self.limits = limits;
    }

    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path).map_err(|err| PpError {
            file: path.display().to_string(),
            line: 0,
            context: String::new(),
            message: err.to_string(),
        })?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        self.load_source(&name, &text, &FileLoader::for_file(path))
    }

    /// Replace the sources and assemble them.
    ///
    /// On error the previously assembled program is left untouched.
    pub fn load_source(&mut self, name: &str, text: &str, loader: &dyn SourceLoader) -> Result<()> {
        let mut program = PulseProgram::new(self.limits);
        program.sources = SourceSet::expand(name, text, loader)?;
        program.run_passes()?;
        *self = program;
        Ok(())
    }

    /// Assemble text without `insert` support.
    pub fn load_text(&mut self, name: &str, text: &str) -> Result<()> {
        self.load_source(name, text, &())
    }

    pub fn set_reverse_line_lookup(&mut self, lookup: IndexMap<usize, usize>) {
        self.reverse_line_lookup = lookup;
    }

    fn error(&self, line: usize, message: impl Into<String>) -> Error {
        let source = &self.sources.lines[line];
        Error::Pp(PpError {
            file: source.file.to_string(),
            line: source.line,
            context: source.text.trim().to_string(),
            message: message.into(),
        })
    }

    /// Run both assembler passes over the loaded sources.
    ///
    /// Variable values return to their declarations. Nothing changes on error.
    pub fn assemble(&mut self) -> Result<()> {
        let mut program = PulseProgram {
            sources: self.sources.clone(),
            limits: self.limits,
            reverse_line_lookup: self.reverse_line_lookup.clone(),
            ..Default::default()
        };
        program.run_passes()?;
        *self = program;
        Ok(())
    }

    /// Fill the symbol tables and images of a freshly created program.
    fn run_passes(&mut self) -> Result<()> {
        let mut pending = Vec::new();
        let lines = self.sources.lines.clone();
        for (index, line) in lines.iter().enumerate() {
            self.first_pass(index, line, &mut pending)?;
        }
        if pending.len() > self.limits.code_words {
            return Err(Error::CodeSize {
                words: pending.len(),
                limit: self.limits.code_words,
            });
        }
        if self.variables.len() > self.limits.data_words {
            return Err(Error::DataSize {
                words: self.variables.len(),
                limit: self.limits.data_words,
            });
        }
        for instruction in &pending {
            let operand = self.resolve_operand(instruction)?;
            self.code.push(Instruction::new(instruction.opcode, operand));
            self.code_lines.push(instruction.line);
        }
        self.data = self.variables.values().map(encode_or_zero).collect();
        Ok(())
    }

    fn first_pass(
        &mut self,
        index: usize,
        line: &SourceLine,
        pending: &mut Vec<PendingInstruction>,
    ) -> Result<()> {
        let (code, comment) = match line.text.split_once('#') {
            Some((code, comment)) => (code.trim(), Some(comment.trim())),
            None => (line.text.trim(), None),
        };
        if code.is_empty() {
            return Ok(());
        }
        if let Some(rest) = code.strip_prefix("const ") {
            let (name, value) = rest
                .trim()
                .split_once(char::is_whitespace)
                .ok_or_else(|| self.error(index, "expected 'const NAME VALUE'"))?;
            let value = self.evaluate(index, value)?;
            self.constants.insert(name.to_string(), value);
            return Ok(());
        }
        if let Some(rest) = code.strip_prefix("var ") {
            return self.declare_variable(index, rest.trim(), comment);
        }
        let mut statement = code;
        if let Some((label, rest)) = code.split_once(':') {
            let label = label.trim();
            if !is_identifier(label) {
                return Err(self.error(index, format!("invalid label '{label}'")));
            }
            if self.labels.insert(label.to_string(), pending.len()).is_some() {
                return Err(self.error(index, format!("label '{label}' defined twice")));
            }
            statement = rest.trim();
            if statement.is_empty() {
                return Ok(());
            }
        }
        let (mnemonic, args) = statement
            .split_once(char::is_whitespace)
            .unwrap_or((statement, ""));
        let opcode = Opcode::from_mnemonic(&mnemonic.to_ascii_uppercase())
            .ok_or_else(|| self.error(index, format!("unknown mnemonic '{mnemonic}'")))?;
        let args = split_top_level(args)
            .into_iter()
            .filter(|arg| !arg.is_empty())
            .collect();
        pending.push(PendingInstruction {
            opcode,
            args,
            line: index,
        });
        Ok(())
    }

    fn evaluate(&self, index: usize, text: &str) -> Result<Value> {
        let mut scope: IndexMap<String, Value> = self.constants.clone();
        for (name, var) in &self.variables {
            scope
                .entry(name.clone())
                .or_insert_with(|| Value::Quantity(var.value.clone()));
        }
        Evaluator::new()
            .evaluate(text, &scope)
            .map(|evaluation| evaluation.value)
            .map_err(|err| self.error(index, err.to_string()))
    }

    fn declare_variable(&mut self, index: usize, rest: &str, comment: Option<&str>) -> Result<()> {
        let (name, fields) = rest
            .split_once(char::is_whitespace)
            .ok_or_else(|| self.error(index, "expected 'var NAME VALUE'"))?;
        if !is_identifier(name) {
            return Err(self.error(index, format!("invalid variable name '{name}'")));
        }
        if self.variables.contains_key(name) {
            return Err(self.error(index, format!("variable '{name}' declared twice")));
        }
        let fields = split_top_level(fields);
        let field = |i: usize| fields.get(i).map(String::as_str).filter(|f| !f.is_empty());
        let value = self.evaluate(index, field(0).unwrap_or("0"))?;
        let var_type = match field(1) {
            Some(t) => t.parse::<VariableType>().map_err(|msg| self.error(index, msg))?,
            None => VariableType::Parameter,
        };
        let unit = field(2).map(str::to_string);
        let mask = match &value {
            Value::Int(bits) if var_type.is_mask() => Some(*bits as u64),
            _ => None,
        };
        let mut quantity = match value {
            Value::Quantity(q) => q,
            other if other.is_numeric() => Quantity::dimensionless(
                other.to_f64("var").map_err(|err| self.error(index, err.to_string()))?,
            ),
            other => {
                return Err(self.error(index, format!("variable value must be numeric, got {other}")));
            }
        };
        if let Some(unit) = &unit {
            quantity = if quantity.is_plain_number() {
                Quantity::new(quantity.magnitude(), unit)
            } else {
                quantity.to_unit(unit)
            }
            .map_err(|err| self.error(index, err.to_string()))?;
        }
        let mut variable = Variable::new(name, var_type, quantity);
        variable.unit = unit;
        variable.encoding = field(3).map(str::to_string);
        variable.comment = comment.filter(|c| !c.is_empty()).map(str::to_string);
        variable.expression = field(0).map(str::to_string);
        variable.mask = mask;
        variable.place(self.variables.len());
        if let Some(encoding) = &variable.encoding {
            encodings::lookup(encoding).map_err(|err| self.error(index, err.to_string()))?;
        }
        self.variables.insert(name.to_string(), variable);
        Ok(())
    }

    fn resolve_symbol(&self, instruction: &PendingInstruction, arg: &str) -> Result<u32> {
        if let Some(value) = parse_literal(arg) {
            return Ok(value);
        }
        let prefer_label = instruction.opcode.operand_kind() == OperandKind::Code;
        let label = self.labels.get(arg).map(|&address| address as u32);
        let variable = self.variables.get(arg).map(|var| var.address as u32);
        let constant = self.constants.get(arg).and_then(|value| value.to_i64().ok()).map(|v| v as u32);
        let resolved = if prefer_label {
            label.or(variable)
        } else {
            variable.or(label)
        };
        resolved
            .or(constant)
            .ok_or_else(|| self.error(instruction.line, format!("unresolved identifier '{arg}'")))
    }

    fn resolve_operand(&self, instruction: &PendingInstruction) -> Result<u32> {
        let operand = match instruction.args.as_slice() {
            [] => 0,
            [arg] => self.resolve_symbol(instruction, arg)?,
            [channel, data] => {
                let channel = self.resolve_symbol(instruction, channel)?;
                if channel > 0xff {
                    return Err(self.error(instruction.line, format!("channel {channel} out of range")));
                }
                let data = self.resolve_symbol(instruction, data)?;
                if data > 0xfff {
                    return Err(self.error(
                        instruction.line,
                        format!("data address {data:#x} does not fit the 12-bit channel operand"),
                    ));
                }
                (channel << 12) | data
            }
            _ => return Err(self.error(instruction.line, "too many operands")),
        };
        if operand > Instruction::OPERAND_MASK {
            return Err(self.error(instruction.line, format!("operand {operand:#x} exceeds 24 bits")));
        }
        Ok(operand)
    }

    pub fn variables(&self) -> &IndexMap<String, Variable> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn labels(&self) -> &IndexMap<String, usize> {
        &self.labels
    }

    pub fn constants(&self) -> &IndexMap<String, Value> {
        &self.constants
    }

    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    pub fn data(&self) -> &[u64] {
        &self.data
    }

    pub fn sources(&self) -> &IndexMap<String, String> {
        &self.sources.files
    }

    pub fn code_image(&self) -> Vec<u8> {
        self.code.iter().flat_map(|i| i.word().to_le_bytes()).collect()
    }

    pub fn data_image(&self) -> Vec<u8> {
        words_to_bytes(&self.data)
    }

    /// Source location of the instruction at `address`.
    pub fn source_location(&self, address: usize) -> Option<SourceLocation> {
        let line = &self.sources.lines[*self.code_lines.get(address)?];
        let is_main = self.sources.files.get_index(0).is_some_and(|(name, _)| **name == *line.file);
        Some(SourceLocation {
            file: line.file.to_string(),
            line: line.line,
            ppp_line: is_main
                .then(|| self.reverse_line_lookup.get(&line.line).copied())
                .flatten(),
        })
    }

    /// Change the value of a variable; returns its slot and new data word.
    pub fn set_variable(&mut self, name: &str, value: Quantity) -> Result<(usize, u64)> {
        let variable = self
            .variables
            .get_mut(name)
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))?;
        variable.value = value;
        variable.mask = None;
        let word = encode_or_zero(variable);
        let slot = variable.slot;
        self.data[slot] = word;
        Ok((slot, word))
    }

    /// Store an exact bit pattern in a shutter, trigger or counter variable.
    pub fn set_mask(&mut self, name: &str, mask: u64) -> Result<(usize, u64)> {
        let variable = self
            .variables
            .get_mut(name)
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))?;
        if !variable.var_type.is_mask() {
            return self.set_variable(name, Quantity::dimensionless(mask as f64));
        }
        variable.mask = Some(mask);
        variable.value = Quantity::dimensionless(mask as f64);
        let word = encode_or_zero(variable);
        let slot = variable.slot;
        self.data[slot] = word;
        Ok((slot, word))
    }

    /// Enable or disable a variable; returns its slot and data word if that changed.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Option<(usize, u64)> {
        let variable = self.variables.get_mut(name)?;
        if variable.enabled == enabled {
            return None;
        }
        variable.enabled = enabled;
        let (slot, word) = (variable.slot, encode_or_zero(variable));
        let before = std::mem::replace(&mut self.data[slot], word);
        (before != word).then_some((slot, word))
    }

    /// Apply several value changes; returns the `(slot, word)` pairs that changed.
    ///
    /// Unknown names are logged and skipped.
    pub fn update_variables(&mut self, values: &IndexMap<String, Quantity>) -> Vec<(usize, u64)> {
        self.update_each(values, |program, name, value| program.set_variable(name, value.clone()))
    }

    /// Like [`PulseProgram::update_variables`] for mask bit patterns.
    pub fn update_masks(&mut self, masks: &IndexMap<String, u64>) -> Vec<(usize, u64)> {
        self.update_each(masks, |program, name, mask| program.set_mask(name, *mask))
    }

    fn update_each<T>(
        &mut self,
        values: &IndexMap<String, T>,
        mut set: impl FnMut(&mut Self, &str, &T) -> Result<(usize, u64)>,
    ) -> Vec<(usize, u64)> {
        let mut changed = Vec::new();
        for (name, value) in values {
            let Some(variable) = self.variables.get(name) else {
                warn!("Ignoring update of unknown variable '{}'", name);
                continue;
            };
            let before = self.data[variable.slot];
            if let Ok((slot, word)) = set(self, name, value) {
                if word != before {
                    changed.push((slot, word));
                }
            }
        }
        changed
    }

    /// Flat `[address, word, address, word, ...]` stream scanning one variable.
    pub fn variable_scan_code(&self, name: &str, values: &[Quantity]) -> Result<Vec<u64>> {
        let variable = self
            .variables
            .get(name)
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))?;
        let mut code = Vec::with_capacity(2 * values.len());
        for value in values {
            code.push(variable.address as u64);
            code.push(variable.encode_value(value)?);
        }
        Ok(code)
    }

    /// Update stream for several variables at once; every address but the
    /// last carries [`MORE_FOLLOWS`].
    pub fn multi_variable_update_code(&self, names: &[&str], values: &[Quantity]) -> Result<Vec<u64>> {
        let mut code = Vec::with_capacity(2 * names.len());
        for (i, (name, value)) in names.iter().zip(values).enumerate() {
            let variable = self
                .variables
                .get(*name)
                .ok_or_else(|| Error::UnknownVariable(name.to_string()))?;
            let flag = if i + 1 < names.len() { MORE_FOLLOWS } else { 0 };
            code.push(variable.address as u64 | flag);
            code.push(variable.encode_value(value)?);
        }
        Ok(code)
    }

    /// Comment or name of the exitcode variable whose word equals `code`.
    pub fn exitcode_name(&self, code: u64) -> String {
        self.variables
            .values()
            .filter(|var| var.var_type == VariableType::Exitcode)
            .find(|var| var.encode().is_ok_and(|word| word == code))
            .map(|var| var.comment.clone().unwrap_or_else(|| var.name.clone()))
            .unwrap_or_else(|| format!("Exitcode {code:#x} Not found"))
    }

    pub fn listing(&self) -> Vec<ListingRow> {
        self.code
            .iter()
            .enumerate()
            .map(|(address, instruction)| ListingRow {
                address,
                word: instruction.word(),
                mnemonic: instruction.opcode.mnemonic(),
                operand: self.describe_operand(*instruction),
                source: self.sources.lines[self.code_lines[address]].text.trim().to_string(),
            })
            .collect()
    }

    pub(crate) fn describe_operand(&self, instruction: Instruction) -> String {
        let operand = instruction.operand as usize;
        let data_name = |address: usize| {
            (address % DATA_WORD_BYTES == 0)
                .then(|| self.variables.get_index(address / DATA_WORD_BYTES))
                .flatten()
                .map_or_else(|| address.to_string(), |(name, _)| name.clone())
        };
        match instruction.opcode.operand_kind() {
            OperandKind::None => String::new(),
            OperandKind::Literal => operand.to_string(),
            OperandKind::Data => data_name(operand),
            OperandKind::Code => self
                .labels
                .iter()
                .find(|(_, address)| **address == operand)
                .map_or_else(|| operand.to_string(), |(name, _)| name.clone()),
            OperandKind::ChannelData => format!("{}, {}", operand >> 12, data_name(operand & 0xfff)),
        }
    }
}

pub fn words_to_bytes(words: &[u64]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

fn encode_or_zero(variable: &Variable) -> u64 {
    if !variable.enabled {
        return 0;
    }
    variable.encode().unwrap_or_else(|err| {
        warn!("Variable '{}' cannot be encoded, using 0: {}", variable.name, err);
        0
    })
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_literal(text: &str) -> Option<u32> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Split on commas that are not nested in brackets or quotes.
fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote = None;
    let mut current = String::new();
    for c in text.chars() {
        match (c, quote) {
            (q @ ('"' | '\''), None) => quote = Some(q),
            (q, Some(open)) if q == open => quote = None,
            ('(' | '[' | '{', None) => depth += 1,
            (')' | ']' | '}', None) => depth -= 1,
            (',', None) if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() || !parts.is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}
