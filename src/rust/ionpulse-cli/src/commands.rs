// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};
use ionpulse_units::Quantity;
use pulse_program::PulseProgram;
use pulser::BitfileInfo;
use serde_json::{Value, json};

pub(crate) fn compile(input: &Path) -> Result<String> {
    let source = std::fs::read_to_string(input).with_context(|| format!("Reading {}", input.display()))?;
    let compiled =
        ppp_compiler::compile(&source).with_context(|| format!("Compiling {}", input.display()))?;
    Ok(compiled.assembly)
}

/// Assemble `.pp` files directly and compile `.ppp` files first.
pub(crate) fn assemble(input: &Path) -> Result<PulseProgram> {
    let mut program = PulseProgram::default();
    if input.extension().is_some_and(|ext| ext == "ppp") {
        let name = input.file_name().map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        let compiled = ppp_compiler::compile(&std::fs::read_to_string(input)?)
            .with_context(|| format!("Compiling {}", input.display()))?;
        program.load_text(&name, &compiled.assembly)?;
        program.set_reverse_line_lookup(compiled.reverse_line_lookup);
    } else {
        program.load_file(input)?;
    }
    Ok(program)
}

pub(crate) fn listing_text(program: &PulseProgram) -> String {
    let mut text = String::new();
    for row in program.listing() {
        // Writing to a String cannot fail.
        let _ = writeln!(
            text,
            "{:04x}  {:08x}  {:<16} {:<12} {}",
            row.address, row.word, row.mnemonic, row.operand, row.source
        );
    }
    for (name, variable) in program.variables() {
        let _ = writeln!(
            text,
            "{:04x}  {:016x}  {} = {}",
            variable.address,
            program.data()[variable.slot],
            name,
            variable.value
        );
    }
    text
}

pub(crate) fn listing_json(program: &PulseProgram) -> Value {
    let code: Vec<Value> = program
        .listing()
        .into_iter()
        .map(|row| {
            json!({
                "address": row.address,
                "word": row.word,
                "mnemonic": row.mnemonic,
                "operand": row.operand,
                "source": row.source,
            })
        })
        .collect();
    let variables: Vec<Value> = program
        .variables()
        .values()
        .map(|variable| {
            json!({
                "name": variable.name,
                "type": variable.var_type.as_str(),
                "address": variable.address,
                "slot": variable.slot,
                "value": variable.value.to_string(),
                "encoding": variable.encoding,
                "word": program.data()[variable.slot],
            })
        })
        .collect();
    json!({ "code": code, "variables": variables })
}

pub(crate) fn disassemble(image: &[u8]) -> Result<String> {
    Ok(pulse_program::disassemble(image)?.join("\n"))
}

pub(crate) fn encode(value: &str, encoding: Option<&str>) -> Result<String> {
    let quantity = Quantity::parse(value)?;
    let word = encodings::encode(&quantity, encoding)?;
    Ok(format!("{word:#x}"))
}

fn parse_word(text: &str) -> Result<u64> {
    let text = text.trim();
    let word = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.parse(),
    };
    word.with_context(|| format!("'{text}' is not a data word"))
}

pub(crate) fn decode(word: &str, encoding: Option<&str>) -> Result<String> {
    Ok(encodings::decode_q(parse_word(word)?, encoding)?.to_string())
}

pub(crate) fn bitfile_info(path: &Path) -> Result<String> {
    let (info, _) = BitfileInfo::load(path).with_context(|| format!("Reading {}", path.display()))?;
    Ok(format!(
        "design: {}\npart: {}\nbuilt: {} {}\nbitstream: {} bytes\nmd5: {}",
        info.design, info.part, info.date, info.time, info.bitstream_length, info.md5
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(source: &str) -> PulseProgram {
        let mut program = PulseProgram::default();
        program.load_text("test.pp", source).unwrap();
        program
    }

    #[test]
    fn test_encode_decode() {
        assert_eq!(encode("2.5 V", Some("DAC8568_VOLTAGE")).unwrap(), "0x8000");
        assert_eq!(encode("42", None).unwrap(), "0x2a");
        assert!(encode("1 V", Some("AD9912_FRQ")).is_err());
        assert_eq!(decode("0x8000", Some("DAC8568_VOLTAGE")).unwrap(), "2.5 V");
        assert!(parse_word("12ab").is_err());
        assert_eq!(parse_word("0xffff_ffff").unwrap(), 0xffff_ffff);
    }

    #[test]
    fn test_listing() {
        let program = program("var t 1 us, parameter, us, TIME\nUPDATE t\nEND\n");
        let text = listing_text(&program);
        assert!(text.contains("UPDATE"));
        assert!(text.contains("t = 1 us"));
        let json = listing_json(&program);
        assert_eq!(json["code"].as_array().unwrap().len(), 2);
        assert_eq!(json["variables"][0]["word"], 200);
        assert_eq!(json["variables"][0]["type"], "parameter");
    }

    #[test]
    fn test_disassemble_round_trip() {
        let program = program("NOP\nEND\n");
        let text = disassemble(&program.code_image()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(disassemble(&[0, 1, 2]).is_err());
    }
}
