// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use crate::opcode::{Instruction, OperandKind};
use crate::{Error, Result};

/// Turn an instruction image back into assembly text, one line per word.
///
/// Operands are printed numerically since names are not part of the image;
/// use [`crate::PulseProgram::listing`] for symbolic output.
pub fn disassemble(image: &[u8]) -> Result<Vec<String>> {
    if image.len() % 4 != 0 {
        return Err(Error::Image(format!(
            "instruction image length {} is not a multiple of 4",
            image.len()
        )));
    }
    image
        .chunks_exact(4)
        .enumerate()
        .map(|(address, chunk)| {
            let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let instruction = Instruction::from_word(word).ok_or_else(|| {
                Error::Image(format!("unknown opcode {:#04x} at address {address}", word >> 24))
            })?;
            Ok(format_instruction(instruction))
        })
        .collect()
}

pub fn format_instruction(instruction: Instruction) -> String {
    let mnemonic = instruction.opcode.mnemonic();
    let operand = instruction.operand;
    match instruction.opcode.operand_kind() {
        OperandKind::None if operand == 0 => mnemonic.to_string(),
        OperandKind::ChannelData => format!("{mnemonic} {}, {}", operand >> 12, operand & 0xfff),
        _ => format!("{mnemonic} {operand}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryLimits, PulseProgram};

    #[test]
    fn test_disassemble_reassembles() {
        let source = "var a 5\nvar b 6\nloop: DDSAMP 1, b\nINC a\nJMPNZ loop\nEND";
        let mut program = PulseProgram::new(MemoryLimits::default());
        program.load_text("a.pp", source).unwrap();
        let text = disassemble(&program.code_image()).unwrap();
        assert_eq!(text, ["DDSAMP 1, 8", "INC 0", "JMPNZ 0", "END"]);

        let mut again = PulseProgram::new(MemoryLimits::default());
        let declarations = "var a 5\nvar b 6\n";
        again
            .load_text("b.pp", &format!("{declarations}{}", text.join("\n")))
            .unwrap();
        assert_eq!(again.code_image(), program.code_image());
    }

    #[test]
    fn test_bad_images() {
        assert!(disassemble(&[0, 0, 0]).is_err());
        assert!(disassemble(&[0, 0, 0, 0xfe]).is_err());
    }
}
