// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use indexmap::IndexMap;
use ionpulse_units::Quantity;
use proptest::prelude::*;
use pulse_program::disassembler::format_instruction;
use pulse_program::{Instruction, MemoryLimits, OPCODES, OperandKind, PulseProgram, disassemble};

fn instruction() -> impl Strategy<Value = Instruction> {
    (0..OPCODES.len(), 0u32..=0xff, 0u32..=0xfff, 0u32..=0xff_ffff).prop_map(
        |(index, channel, data, wide)| {
            let (opcode, _, kind) = OPCODES[index];
            let operand = match kind {
                OperandKind::ChannelData => (channel << 12) | data,
                _ => wide,
            };
            Instruction::new(opcode, operand)
        },
    )
}

proptest! {
    #[test]
    fn test_disassembly_reassembles(instructions in prop::collection::vec(instruction(), 1..64)) {
        let text: Vec<String> = instructions.iter().copied().map(format_instruction).collect();
        let mut program = PulseProgram::new(MemoryLimits::default());
        program.load_text("generated.pp", &text.join("\n")).unwrap();
        prop_assert_eq!(program.code(), instructions.as_slice());
        prop_assert_eq!(disassemble(&program.code_image()).unwrap(), text);
    }

    #[test]
    fn test_repeated_update_changes_nothing(values in prop::collection::vec(0i64..1 << 40, 1..16)) {
        let declarations: String = (0..values.len()).map(|i| format!("var v{i} 0\n")).collect();
        let mut program = PulseProgram::new(MemoryLimits::default());
        program.load_text("vars.pp", &declarations).unwrap();
        let updates: IndexMap<String, Quantity> = values
            .iter()
            .enumerate()
            .map(|(i, &value)| (format!("v{i}"), Quantity::dimensionless(value as f64)))
            .collect();
        let changed = program.update_variables(&updates);
        prop_assert_eq!(changed.len(), values.iter().filter(|&&value| value != 0).count());
        prop_assert!(program.update_variables(&updates).is_empty());
        let expected: Vec<u64> = values.iter().map(|&value| value as u64).collect();
        prop_assert_eq!(program.data(), expected.as_slice());
    }
}
