// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use ionpulse_units::q;
use ppp_compiler::compile;
use pulse_program::{Opcode, PulseProgram};

fn assemble(source: &str) -> PulseProgram {
    let compiled = compile(source).unwrap();
    let mut program = PulseProgram::default();
    program.load_text("main.pp", &compiled.assembly).unwrap();
    program.set_reverse_line_lookup(compiled.reverse_line_lookup);
    program.assemble().unwrap();
    program
}

#[test]
fn test_constant_output_has_four_instructions() {
    let program = assemble("var x = 0 ; update(1 us) ; DDSFRQ 0, x ; update(1 us) ; END");
    let opcodes: Vec<Opcode> = program
        .code()
        .iter()
        .map(|instruction| instruction.opcode)
        .filter(|opcode| *opcode != Opcode::NOP)
        .collect();
    assert_eq!(
        opcodes,
        [Opcode::UPDATE, Opcode::DDSFRQ, Opcode::UPDATE, Opcode::END]
    );
    let duration = program.variable("__literal_0").unwrap();
    assert_eq!(duration.value, q(1.0, "us").unwrap());
    // TIME encoding counts 5 ns cycles
    assert_eq!(program.data()[duration.slot], 200);
}

#[test]
fn test_source_locations_map_back_to_ppp() {
    let source = "\
var n = 3
var f = 10 MHz, AD9912_FRQ
while n > 0:
    set_dds(channel=1, frequency=f)
    update(2 us)
    n -= 1
exit(0xfffe000000000002)
";
    let program = assemble(source);
    let ddsfrq = program
        .code()
        .iter()
        .position(|instruction| instruction.opcode == Opcode::DDSFRQ)
        .unwrap();
    let location = program.source_location(ddsfrq).unwrap();
    assert_eq!(location.file, "main.pp");
    assert_eq!(location.ppp_line, Some(4));
    assert_eq!(program.code()[ddsfrq].operand >> 12, 1);
    assert_eq!(
        program.code().last().map(|instruction| instruction.opcode),
        Some(Opcode::END)
    );
}

#[test]
fn test_procedure_call_assembles() {
    let source = "\
var total = 0
def accumulate(amount):
    total += amount
accumulate(5)
accumulate(total)
write_pipe(total)
";
    let program = assemble(source);
    let labels = program.labels();
    let entry = labels["accumulate"];
    let calls: Vec<u32> = program
        .code()
        .iter()
        .filter(|instruction| instruction.opcode == Opcode::JMPPUSH)
        .map(|instruction| instruction.operand)
        .collect();
    assert_eq!(calls, [entry as u32, entry as u32]);
    assert_eq!(program.code()[entry - 1].opcode, Opcode::END);
    assert_eq!(program.code().last().map(|i| i.opcode), Some(Opcode::JMPPOP));
}
