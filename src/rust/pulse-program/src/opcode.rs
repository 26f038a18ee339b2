// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! The instruction set of the pulse-program processor.
//!
//! The table below is the only place where mnemonics and numeric opcodes are
//! related; the assembler and the disassembler both go through it.

use std::fmt;

/// What the 24-bit operand of an instruction refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    /// Data-memory address of a variable.
    Data,
    /// Instruction-memory address of a label.
    Code,
    /// Channel in bits 12..20 and a data address in bits 0..12.
    ChannelData,
    /// Immediate value.
    Literal,
}

macro_rules! opcodes {
    ($($variant:ident = $code:literal, $kind:ident;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[allow(non_camel_case_types, clippy::upper_case_acronyms)]
        #[repr(u8)]
        pub enum Opcode {
            $($variant = $code,)*
        }

        pub const OPCODES: &[(Opcode, &str, OperandKind)] = &[
            $((Opcode::$variant, stringify!($variant), OperandKind::$kind),)*
        ];
    };
}

opcodes! {
    NOP = 0x00, None;
    DDSFRQ = 0x01, ChannelData;
    DDSAMP = 0x02, ChannelData;
    DDSPHS = 0x03, ChannelData;
    DDSCHN = 0x04, Literal;
    SHUTTERMASK = 0x05, Data;
    ASYNCSHUTTER = 0x06, Data;
    COUNTERMASK = 0x07, Data;
    TRIGGER = 0x08, Data;
    UPDATE = 0x09, Data;
    WAIT = 0x0a, None;
    DDSFRQFINE = 0x0b, ChannelData;
    LDWR = 0x0c, Data;
    LDWI = 0x0d, Literal;
    STWR = 0x0e, Data;
    STWI = 0x0f, Literal;
    LDINDF = 0x10, Data;
    STINDF = 0x11, Data;
    ANDW = 0x12, Data;
    ORW = 0x13, Data;
    ADDW = 0x14, Data;
    SUBW = 0x15, Data;
    MULTW = 0x16, Data;
    DIVW = 0x17, Data;
    INC = 0x18, Data;
    DEC = 0x19, Data;
    CLRW = 0x1a, None;
    SHL = 0x1b, Data;
    SHR = 0x1c, Data;
    CMP = 0x1d, Data;
    CMPEQUAL = 0x1e, Data;
    CMPNOTEQUAL = 0x1f, Data;
    CMPLESS = 0x20, Data;
    CMPGREATER = 0x21, Data;
    CMPGE = 0x22, Data;
    CMPLE = 0x23, Data;
    JMP = 0x24, Code;
    JMPZ = 0x25, Code;
    JMPNZ = 0x26, Code;
    JMPCMP = 0x27, Code;
    JMPNCMP = 0x28, Code;
    PUSH = 0x29, Data;
    POP = 0x2a, Data;
    JMPPUSH = 0x2b, Code;
    JMPPOP = 0x2c, None;
    UPDATEINDF = 0x2d, Data;
    WAITFORTRIGGER = 0x2e, Data;
    SETSYNCTIME = 0x2f, Data;
    WAITFORSYNC = 0x30, Data;
    WAITDDSWRITEDONE = 0x31, Literal;
    ASYNCINVSHUTTER = 0x32, Data;
    DACOUT = 0x33, ChannelData;
    SERIALWRITE = 0x34, ChannelData;
    SETPARAMETER = 0x35, ChannelData;
    SENDENABLEMASK = 0x36, Data;
    LDCOUNT = 0x37, Data;
    LDTDCCOUNT = 0x38, Data;
    LDADCCOUNT = 0x39, Data;
    LDADCSUM = 0x3a, Data;
    LDACTIVE = 0x3b, None;
    RAND = 0x3c, Literal;
    RANDSEED = 0x3d, ChannelData;
    WRITEPIPE = 0x3e, None;
    WRITEPIPEINDF = 0x3f, Data;
    READPIPE = 0x40, None;
    READPIPEINDF = 0x41, Data;
    WRITERESULTTOPIPE = 0x42, ChannelData;
    JMPPIPEAVAIL = 0x43, Code;
    JMPPIPEEMPTY = 0x44, Code;
    SETRAMADDR = 0x45, Data;
    RAMREAD = 0x46, None;
    RAMREADINDF = 0x47, Data;
    JMPRAMVALID = 0x48, Code;
    JMPRAMINVALID = 0x49, Code;
    LDCOUNTINDF = 0x4a, Data;
    WAITFORTRIGGERINDF = 0x4b, Data;
    DDS9910_SAVEAMP = 0x50, ChannelData;
    DDS9910_SAVEPHS = 0x51, ChannelData;
    DDS9910_SAVEFRQ = 0x52, ChannelData;
    DDS9910_SETAPF = 0x53, Literal;
    DDS9910_RAMPSTEPUP = 0x54, ChannelData;
    DDS9910_RAMPSTEPDOWN = 0x55, ChannelData;
    DDS9910_RAMPTIMESTEPUP = 0x56, ChannelData;
    DDS9910_RAMPTIMESTEPDOWN = 0x57, ChannelData;
    DDS9910_RAMPLOW = 0x58, ChannelData;
    DDS9910_RAMPHIGH = 0x59, ChannelData;
    DDS9910_RAMPCONTROL = 0x5a, ChannelData;
    DDS9910_RAMPSTART = 0x5b, Literal;
    DDS9910_RAMPSTOP = 0x5c, Literal;
    END = 0xff, None;
}

impl Opcode {
    pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
        OPCODES
            .iter()
            .find(|(_, name, _)| *name == mnemonic)
            .map(|(op, _, _)| *op)
    }

    pub fn from_code(code: u8) -> Option<Opcode> {
        OPCODE_BY_CODE[code as usize]
    }

    pub fn mnemonic(self) -> &'static str {
        self.entry().1
    }

    pub fn operand_kind(self) -> OperandKind {
        self.entry().2
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    fn entry(self) -> &'static (Opcode, &'static str, OperandKind) {
        // The jump table always holds the index of every defined opcode.
        &OPCODES[ENTRY_BY_CODE[self as usize] as usize]
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

const ENTRY_BY_CODE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < OPCODES.len() {
        table[OPCODES[i].0 as usize] = i as u8;
        i += 1;
    }
    table
};

const OPCODE_BY_CODE: [Option<Opcode>; 256] = {
    let mut table = [None; 256];
    let mut i = 0;
    while i < OPCODES.len() {
        table[OPCODES[i].0 as usize] = Some(OPCODES[i].0);
        i += 1;
    }
    table
};

/// One word of instruction memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: u32,
}

impl Instruction {
    pub const OPERAND_MASK: u32 = 0x00ff_ffff;

    pub fn new(opcode: Opcode, operand: u32) -> Self {
        Instruction { opcode, operand }
    }

    pub fn word(self) -> u32 {
        ((self.opcode as u32) << 24) | (self.operand & Self::OPERAND_MASK)
    }

    pub fn from_word(word: u32) -> Option<Self> {
        Some(Instruction {
            opcode: Opcode::from_code((word >> 24) as u8)?,
            operand: word & Self::OPERAND_MASK,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_consistent() {
        for (i, (op, name, _)) in OPCODES.iter().enumerate() {
            assert_eq!(Opcode::from_mnemonic(name), Some(*op));
            assert_eq!(Opcode::from_code(op.code()), Some(*op));
            assert_eq!(op.mnemonic(), *name);
            assert!(OPCODES[i + 1..].iter().all(|(other, _, _)| other.code() != op.code()));
        }
        assert!(OPCODES.len() >= 90);
    }

    #[test]
    fn test_word_layout() {
        let instruction = Instruction::new(Opcode::DDSFRQ, (2 << 12) | 5);
        assert_eq!(instruction.word(), 0x0100_2005);
        assert_eq!(Instruction::from_word(0x0100_2005), Some(instruction));
        assert_eq!(Instruction::from_word(0xfe00_0000), None);
    }
}
